// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Drives one pairing agent from startup to a paired device.
//!
//! The controller owns the agent process for the whole attempt. It issues
//! the startup sequence, then blocks on the agent's next output line and
//! reacts to whatever the [`TranscriptParser`] finds in it. An
//! `Invalid command` line starts a countdown; if no confirmation or
//! authorization prompt shows up before it expires the agent is told to
//! `quit` and a fresh one is launched, up to `max_relaunches` times.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::PairingSessionState;
use crate::agent::{
    AgentCommand, AgentLink, AgentSpawner, PairingEvent, TranscriptParser, STARTUP_SEQUENCE,
};
use crate::bluetooth::DeviceIdentifier;
use crate::config::{AgentConfig, PairingConfig, PairingPolicy};
use crate::error::PairingError;
use crate::state::AppState;
use crate::storage::DeviceRegistry;

/// Timing and policy knobs for the controller.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub policy: PairingPolicy,
    pub settle_delay: Duration,
    pub countdown: Duration,
    pub quit_grace: Duration,
    pub max_relaunches: u32,
    pub relay_on_service_registered: bool,
}

impl ControllerSettings {
    pub fn from_config(agent: &AgentConfig, pairing: &PairingConfig) -> Self {
        Self {
            policy: pairing.policy,
            settle_delay: agent.settle_delay(),
            countdown: pairing.countdown(),
            quit_grace: agent.quit_grace(),
            max_relaunches: pairing.max_relaunches,
            relay_on_service_registered: pairing.relay_on_service_registered,
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default(), &PairingConfig::default())
    }
}

/// Which agent message ended the attempt successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// `Paired: yes` or `Connection successful`.
    Confirmed,
    /// `Serial Port service registered` arrived first.
    ServiceRegistered,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    Paired {
        device: Option<DeviceIdentifier>,
        completion: Completion,
    },
    /// Shutdown was requested before pairing finished.
    Cancelled,
}

/// How a single agent launch ended.
#[derive(Debug)]
enum AttemptEnd {
    Paired(Completion),
    TimedOut,
    Cancelled,
}

pub struct PairingSessionController<S: AgentSpawner> {
    spawner: S,
    parser: TranscriptParser,
    registry: DeviceRegistry,
    settings: ControllerSettings,
    state: PairingSessionState,
    /// Dedup point for discovery lines; survives relaunches.
    last_accepted: Option<DeviceIdentifier>,
    countdown: Option<Instant>,
    shared: Arc<AppState>,
}

impl<S: AgentSpawner> PairingSessionController<S> {
    pub fn new(
        spawner: S,
        registry: DeviceRegistry,
        settings: ControllerSettings,
        shared: Arc<AppState>,
    ) -> Self {
        Self {
            spawner,
            parser: TranscriptParser::new(),
            registry,
            settings,
            state: PairingSessionState::Idle,
            last_accepted: None,
            countdown: None,
            shared,
        }
    }

    /// Seed the dedup point, e.g. from the registry's last line.
    pub fn with_last_accepted(mut self, id: Option<DeviceIdentifier>) -> Self {
        self.last_accepted = id;
        self
    }

    pub fn state(&self) -> PairingSessionState {
        self.state
    }

    pub fn last_accepted(&self) -> Option<DeviceIdentifier> {
        self.last_accepted
    }

    /// Run pairing attempts until one succeeds, fails fatally, runs out of
    /// relaunches, or `cancel` fires.
    ///
    /// The agent is terminated before this returns on every path.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<PairingOutcome, PairingError> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.shared.set_attempt(attempt);
            self.transition(PairingSessionState::AgentStarting);

            let mut link = match self.spawner.spawn() {
                Ok(link) => link,
                Err(e) => {
                    self.transition(PairingSessionState::Failed);
                    return Err(e);
                }
            };

            match self.run_attempt(&mut link, cancel).await {
                Ok(AttemptEnd::Paired(completion)) => {
                    self.transition(PairingSessionState::Paired);
                    link.terminate().await;
                    info!("Pairing completed ({:?})", completion);
                    return Ok(PairingOutcome::Paired {
                        device: self.last_accepted,
                        completion,
                    });
                }
                Ok(AttemptEnd::TimedOut) => {
                    self.transition(PairingSessionState::Failed);
                    link.terminate().await;
                    if attempt > self.settings.max_relaunches {
                        error!("Giving up after {} pairing attempt(s)", attempt);
                        return Err(PairingError::AgentTimeout { attempts: attempt });
                    }
                    warn!(
                        "Relaunching pairing agent ({} of {} relaunches)",
                        attempt, self.settings.max_relaunches
                    );
                }
                Ok(AttemptEnd::Cancelled) => {
                    info!("Stopping device discovery...");
                    if let Err(e) = link.send(&AgentCommand::ScanOff.to_string()).await {
                        debug!("Could not stop scanning: {}", e);
                    }
                    link.terminate().await;
                    self.transition(PairingSessionState::Idle);
                    return Ok(PairingOutcome::Cancelled);
                }
                Err(e) => {
                    error!("Pairing attempt failed: {}", e);
                    link.terminate().await;
                    self.transition(PairingSessionState::Failed);
                    return Err(e);
                }
            }
        }
    }

    async fn run_attempt(
        &mut self,
        link: &mut S::Link,
        cancel: &CancellationToken,
    ) -> Result<AttemptEnd, PairingError> {
        self.countdown = None;

        for command in STARTUP_SEQUENCE {
            if !self.issue(link, *command, cancel).await? {
                return Ok(AttemptEnd::Cancelled);
            }
        }

        self.transition(PairingSessionState::AwaitingDevice);
        info!("Waiting for a device to connect...");

        loop {
            let deadline = self.countdown;

            tokio::select! {
                biased;

                _ = cancel.cancelled() => return Ok(AttemptEnd::Cancelled),

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.countdown = None;
                    warn!(
                        "No authorization request within {:?}, sending quit to the agent",
                        self.settings.countdown
                    );
                    link.quit(self.settings.quit_grace).await?;
                    return Ok(AttemptEnd::TimedOut);
                }

                line = link.next_line() => {
                    let Some(line) = line? else {
                        return Err(PairingError::AgentExited);
                    };
                    if let Some(end) = self.handle_line(link, &line, cancel).await? {
                        return Ok(end);
                    }
                }
            }
        }
    }

    async fn handle_line(
        &mut self,
        link: &mut S::Link,
        line: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<AttemptEnd>, PairingError> {
        for event in self.parser.parse(line) {
            match event {
                PairingEvent::PasskeyConfirmRequest => {
                    info!("Automatically confirming the passkey...");
                    self.countdown = None;
                    self.transition(PairingSessionState::Confirming);
                    link.send(&AgentCommand::Yes.to_string()).await?;
                }
                PairingEvent::ServiceAuthorizeRequest => {
                    info!("Automatically authorizing service...");
                    self.countdown = None;
                    self.transition(PairingSessionState::Authorizing);
                    link.send(&AgentCommand::Yes.to_string()).await?;
                }
                PairingEvent::DeviceDiscovered { id } => {
                    if !self.on_device(link, id, cancel).await? {
                        return Ok(Some(AttemptEnd::Cancelled));
                    }
                }
                PairingEvent::PairedSuccess => {
                    return Ok(Some(AttemptEnd::Paired(Completion::Confirmed)));
                }
                PairingEvent::PairedFailure => {
                    // Let the same device be handled again on its next announcement.
                    warn!("Pairing failed: {}", self.parser.clean(line));
                    self.last_accepted = None;
                    self.transition(PairingSessionState::AwaitingDevice);
                }
                PairingEvent::InvalidCommand => {
                    warn!(
                        "Agent rejected a command, starting {:?} countdown",
                        self.settings.countdown
                    );
                    self.countdown = Some(Instant::now() + self.settings.countdown);
                }
                PairingEvent::ServiceRegistered => {
                    if self.settings.relay_on_service_registered {
                        info!("Serial Port service registered, skipping pairing confirmation");
                        return Ok(Some(AttemptEnd::Paired(Completion::ServiceRegistered)));
                    }
                    debug!("Serial Port service registered");
                }
                PairingEvent::Other { raw } => {
                    if !raw.is_empty() {
                        debug!("Agent: {}", raw);
                    }
                }
            }
        }

        Ok(None)
    }

    /// Record a newly seen device. Returns `false` if cancelled while
    /// issuing explicit pairing commands.
    async fn on_device(
        &mut self,
        link: &mut S::Link,
        id: DeviceIdentifier,
        cancel: &CancellationToken,
    ) -> Result<bool, PairingError> {
        if self.last_accepted == Some(id) {
            debug!("Device {} already handled, ignoring", id);
            return Ok(true);
        }

        info!("Discovered device {}", id);
        if let Err(e) = self.registry.record(&id) {
            error!("Failed to record device {}: {:#}", id, e);
        }
        self.last_accepted = Some(id);
        self.shared.set_last_device(Some(id));

        if self.settings.policy == PairingPolicy::Explicit {
            for command in [
                AgentCommand::Pair(id),
                AgentCommand::Trust(id),
                AgentCommand::Connect(id),
            ] {
                if !self.issue(link, command, cancel).await? {
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }

    /// Send `command` and give the agent the settle delay to react.
    /// Returns `false` if cancelled during the delay.
    async fn issue(
        &mut self,
        link: &mut S::Link,
        command: AgentCommand,
        cancel: &CancellationToken,
    ) -> Result<bool, PairingError> {
        info!("Running agent command: {}", command);
        link.send(&command.to_string()).await?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(false),
            _ = sleep(self.settings.settle_delay) => Ok(true),
        }
    }

    fn transition(&mut self, next: PairingSessionState) {
        if self.state != next {
            debug!("Pairing state {:?} -> {:?}", self.state, next);
            self.state = next;
            self.shared.set_pairing_state(next);
        }
    }
}
