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

//! Wiring of pairing, service advertisement and the relay.

use anyhow::{Context, Result};
use std::io;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::{AgentSpawner, BluetoothctlSpawner};
use crate::bluetooth::{NoopAdvertiser, RfcommListener, SdptoolAdvertiser, ServiceAdvertiser};
use crate::config::{Config, TransportKind};
use crate::pairing::{ControllerSettings, PairingOutcome, PairingSessionController};
use crate::relay::{RelayExit, RelayHandler, RelayListener, RelayServer, TcpRelayListener};
use crate::state::AppState;
use crate::storage::DeviceRegistry;

/// How a full pair-then-relay run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppExit {
    PairingCancelled,
    Relay(RelayExit),
}

pub struct App {
    config: Config,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl App {
    pub fn new(config: Config, cancel: CancellationToken) -> Self {
        Self {
            config,
            state: Arc::new(AppState::new()),
            cancel,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Pair a device, then advertise and serve the relay.
    pub async fn run(&self) -> Result<AppExit> {
        let spawner = BluetoothctlSpawner::new(&self.config.agent);
        let relay = &self.config.relay;

        match relay.transport {
            TransportKind::Rfcomm => {
                let advertiser = SdptoolAdvertiser::new(&self.config.advertiser);
                let (channel, backlog) = (relay.channel, relay.backlog);
                if self.config.advertiser.enabled {
                    self.run_with(spawner, &advertiser, || {
                        RfcommListener::bind(channel, backlog)
                    })
                    .await
                } else {
                    self.run_with(spawner, &NoopAdvertiser, || {
                        RfcommListener::bind(channel, backlog)
                    })
                    .await
                }
            }
            TransportKind::Tcp => {
                let (addr, backlog) = (relay.tcp_listen, relay.backlog);
                self.run_with(spawner, &NoopAdvertiser, || {
                    TcpRelayListener::bind(addr, backlog)
                })
                .await
            }
        }
    }

    /// Pairing only.
    pub async fn pair(&self) -> Result<PairingOutcome> {
        self.pair_with(BluetoothctlSpawner::new(&self.config.agent))
            .await
    }

    /// Advertise and serve the relay without pairing first.
    pub async fn relay(&self) -> Result<RelayExit> {
        let relay = &self.config.relay;

        match relay.transport {
            TransportKind::Rfcomm => {
                if self.config.advertiser.enabled {
                    self.advertise(&SdptoolAdvertiser::new(&self.config.advertiser))
                        .await;
                }
                let listener = RfcommListener::bind(relay.channel, relay.backlog)
                    .with_context(|| {
                        format!("Failed to bind RFCOMM channel {}", relay.channel)
                    })?;
                self.serve(listener).await
            }
            TransportKind::Tcp => {
                let listener = TcpRelayListener::bind(relay.tcp_listen, relay.backlog)
                    .with_context(|| format!("Failed to bind {}", relay.tcp_listen))?;
                self.serve(listener).await
            }
        }
    }

    /// Pair with `spawner`, then advertise with `advertiser` and serve on the
    /// listener returned by `bind`. `bind` is only called once pairing has
    /// succeeded.
    pub async fn run_with<S, A, L, F>(&self, spawner: S, advertiser: &A, bind: F) -> Result<AppExit>
    where
        S: AgentSpawner,
        A: ServiceAdvertiser,
        L: RelayListener,
        F: FnOnce() -> io::Result<L>,
    {
        match self.pair_with(spawner).await? {
            PairingOutcome::Cancelled => return Ok(AppExit::PairingCancelled),
            PairingOutcome::Paired { device, completion } => {
                let device = device
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "unknown device".to_string());
                info!(
                    "Paired with {} ({:?}). Proceeding with service setup and relay...",
                    device, completion
                );
            }
        }

        self.advertise(advertiser).await;

        let listener = bind().context("Failed to bind relay listener")?;
        Ok(AppExit::Relay(self.serve(listener).await?))
    }

    pub async fn pair_with<S: AgentSpawner>(&self, spawner: S) -> Result<PairingOutcome> {
        let registry = DeviceRegistry::open(&self.config.registry.path)?;

        let seed = if self.config.registry.seed_from_log {
            registry.last_recorded().unwrap_or_else(|e| {
                warn!("Could not read device registry: {:#}", e);
                None
            })
        } else {
            None
        };
        if let Some(id) = seed {
            info!("Last accepted device from registry: {}", id);
        }

        let settings = ControllerSettings::from_config(&self.config.agent, &self.config.pairing);
        let mut controller =
            PairingSessionController::new(spawner, registry, settings, self.state.clone())
                .with_last_accepted(seed);

        Ok(controller.run(&self.cancel).await?)
    }

    /// Register the relay's service record. Failure is logged and ignored.
    pub async fn advertise<A: ServiceAdvertiser>(&self, advertiser: &A) {
        let channel = self.config.relay.channel;
        let profile = &self.config.advertiser.profile;

        if let Err(e) = advertiser.advertise(channel, profile).await {
            warn!(
                "Service registration failed, continuing without it: {}",
                e
            );
        }
    }

    pub async fn serve<L: RelayListener>(&self, listener: L) -> Result<RelayExit> {
        let handler = RelayHandler::from_config(&self.config.relay);
        let server = RelayServer::new(listener, handler, self.state.clone());
        Ok(server.serve(&self.cancel).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{Exchange, Script, ScriptedSpawner};
    use crate::error::RegistrationError;
    use crate::pairing::PairingSessionState;
    use parking_lot::Mutex;
    use std::net::SocketAddr;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    /// Records calls; optionally fails them.
    #[derive(Default)]
    struct RecordingAdvertiser {
        calls: Mutex<Vec<(u8, String)>>,
        fail: bool,
    }

    impl ServiceAdvertiser for RecordingAdvertiser {
        async fn advertise(&self, channel: u8, profile: &str) -> Result<(), RegistrationError> {
            self.calls.lock().push((channel, profile.to_string()));
            if self.fail {
                return Err(RegistrationError::Failed {
                    status: "exit status: 1".to_string(),
                    stderr: "permission denied".to_string(),
                });
            }
            Ok(())
        }
    }

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.agent.settle_delay_ms = 0;
        config.registry.path = dir.path().join("device_connected.txt");
        config
    }

    fn tcp_binder(
        tx: oneshot::Sender<SocketAddr>,
    ) -> impl FnOnce() -> io::Result<TcpRelayListener> {
        move || {
            let listener = TcpRelayListener::bind("127.0.0.1:0".parse().unwrap(), 1)?;
            let _ = tx.send(listener.local_addr());
            Ok(listener)
        }
    }

    #[tokio::test]
    async fn test_paired_transcript_starts_relay() -> Result<()> {
        let dir = TempDir::new()?;
        let app = App::new(test_config(&dir), CancellationToken::new());
        let spawner = ScriptedSpawner::new(vec![Script::new(&[
            "[NEW] Device AA:BB:CC:DD:EE:FF",
            "Request confirmation",
            "Authorize service",
            "Paired: yes",
        ])]);
        let advertiser = RecordingAdvertiser::default();
        let (tx, rx) = oneshot::channel();

        let client = async {
            let addr = rx.await?;
            let mut stream = TcpStream::connect(addr).await?;
            stream.write_all(b"echo hello\n").await?;
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).await?;
            stream.write_all(b"socket close\n").await?;
            anyhow::Ok(buf[..n].to_vec())
        };

        let (exit, reply) = tokio::join!(
            app.run_with(spawner.clone(), &advertiser, tcp_binder(tx)),
            client
        );

        assert_eq!(exit?, AppExit::Relay(RelayExit::Closed));
        assert_eq!(reply?, b"hello\n");
        assert_eq!(*advertiser.calls.lock(), vec![(23, "SP".to_string())]);
        assert_eq!(app.state().pairing_state(), PairingSessionState::Paired);
        assert_eq!(spawner.log().last(), Some(&Exchange::Terminated));

        let registry = DeviceRegistry::open(&app.config().registry.path)?;
        assert_eq!(registry.entries()?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_advertisement_does_not_block_relay() -> Result<()> {
        let dir = TempDir::new()?;
        let app = App::new(test_config(&dir), CancellationToken::new());
        let spawner = ScriptedSpawner::new(vec![Script::new(&["Connection successful"])]);
        let advertiser = RecordingAdvertiser {
            fail: true,
            ..Default::default()
        };
        let (tx, rx) = oneshot::channel();

        let client = async {
            let mut stream = TcpStream::connect(rx.await?).await?;
            stream.write_all(b"socket close\n").await?;
            anyhow::Ok(())
        };

        let (exit, client) = tokio::join!(
            app.run_with(spawner, &advertiser, tcp_binder(tx)),
            client
        );

        client?;
        assert_eq!(exit?, AppExit::Relay(RelayExit::Closed));
        assert_eq!(advertiser.calls.lock().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_pairing_never_binds() -> Result<()> {
        let dir = TempDir::new()?;
        let cancel = CancellationToken::new();
        let app = App::new(test_config(&dir), cancel.clone());
        let spawner = ScriptedSpawner::new(vec![Script::new(&[])]);
        let advertiser = RecordingAdvertiser::default();

        cancel.cancel();
        let exit = app
            .run_with(spawner, &advertiser, || -> io::Result<TcpRelayListener> {
                panic!("relay must not bind after cancellation")
            })
            .await?;

        assert_eq!(exit, AppExit::PairingCancelled);
        assert!(advertiser.calls.lock().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_registry_seeds_last_accepted() -> Result<()> {
        let dir = TempDir::new()?;
        let config = test_config(&dir);
        std::fs::write(&config.registry.path, "AA:BB:CC:DD:EE:FF\n")?;
        let app = App::new(config, CancellationToken::new());
        let spawner = ScriptedSpawner::new(vec![Script::new(&[
            "[NEW] Device AA:BB:CC:DD:EE:FF",
            "Paired: yes",
        ])]);

        app.pair_with(spawner).await?;

        let registry = DeviceRegistry::open(&app.config().registry.path)?;
        assert_eq!(registry.entries()?.len(), 1);
        Ok(())
    }
}
