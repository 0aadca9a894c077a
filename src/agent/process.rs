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

//! The interactive pairing agent as a child process.

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::PairingError;

/// Line-oriented control channel to a running pairing agent.
pub trait AgentLink: Send {
    /// Write one command followed by a newline.
    fn send(&mut self, command: &str) -> impl Future<Output = Result<(), PairingError>> + Send;

    /// Next output line, or `None` once the agent closed its output.
    ///
    /// Must be cancel safe: it is raced against the countdown and shutdown.
    fn next_line(&mut self) -> impl Future<Output = Result<Option<String>, PairingError>> + Send;

    /// Ask the agent to `quit` and wait up to `grace` for it to exit,
    /// killing it afterwards if it is still running.
    fn quit(&mut self, grace: Duration) -> impl Future<Output = Result<(), PairingError>> + Send;

    /// Kill the agent and reap it.
    fn terminate(&mut self) -> impl Future<Output = ()> + Send;
}

/// Starts a fresh agent for each pairing attempt.
pub trait AgentSpawner: Send + Sync {
    type Link: AgentLink;

    fn spawn(&self) -> Result<Self::Link, PairingError>;
}

/// Spawns the configured agent program (normally `bluetoothctl`).
#[derive(Debug, Clone)]
pub struct BluetoothctlSpawner {
    program: String,
    args: Vec<String>,
}

impl BluetoothctlSpawner {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
        }
    }
}

impl AgentSpawner for BluetoothctlSpawner {
    type Link = AgentProcess;

    fn spawn(&self) -> Result<AgentProcess, PairingError> {
        AgentProcess::spawn(&self.program, &self.args)
    }
}

/// A running agent process with its pipes.
///
/// The child is killed when this is dropped, so every exit path releases
/// the subprocess.
pub struct AgentProcess {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

impl AgentProcess {
    pub fn spawn(program: &str, args: &[String]) -> Result<Self, PairingError> {
        let spawn_error = |source| PairingError::Spawn {
            program: program.to_string(),
            source,
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let missing = |name: &str| {
            spawn_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("{} pipe not available", name),
            ))
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;

        if let Some(stderr) = child.stderr.take() {
            let program = program.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("{} stderr: {}", program, line);
                }
            });
        }

        info!("Started pairing agent '{}' (pid {:?})", program, child.id());

        Ok(Self {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
        })
    }
}

impl AgentLink for AgentProcess {
    async fn send(&mut self, command: &str) -> Result<(), PairingError> {
        debug!("Agent <- {}", command);
        self.stdin
            .write_all(format!("{}\n", command).as_bytes())
            .await
            .map_err(|e| PairingError::io("writing to the agent", e))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| PairingError::io("flushing agent input", e))
    }

    async fn next_line(&mut self) -> Result<Option<String>, PairingError> {
        self.lines
            .next_line()
            .await
            .map_err(|e| PairingError::io("reading agent output", e))
    }

    async fn quit(&mut self, grace: Duration) -> Result<(), PairingError> {
        self.send(&super::AgentCommand::Quit.to_string()).await?;

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!("Pairing agent exited with {}", status);
                Ok(())
            }
            Ok(Err(e)) => Err(PairingError::io("waiting for the agent to exit", e)),
            Err(_) => {
                warn!("Pairing agent still running {:?} after quit, killing it", grace);
                self.terminate().await;
                Ok(())
            }
        }
    }

    async fn terminate(&mut self) {
        if let Ok(Some(status)) = self.child.try_wait() {
            debug!("Pairing agent already exited with {}", status);
            return;
        }
        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill pairing agent: {}", e);
        } else {
            info!("Pairing agent terminated");
        }
    }
}
