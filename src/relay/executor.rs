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

//! Shell execution of relayed commands.
//!
//! Every line a connected client sends (other than the reserved tokens) is
//! run through the configured shell with this process's environment and
//! privileges. Anyone who can connect to the relay can run arbitrary
//! commands; restrict who can pair before enabling it.
//!
//! No timeout is applied: a command that never exits stalls its session.

use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// What running one relayed command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayResult {
    /// Exit status zero; stdout.
    Output(Vec<u8>),
    /// Non-zero exit or the shell could not be started.
    ExecutionError {
        message: String,
        captured_output: Vec<u8>,
    },
}

impl RelayResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Output(_))
    }

    /// The bytes written back to the client, with no framing.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Output(bytes) => bytes,
            Self::ExecutionError {
                message,
                captured_output,
            } => {
                let mut bytes = format!("Error executing command: {}\nOutput: ", message).into_bytes();
                bytes.extend_from_slice(&captured_output);
                bytes
            }
        }
    }
}

/// Runs command lines through `<shell> -c`.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new("/bin/sh")
    }
}

impl ShellExecutor {
    pub fn new(shell: &str) -> Self {
        Self {
            shell: shell.to_string(),
        }
    }

    /// Run `command` to completion and capture its stdout.
    ///
    /// The child is killed if the returned future is dropped.
    pub async fn execute(&self, command: &str) -> RelayResult {
        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to start '{}': {}", self.shell, e);
                return RelayResult::ExecutionError {
                    message: format!("Failed to run command '{}': {}", command, e),
                    captured_output: Vec::new(),
                };
            }
        };

        if !output.stderr.is_empty() {
            debug!(
                "Command stderr: {}",
                String::from_utf8_lossy(&output.stderr).trim_end()
            );
        }

        if output.status.success() {
            return RelayResult::Output(output.stdout);
        }

        let message = match output.status.code() {
            Some(code) => format!(
                "Command '{}' returned non-zero exit status {}.",
                command, code
            ),
            None => format!("Command '{}' was terminated ({}).", command, output.status),
        };

        RelayResult::ExecutionError {
            message,
            captured_output: output.stdout,
        }
    }
}
