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

//! Error types shared across the pairing and relay loops.
//!
//! Only [`PairingError`] and [`RelayError`] terminate their owning loop.
//! A failed relayed command is reported to the client as a
//! [`RelayResult`](crate::relay::RelayResult) and a failed service
//! advertisement is logged and skipped.

use std::io;
use thiserror::Error;

/// Failures that end a pairing attempt.
#[derive(Debug, Error)]
pub enum PairingError {
    /// The agent process could not be started.
    #[error("failed to spawn pairing agent '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Reading from or writing to the agent's pipes failed.
    #[error("pairing agent I/O failed while {action}: {source}")]
    AgentIo {
        action: &'static str,
        #[source]
        source: io::Error,
    },

    /// The agent closed its output before pairing finished.
    #[error("pairing agent exited before pairing completed")]
    AgentExited,

    /// No confirmation or authorization arrived after an invalid command,
    /// and the relaunch budget is spent.
    #[error("no authorization request within the countdown after {attempts} attempt(s)")]
    AgentTimeout { attempts: u32 },
}

impl PairingError {
    pub(crate) fn io(action: &'static str, source: io::Error) -> Self {
        Self::AgentIo { action, source }
    }
}

/// Transport failures of the command relay.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay transport failed while {action}: {source}")]
    Transport {
        action: &'static str,
        #[source]
        source: io::Error,
    },
}

impl RelayError {
    pub(crate) fn transport(action: &'static str, source: io::Error) -> Self {
        Self::Transport { action, source }
    }
}

/// The service record could not be registered.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("service registration exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}
