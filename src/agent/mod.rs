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

//! Pairing agent process and its text protocol.

mod process;
#[cfg(test)]
pub(crate) mod testing;
mod transcript;

pub use process::{AgentLink, AgentProcess, AgentSpawner, BluetoothctlSpawner};
pub use transcript::{PairingEvent, TranscriptParser};

use crate::bluetooth::DeviceIdentifier;
use std::fmt;

/// Commands understood by the pairing agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentCommand {
    PowerOn,
    DiscoverableOn,
    AgentOn,
    DefaultAgent,
    ScanOn,
    ScanOff,
    Yes,
    Pair(DeviceIdentifier),
    Trust(DeviceIdentifier),
    Connect(DeviceIdentifier),
    Quit,
}

/// Commands issued, in order, when an agent starts.
pub const STARTUP_SEQUENCE: &[AgentCommand] = &[
    AgentCommand::PowerOn,
    AgentCommand::DiscoverableOn,
    AgentCommand::AgentOn,
    AgentCommand::DefaultAgent,
    AgentCommand::ScanOn,
];

impl fmt::Display for AgentCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PowerOn => f.write_str("power on"),
            Self::DiscoverableOn => f.write_str("discoverable on"),
            Self::AgentOn => f.write_str("agent on"),
            Self::DefaultAgent => f.write_str("default-agent"),
            Self::ScanOn => f.write_str("scan on"),
            Self::ScanOff => f.write_str("scan off"),
            Self::Yes => f.write_str("yes"),
            Self::Pair(id) => write!(f, "pair {}", id),
            Self::Trust(id) => write!(f, "trust {}", id),
            Self::Connect(id) => write!(f, "connect {}", id),
            Self::Quit => f.write_str("quit"),
        }
    }
}
