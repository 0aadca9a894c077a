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

//! Shared, read-mostly status of the pairing controller and the relay.
//!
//! Writers are the controller and the relay server; the binary reads it to
//! report where shutdown happened. Nothing here drives control flow.

use parking_lot::RwLock;
use std::fmt;

use crate::bluetooth::DeviceIdentifier;
use crate::pairing::PairingSessionState;

/// What the relay is doing right now.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RelayStatus {
    #[default]
    Stopped,
    Listening { endpoint: String },
    Serving { peer: String },
}

impl fmt::Display for RelayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::Listening { endpoint } => write!(f, "listening on {}", endpoint),
            Self::Serving { peer } => write!(f, "serving {}", peer),
        }
    }
}

#[derive(Debug, Default)]
pub struct AppState {
    pairing: RwLock<PairingSessionState>,
    attempt: RwLock<u32>,
    last_device: RwLock<Option<DeviceIdentifier>>,
    relay: RwLock<RelayStatus>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pairing_state(&self) -> PairingSessionState {
        *self.pairing.read()
    }

    pub fn set_pairing_state(&self, state: PairingSessionState) {
        *self.pairing.write() = state;
    }

    /// One-based number of the current pairing attempt, 0 before the first.
    pub fn attempt(&self) -> u32 {
        *self.attempt.read()
    }

    pub fn set_attempt(&self, attempt: u32) {
        *self.attempt.write() = attempt;
    }

    pub fn last_device(&self) -> Option<DeviceIdentifier> {
        *self.last_device.read()
    }

    pub fn set_last_device(&self, id: Option<DeviceIdentifier>) {
        *self.last_device.write() = id;
    }

    pub fn relay_status(&self) -> RelayStatus {
        self.relay.read().clone()
    }

    pub fn set_relay_status(&self, status: RelayStatus) {
        *self.relay.write() = status;
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        let device = self
            .last_device()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "none".to_string());
        format!(
            "pairing={:?} attempt={} last_device={} relay={}",
            self.pairing_state(),
            self.attempt(),
            device,
            self.relay_status()
        )
    }
}
