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

//! Classification of the pairing agent's output.
//!
//! Each line is tested against every pattern independently, so one line can
//! yield several events. Events come out in a fixed order (prompts first,
//! then discovery, then outcome) so a `[CHG] Device .. Paired: yes` line
//! records the device before it reports success.

use regex::Regex;
use std::sync::OnceLock;

use crate::bluetooth::DeviceIdentifier;

/// Something the pairing agent said that the controller may react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    PasskeyConfirmRequest,
    ServiceAuthorizeRequest,
    DeviceDiscovered { id: DeviceIdentifier },
    PairedSuccess,
    PairedFailure,
    InvalidCommand,
    ServiceRegistered,
    /// A line that matched nothing. Kept for diagnostics only.
    Other { raw: String },
}

const PASSKEY_CUES: &[&str] = &["Confirm passkey", "Request confirmation"];
const AUTHORIZE_CUES: &[&str] = &["Authorize service"];
const SUCCESS_CUES: &[&str] = &["Paired: yes", "Connection successful"];
const FAILURE_CUES: &[&str] = &["Failed to pair"];
const INVALID_CUES: &[&str] = &["Invalid command"];
const REGISTERED_CUES: &[&str] = &["Serial Port service registered"];

static DEVICE_PATTERN: OnceLock<Regex> = OnceLock::new();
static ANSI_PATTERN: OnceLock<Regex> = OnceLock::new();

fn device_pattern() -> &'static Regex {
    DEVICE_PATTERN.get_or_init(|| {
        Regex::new(r"Device\s+([0-9A-Fa-f]{2}(?::[0-9A-Fa-f]{2}){5})\b")
            .expect("device pattern is valid")
    })
}

/// Colour sequences plus the readline prompt markers bluetoothctl emits.
fn ansi_pattern() -> &'static Regex {
    ANSI_PATTERN.get_or_init(|| {
        Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]|[\x01\x02]").expect("ansi pattern is valid")
    })
}

/// Turns agent output lines into [`PairingEvent`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranscriptParser;

impl TranscriptParser {
    pub fn new() -> Self {
        Self
    }

    /// Remove terminal escape sequences and surrounding whitespace.
    pub fn clean(&self, line: &str) -> String {
        ansi_pattern().replace_all(line, "").trim().to_string()
    }

    /// Classify one line of agent output.
    pub fn parse(&self, line: &str) -> Vec<PairingEvent> {
        let line = self.clean(line);
        let mut events = Vec::new();

        if contains_any(&line, PASSKEY_CUES) {
            events.push(PairingEvent::PasskeyConfirmRequest);
        }
        if contains_any(&line, AUTHORIZE_CUES) {
            events.push(PairingEvent::ServiceAuthorizeRequest);
        }
        if let Some(id) = device_pattern()
            .captures(&line)
            .and_then(|caps| caps[1].parse().ok())
        {
            events.push(PairingEvent::DeviceDiscovered { id });
        }
        if contains_any(&line, SUCCESS_CUES) {
            events.push(PairingEvent::PairedSuccess);
        }
        if contains_any(&line, FAILURE_CUES) {
            events.push(PairingEvent::PairedFailure);
        }
        if contains_any(&line, INVALID_CUES) {
            events.push(PairingEvent::InvalidCommand);
        }
        if contains_any(&line, REGISTERED_CUES) {
            events.push(PairingEvent::ServiceRegistered);
        }

        if events.is_empty() {
            events.push(PairingEvent::Other { raw: line });
        }
        events
    }
}

fn contains_any(line: &str, cues: &[&str]) -> bool {
    cues.iter().any(|cue| line.contains(cue))
}
