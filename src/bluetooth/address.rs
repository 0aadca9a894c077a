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

//! Hardware address of a remote Bluetooth device.

use bluer::Address;
use std::fmt;
use std::str::FromStr;

/// A 6-byte Bluetooth hardware address.
///
/// Always displayed as `XX:XX:XX:XX:XX:XX` with uppercase hex. Parsing
/// accepts either case, so two identifiers compare equal whenever their
/// textual forms match case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentifier(Address);

/// Error returned for text that is not six colon-separated hex pairs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid device address: {0:?}")]
pub struct InvalidDeviceIdentifier(pub String);

impl DeviceIdentifier {
    /// Build an identifier from raw address bytes.
    pub fn new(bytes: [u8; 6]) -> Self {
        Self(Address::new(bytes))
    }
}

impl FromStr for DeviceIdentifier {
    type Err = InvalidDeviceIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidDeviceIdentifier(s.to_string());

        let mut bytes = [0u8; 6];
        let mut groups = s.split(':');
        for byte in bytes.iter_mut() {
            let group = groups.next().ok_or_else(invalid)?;
            if group.len() != 2 || !group.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(group, 16).map_err(|_| invalid())?;
        }
        if groups.next().is_some() {
            return Err(invalid());
        }

        Ok(Self::new(bytes))
    }
}

impl fmt::Display for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0 .0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}
