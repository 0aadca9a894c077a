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

//! Bluetooth primitives.
//!
//! Device addresses, the RFCOMM listener used by the relay, and the SDP
//! service advertiser.

mod address;
mod advertiser;
mod rfcomm;

pub use address::{DeviceIdentifier, InvalidDeviceIdentifier};
pub use advertiser::{NoopAdvertiser, SdptoolAdvertiser, ServiceAdvertiser};
pub use rfcomm::RfcommListener;

/// SDP profile code for the Serial Port service.
pub const SERIAL_PORT_PROFILE: &str = "SP";
