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

//! Automated Bluetooth pairing followed by a line-oriented shell relay.
//!
//! A scripted `bluetoothctl` session accepts the first device that shows up,
//! after which an RFCOMM (or TCP) listener runs each received line through
//! the shell and writes the output back.

pub mod agent;
pub mod app;
pub mod bluetooth;
pub mod config;
pub mod error;
pub mod logging;
pub mod pairing;
pub mod relay;
pub mod state;
pub mod storage;

pub use app::{App, AppExit};
pub use config::Config;
