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

//! Command relay.
//!
//! Serves one client at a time over a listening socket and runs each
//! received line as a shell command, writing the output straight back.

mod command;
mod executor;
mod server;
mod session;
mod transport;

pub use command::{RelayCommand, RelayTokens};
pub use executor::{RelayResult, ShellExecutor};
pub use server::{RelayExit, RelayServer};
pub use session::{RelayHandler, SessionEnd, DEFAULT_MAX_LINE_LENGTH};
pub use transport::{RelayListener, TcpRelayListener};
