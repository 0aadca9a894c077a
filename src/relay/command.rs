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

//! Classification of lines received from a relay client.

use crate::config::RelayConfig;

/// What a received line asks the relay to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayCommand {
    /// Close this client, keep listening.
    Quit,
    /// Close the listening socket and stop the relay.
    CloseServer,
    /// Run the local indicator hook; nothing is sent back.
    Indicator,
    /// Blank line; ignored.
    Empty,
    /// Anything else is handed to the shell.
    Shell(String),
}

/// Reserved control lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayTokens {
    pub quit: String,
    pub close: String,
    pub indicator: String,
}

impl Default for RelayTokens {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}

impl RelayTokens {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            quit: config.quit_token.clone(),
            close: config.close_token.clone(),
            indicator: config.indicator_token.clone(),
        }
    }

    /// Classify a line after stripping trailing whitespace and line endings.
    pub fn parse(&self, line: &str) -> RelayCommand {
        let line = line.trim_end();
        if line.is_empty() {
            RelayCommand::Empty
        } else if line == self.quit {
            RelayCommand::Quit
        } else if line == self.close {
            RelayCommand::CloseServer
        } else if line == self.indicator {
            RelayCommand::Indicator
        } else {
            RelayCommand::Shell(line.to_string())
        }
    }
}
