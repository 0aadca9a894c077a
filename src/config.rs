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

//! Configuration loaded from `config.toml`.
//!
//! Every field has a default, so a missing file or a partial file is valid.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Application name used for config and data directories.
pub const APP_NAME: &str = "btrelay";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub pairing: PairingConfig,
    pub registry: RegistryConfig,
    pub relay: RelayConfig,
    pub advertiser: AdvertiserConfig,
    pub logging: LogConfig,
}

/// How the interactive pairing agent is launched and paced.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Pause after each startup command so the agent can print its prompt.
    pub settle_delay_ms: u64,
    /// How long to wait for the agent to exit after `quit` before killing it.
    pub quit_grace_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: "bluetoothctl".to_string(),
            args: Vec::new(),
            settle_delay_ms: 1000,
            quit_grace_ms: 2000,
        }
    }
}

impl AgentConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn quit_grace(&self) -> Duration {
        Duration::from_millis(self.quit_grace_ms)
    }
}

/// What the controller does once a new device shows up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PairingPolicy {
    /// Let the agent's default pairing agent complete the pairing.
    #[default]
    Agent,
    /// Send `pair`, `trust` and `connect` for every new device.
    Explicit,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    pub policy: PairingPolicy,
    pub invalid_command_countdown_secs: u64,
    /// Agent relaunches allowed after a countdown expires.
    pub max_relaunches: u32,
    /// Treat "Serial Port service registered" as a completed pairing.
    pub relay_on_service_registered: bool,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            policy: PairingPolicy::Agent,
            invalid_command_countdown_secs: 10,
            max_relaunches: 3,
            relay_on_service_registered: true,
        }
    }
}

impl PairingConfig {
    pub fn countdown(&self) -> Duration {
        Duration::from_secs(self.invalid_command_countdown_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub path: PathBuf,
    /// Seed the last accepted device from the log's final line.
    pub seed_from_log: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("device_connected.txt"),
            seed_from_log: true,
        }
    }
}

/// Socket family the relay listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Rfcomm,
    Tcp,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub transport: TransportKind,
    pub channel: u8,
    pub tcp_listen: SocketAddr,
    pub backlog: u32,
    pub shell: String,
    pub quit_token: String,
    pub close_token: String,
    pub indicator_token: String,
    /// Shell command run locally when the indicator token arrives.
    pub indicator_command: Option<String>,
    /// Longest request line accepted from a client, newline excluded.
    pub max_line_length: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Rfcomm,
            channel: 23,
            tcp_listen: SocketAddr::from(([127, 0, 0, 1], 2323)),
            backlog: 1,
            shell: "/bin/sh".to_string(),
            quit_token: "Q".to_string(),
            close_token: "socket close".to_string(),
            indicator_token: "stop led".to_string(),
            indicator_command: None,
            max_line_length: crate::relay::DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdvertiserConfig {
    pub enabled: bool,
    pub program: String,
    pub use_sudo: bool,
    pub profile: String,
}

impl Default for AdvertiserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "sdptool".to_string(),
            use_sudo: true,
            profile: crate::bluetooth::SERIAL_PORT_PROFILE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub file_logging_enabled: bool,
    pub log_dir: PathBuf,
    pub file_name_prefix: String,
    /// "daily", "hourly", "minutely" or "never".
    pub rotation: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging_enabled: false,
            log_dir: data_dir().join("logs"),
            file_name_prefix: APP_NAME.to_string(),
            rotation: "daily".to_string(),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default config file location.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.toml"))
}

impl Config {
    /// Load from `path`, or return defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config file {:?} doesn't exist, using defaults", path);
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load from an explicit path or the default location.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path.map(Path::to_path_buf).or_else(default_config_path) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = Config::load(&temp_dir.path().join("config.toml"))?;

        assert_eq!(config.agent.program, "bluetoothctl");
        assert_eq!(config.agent.settle_delay(), Duration::from_secs(1));
        assert_eq!(config.pairing.countdown(), Duration::from_secs(10));
        assert_eq!(config.pairing.max_relaunches, 3);
        assert_eq!(config.pairing.policy, PairingPolicy::Agent);
        assert_eq!(config.relay.channel, 23);
        assert_eq!(config.relay.backlog, 1);
        assert_eq!(config.relay.quit_token, "Q");
        assert_eq!(config.relay.close_token, "socket close");
        assert_eq!(config.relay.indicator_token, "stop led");
        assert_eq!(config.relay.max_line_length, 1024);
        assert!(config.registry.path.ends_with("device_connected.txt"));
        Ok(())
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[pairing]
policy = "explicit"
max_relaunches = 1

[relay]
transport = "tcp"
channel = 22
indicator_command = "echo off > /tmp/led"
"#,
        )?;

        let config = Config::load(&path)?;
        assert_eq!(config.pairing.policy, PairingPolicy::Explicit);
        assert_eq!(config.pairing.max_relaunches, 1);
        assert_eq!(config.pairing.invalid_command_countdown_secs, 10);
        assert_eq!(config.relay.transport, TransportKind::Tcp);
        assert_eq!(config.relay.channel, 22);
        assert_eq!(
            config.relay.indicator_command.as_deref(),
            Some("echo off > /tmp/led")
        );
        assert_eq!(config.relay.shell, "/bin/sh");
        assert!(config.advertiser.enabled);
        Ok(())
    }

    #[test]
    fn test_invalid_file_is_an_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[relay]\nchannel = \"twenty\"\n")?;

        assert!(Config::load(&path).is_err());
        Ok(())
    }
}
