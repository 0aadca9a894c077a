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

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use btrelay::config::{PairingPolicy, TransportKind};
use btrelay::pairing::PairingOutcome;
use btrelay::storage::DeviceRegistry;
use btrelay::{logging, App, Config};

#[derive(Parser)]
#[command(name = "btrelay", version)]
#[command(about = "Pair a Bluetooth device automatically, then relay shell commands from it")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// RFCOMM channel to listen on
    #[arg(long)]
    channel: Option<u8>,

    /// Relay transport
    #[arg(long, value_enum)]
    transport: Option<TransportKind>,

    /// Listen address for the tcp transport
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Pairing policy
    #[arg(long, value_enum)]
    policy: Option<PairingPolicy>,

    /// Log level, overridden by RUST_LOG
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Pair a device, then serve the relay (default)
    Run,
    /// Pair a device and exit
    Pair,
    /// Serve the relay without pairing
    Relay,
    /// List devices recorded during pairing
    Devices,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(channel) = self.channel {
            config.relay.channel = channel;
        }
        if let Some(transport) = self.transport {
            config.relay.transport = transport;
        }
        if let Some(listen) = self.listen {
            config.relay.tcp_listen = listen;
        }
        if let Some(policy) = self.policy {
            config.pairing.policy = policy;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    cli.apply(&mut config);

    let _log_guard = logging::init(&config.logging)?;

    info!("Starting btrelay v{}", env!("CARGO_PKG_VERSION"));

    let command = cli.command.unwrap_or(Commands::Run);
    let cancel = CancellationToken::new();
    tokio::spawn(watch_signals(cancel.clone()));

    let app = App::new(config, cancel);
    let result = match command {
        Commands::Run => app.run().await.map(|exit| info!("Finished: {:?}", exit)),
        Commands::Pair => app.pair().await.map(|outcome| match outcome {
            PairingOutcome::Paired { device, completion } => info!(
                "Paired {} ({:?})",
                device.map(|id| id.to_string()).unwrap_or_else(|| "unknown device".to_string()),
                completion
            ),
            PairingOutcome::Cancelled => info!("Pairing cancelled"),
        }),
        Commands::Relay => app.relay().await.map(|exit| info!("Relay stopped: {:?}", exit)),
        Commands::Devices => list_devices(app.config()),
    };

    info!("State at exit: {}", app.state().summary());

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

fn list_devices(config: &Config) -> Result<()> {
    let registry = DeviceRegistry::open(&config.registry.path)?;
    let entries = registry
        .entries()
        .with_context(|| format!("Failed to read {:?}", registry.path()))?;

    if entries.is_empty() {
        println!("No devices recorded in {:?}", registry.path());
        return Ok(());
    }
    for id in entries {
        println!("{}", id);
    }
    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM.
async fn watch_signals(token: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl+C: {}", e);
                return;
            }
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }

    token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_enum_flags_override_config() -> Result<()> {
        let cli = Cli::try_parse_from([
            "btrelay",
            "--policy",
            "explicit",
            "--transport",
            "tcp",
            "--listen",
            "0.0.0.0:4000",
            "relay",
        ])?;
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(cli.command, Some(Commands::Relay));
        assert_eq!(config.pairing.policy, PairingPolicy::Explicit);
        assert_eq!(config.relay.transport, TransportKind::Tcp);
        assert_eq!(config.relay.tcp_listen, "0.0.0.0:4000".parse::<SocketAddr>()?);
        Ok(())
    }

    #[test]
    fn test_unknown_policy_lists_possible_values() {
        let err = match Cli::try_parse_from(["btrelay", "--policy", "manual"]) {
            Ok(_) => panic!("unknown policy accepted"),
            Err(e) => e.to_string(),
        };
        assert!(err.contains("agent"), "{err}");
        assert!(err.contains("explicit"), "{err}");
    }
}
