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

//! Tracing subscriber setup.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LogConfig;

/// Keeps the file writer alive; logs are flushed when it is dropped.
pub struct LoggingGuard {
    _guard: Option<WorkerGuard>,
}

fn rotation(name: &str) -> Rotation {
    match name.to_lowercase().as_str() {
        "hourly" => Rotation::HOURLY,
        "minutely" => Rotation::MINUTELY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init(config: &LogConfig) -> Result<LoggingGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, guard) = if config.file_logging_enabled {
        std::fs::create_dir_all(&config.log_dir)
            .with_context(|| format!("Failed to create log directory {:?}", config.log_dir))?;

        let appender = RollingFileAppender::new(
            rotation(&config.rotation),
            &config.log_dir,
            &config.file_name_prefix,
        );
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LoggingGuard { _guard: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_names() {
        assert_eq!(rotation("Hourly"), Rotation::HOURLY);
        assert_eq!(rotation("never"), Rotation::NEVER);
        assert_eq!(rotation("weekly"), Rotation::DAILY);
    }
}
