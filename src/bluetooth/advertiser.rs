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

//! SDP service record registration.

use std::future::Future;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::AdvertiserConfig;
use crate::error::RegistrationError;

/// Registers a discoverable service record with the system Bluetooth stack.
pub trait ServiceAdvertiser: Send + Sync {
    /// Advertise `profile` on RFCOMM `channel`.
    fn advertise(
        &self,
        channel: u8,
        profile: &str,
    ) -> impl Future<Output = Result<(), RegistrationError>> + Send;
}

/// Advertiser that shells out to `sdptool add`.
#[derive(Debug, Clone)]
pub struct SdptoolAdvertiser {
    program: String,
    use_sudo: bool,
}

impl SdptoolAdvertiser {
    pub fn new(config: &AdvertiserConfig) -> Self {
        Self {
            program: config.program.clone(),
            use_sudo: config.use_sudo,
        }
    }

    /// The argv that will be executed, including the `sudo` prefix.
    pub fn command_line(&self, channel: u8, profile: &str) -> Vec<String> {
        let mut argv = Vec::with_capacity(5);
        if self.use_sudo {
            argv.push("sudo".to_string());
        }
        argv.push(self.program.clone());
        argv.push("add".to_string());
        argv.push(format!("--channel={}", channel));
        argv.push(profile.to_string());
        argv
    }
}

impl ServiceAdvertiser for SdptoolAdvertiser {
    async fn advertise(&self, channel: u8, profile: &str) -> Result<(), RegistrationError> {
        let argv = self.command_line(channel, profile);
        info!("Registering {} service on channel {}: {}", profile, channel, argv.join(" "));

        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RegistrationError::Spawn {
                program: argv[0].clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            debug!("{}: {}", self.program, line);
        }

        if output.status.success() {
            info!("{} service registered on channel {}", profile, channel);
            Ok(())
        } else {
            Err(RegistrationError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

/// Advertiser used when registration is disabled in the config.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAdvertiser;

impl ServiceAdvertiser for NoopAdvertiser {
    async fn advertise(&self, channel: u8, profile: &str) -> Result<(), RegistrationError> {
        debug!(
            "Service advertisement disabled, skipping {} on channel {}",
            profile, channel
        );
        Ok(())
    }
}
