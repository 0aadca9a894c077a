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

//! Append-only log of devices seen during pairing.
//!
//! One identifier per line, insertion ordered, never rewritten. The log is
//! not deduplicated; callers decide when a device is worth recording.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::bluetooth::DeviceIdentifier;

/// Handle to the device identifier log.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    file_path: PathBuf,
}

impl DeviceRegistry {
    /// Open the registry at `path`, creating its parent directory.
    ///
    /// The file itself is created on the first [`record`](Self::record).
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {:?}", parent))?;
        }

        debug!("Device registry at {:?}", path);
        Ok(Self {
            file_path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Append `id` to the log.
    pub fn record(&self, id: &DeviceIdentifier) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .with_context(|| format!("Failed to open {:?}", self.file_path))?;

        writeln!(file, "{}", id)
            .with_context(|| format!("Failed to write {:?}", self.file_path))?;

        info!("Saved device address {} to {:?}", id, self.file_path);
        Ok(())
    }

    /// All recorded identifiers in insertion order. Unparseable lines are
    /// skipped.
    pub fn entries(&self) -> Result<Vec<DeviceIdentifier>> {
        if !self.file_path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.file_path)
            .with_context(|| format!("Failed to read {:?}", self.file_path))?;

        let mut entries = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.parse() {
                Ok(id) => entries.push(id),
                Err(e) => warn!("Skipping line {} of {:?}: {}", index + 1, self.file_path, e),
            }
        }

        Ok(entries)
    }

    /// The most recently recorded identifier, if any.
    pub fn last_recorded(&self) -> Result<Option<DeviceIdentifier>> {
        Ok(self.entries()?.pop())
    }
}
