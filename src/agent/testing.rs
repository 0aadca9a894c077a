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

//! In-memory agent that replays a fixed transcript and records writes.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

use super::{AgentLink, AgentSpawner};
use crate::error::PairingError;

/// One step of the conversation with a scripted agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exchange {
    Spawned,
    Read(String),
    Write(String),
    Terminated,
}

/// One entry of a scripted transcript.
#[derive(Debug, Clone)]
enum Step {
    Line(String),
    /// Stay silent for this long before the next line.
    Wait(Duration),
}

/// Transcript for one agent launch.
#[derive(Debug, Clone, Default)]
pub struct Script {
    steps: Vec<Step>,
    /// Close the output after the last line instead of staying silent.
    eof: bool,
}

impl Script {
    pub fn new(lines: &[&str]) -> Self {
        Self::default().then_lines(lines)
    }

    pub fn then_lines(mut self, lines: &[&str]) -> Self {
        self.steps
            .extend(lines.iter().map(|l| Step::Line(l.to_string())));
        self
    }

    /// Pause before the following lines; best used with a paused clock.
    pub fn then_wait(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Wait(duration));
        self
    }

    pub fn then_eof(mut self) -> Self {
        self.eof = true;
        self
    }
}

pub struct ScriptedAgent {
    steps: VecDeque<Step>,
    /// Deadline of the wait in progress, kept if `next_line` is dropped.
    waiting_until: Option<Instant>,
    eof: bool,
    log: Arc<Mutex<Vec<Exchange>>>,
}

impl AgentLink for ScriptedAgent {
    async fn send(&mut self, command: &str) -> Result<(), PairingError> {
        self.log.lock().push(Exchange::Write(command.to_string()));
        Ok(())
    }

    async fn next_line(&mut self) -> Result<Option<String>, PairingError> {
        loop {
            match self.steps.front() {
                Some(&Step::Wait(duration)) => {
                    let until = *self
                        .waiting_until
                        .get_or_insert_with(|| Instant::now() + duration);
                    sleep_until(until).await;
                    self.waiting_until = None;
                    self.steps.pop_front();
                }
                Some(Step::Line(_)) => {
                    if let Some(Step::Line(line)) = self.steps.pop_front() {
                        self.log.lock().push(Exchange::Read(line.clone()));
                        return Ok(Some(line));
                    }
                }
                None if self.eof => return Ok(None),
                None => std::future::pending::<()>().await,
            }
        }
    }

    async fn quit(&mut self, _grace: Duration) -> Result<(), PairingError> {
        self.send("quit").await
    }

    async fn terminate(&mut self) {
        self.log.lock().push(Exchange::Terminated);
    }
}

/// Hands out one [`Script`] per launch; every launch shares one log.
#[derive(Clone, Default)]
pub struct ScriptedSpawner {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    log: Arc<Mutex<Vec<Exchange>>>,
}

impl ScriptedSpawner {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts.into())),
            log: Arc::default(),
        }
    }

    pub fn log(&self) -> Vec<Exchange> {
        self.log.lock().clone()
    }

    /// Only the commands written, in order.
    pub fn writes(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter_map(|e| match e {
                Exchange::Write(w) => Some(w.clone()),
                _ => None,
            })
            .collect()
    }
}

impl AgentSpawner for ScriptedSpawner {
    type Link = ScriptedAgent;

    fn spawn(&self) -> Result<ScriptedAgent, PairingError> {
        let script = self.scripts.lock().pop_front().unwrap_or_default();
        self.log.lock().push(Exchange::Spawned);
        Ok(ScriptedAgent {
            steps: script.steps.into(),
            waiting_until: None,
            eof: script.eof,
            log: self.log.clone(),
        })
    }
}
