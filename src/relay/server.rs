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

//! Accept loop: one client at a time, sequentially.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::session::{RelayHandler, SessionEnd};
use super::transport::RelayListener;
use crate::error::RelayError;
use crate::state::{AppState, RelayStatus};

/// Why the relay stopped serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayExit {
    /// A client sent the close token.
    Closed,
    Cancelled,
}

/// Marks the relay stopped however `serve` returns.
struct StoppedOnDrop(Arc<AppState>);

impl Drop for StoppedOnDrop {
    fn drop(&mut self) {
        self.0.set_relay_status(RelayStatus::Stopped);
    }
}

pub struct RelayServer<L: RelayListener> {
    listener: L,
    handler: RelayHandler,
    state: Arc<AppState>,
}

impl<L: RelayListener> RelayServer<L> {
    pub fn new(listener: L, handler: RelayHandler, state: Arc<AppState>) -> Self {
        Self {
            listener,
            handler,
            state,
        }
    }

    /// Serve clients until the close token, a transport fault, or `cancel`.
    ///
    /// The listener and any connected client are closed on return.
    pub async fn serve(self, cancel: &CancellationToken) -> Result<RelayExit, RelayError> {
        let _stopped = StoppedOnDrop(self.state.clone());
        let endpoint = self.listener.describe();

        loop {
            self.state.set_relay_status(RelayStatus::Listening {
                endpoint: endpoint.clone(),
            });
            info!("Waiting for a relay client on {}", endpoint);

            let accepted = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Relay cancelled while waiting for a client");
                    return Ok(RelayExit::Cancelled);
                }
                accepted = self.listener.accept() => accepted,
            };
            let (stream, peer) = accepted.map_err(|e| {
                error!("Failed to accept relay client: {}", e);
                RelayError::transport("accepting a connection", e)
            })?;

            info!("Connection established with {}", peer);
            self.state
                .set_relay_status(RelayStatus::Serving { peer: peer.clone() });

            match self.handler.run_session(stream, &peer, cancel).await {
                Ok(SessionEnd::ClientQuit) | Ok(SessionEnd::Disconnected) => {
                    info!("Connection with {} closed", peer);
                }
                Ok(SessionEnd::CloseServer) => {
                    info!("Closing relay listener on {}", endpoint);
                    return Ok(RelayExit::Closed);
                }
                Ok(SessionEnd::Cancelled) => {
                    info!("Relay cancelled, dropping {}", peer);
                    return Ok(RelayExit::Cancelled);
                }
                Err(e) => {
                    error!("Relay session with {} failed: {}", peer, e);
                    return Err(e);
                }
            }
        }
    }
}
