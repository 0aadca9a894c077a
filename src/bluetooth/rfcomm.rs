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

//! RFCOMM server socket for the command relay.

use bluer::rfcomm::{Listener, Socket, SocketAddr, Stream};
use bluer::Address;
use std::io;
use tracing::info;

use crate::relay::RelayListener;

/// Listening RFCOMM socket bound to a fixed channel on the local adapter.
///
/// Dropping it closes the listening socket.
pub struct RfcommListener {
    listener: Listener,
    channel: u8,
}

impl RfcommListener {
    /// Bind to `channel` on any local adapter and start listening.
    pub fn bind(channel: u8, backlog: u32) -> io::Result<Self> {
        let socket = Socket::new()?;
        socket.bind(SocketAddr::new(Address::any(), channel))?;
        let listener = socket.listen(backlog)?;

        info!(
            "Listening for connections on RFCOMM channel {} (backlog {})",
            channel, backlog
        );

        Ok(Self { listener, channel })
    }
}

impl RelayListener for RfcommListener {
    type Stream = Stream;

    async fn accept(&self) -> io::Result<(Self::Stream, String)> {
        let (stream, peer) = self.listener.accept().await?;
        Ok((stream, format!("{} (channel {})", peer.addr, peer.channel)))
    }

    fn describe(&self) -> String {
        format!("rfcomm channel {}", self.channel)
    }
}
