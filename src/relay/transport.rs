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

//! Listening sockets the relay can serve on.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tracing::info;

/// A bound, listening, connection-oriented socket.
///
/// Dropping the listener closes it.
pub trait RelayListener: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for the next client. Returns the stream and a printable peer.
    fn accept(&self) -> impl Future<Output = io::Result<(Self::Stream, String)>> + Send;

    /// Where the listener is bound, for logs.
    fn describe(&self) -> String;
}

/// TCP listener with an explicit backlog, for bench setups without a radio.
pub struct TcpRelayListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpRelayListener {
    pub fn bind(addr: SocketAddr, backlog: u32) -> io::Result<Self> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(backlog)?;
        let local_addr = listener.local_addr()?;

        info!(
            "Listening for connections on tcp {} (backlog {})",
            local_addr, backlog
        );

        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl RelayListener for TcpRelayListener {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<(TcpStream, String)> {
        let (stream, peer) = self.listener.accept().await?;
        Ok((stream, peer.to_string()))
    }

    fn describe(&self) -> String {
        format!("tcp {}", self.local_addr)
    }
}
