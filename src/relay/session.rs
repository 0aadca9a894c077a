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

//! Session: one connected relay client.
//!
//! Requests are newline-terminated lines; each response is the raw output
//! of the command with no framing. A request is fully answered before the
//! next line is read.

use bytes::BytesMut;
use futures::StreamExt;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::command::{RelayCommand, RelayTokens};
use super::executor::ShellExecutor;
use crate::config::RelayConfig;
use crate::error::RelayError;

/// Request lines longer than this are rejected unless configured otherwise.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent the quit token.
    ClientQuit,
    /// The client closed its side.
    Disconnected,
    /// The client asked for the whole relay to stop.
    CloseServer,
    Cancelled,
}

/// One newline-terminated request as read off the wire.
#[derive(Debug)]
enum Request {
    Line(String),
    /// Longer than the limit; the rest of it up to the newline is dropped.
    TooLong,
    NotUtf8,
}

/// [`LinesCodec`] that reports bad lines as requests instead of ending the
/// stream.
struct RequestCodec(LinesCodec);

impl RequestCodec {
    fn new(max_length: usize) -> Self {
        Self(LinesCodec::new_with_max_length(max_length))
    }
}

fn classify(decoded: Result<Option<String>, LinesCodecError>) -> io::Result<Option<Request>> {
    match decoded {
        Ok(line) => Ok(line.map(Request::Line)),
        Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Request::TooLong)),
        Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
            Ok(Some(Request::NotUtf8))
        }
        Err(LinesCodecError::Io(e)) => Err(e),
    }
}

impl Decoder for RequestCodec {
    type Item = Request;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Request>> {
        classify(self.0.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<Request>> {
        classify(self.0.decode_eof(buf))
    }
}

/// Per-line behaviour shared by every session of a relay.
#[derive(Debug, Clone)]
pub struct RelayHandler {
    tokens: RelayTokens,
    executor: ShellExecutor,
    indicator_command: Option<String>,
    max_line_length: usize,
}

impl Default for RelayHandler {
    fn default() -> Self {
        Self::new(RelayTokens::default(), ShellExecutor::default(), None)
    }
}

impl RelayHandler {
    pub fn new(
        tokens: RelayTokens,
        executor: ShellExecutor,
        indicator_command: Option<String>,
    ) -> Self {
        Self {
            tokens,
            executor,
            indicator_command,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Longest request line accepted, newline excluded.
    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            RelayTokens::from_config(config),
            ShellExecutor::new(&config.shell),
            config.indicator_command.clone(),
        )
        .with_max_line_length(config.max_line_length)
    }

    /// Serve one client until it quits, disconnects, or `cancel` fires.
    pub async fn run_session<S>(
        &self,
        stream: S,
        peer: &str,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd, RelayError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut requests = FramedRead::new(reader, RequestCodec::new(self.max_line_length));

        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                received = requests.next() => received,
            };

            let line = match received {
                Some(Ok(Request::Line(line))) => line,
                None => {
                    info!("Client {} disconnected", peer);
                    return Ok(SessionEnd::Disconnected);
                }
                Some(Ok(Request::NotUtf8)) => {
                    warn!(target: "relay", "Received non UTF-8 data from {}", peer);
                    send(&mut writer, b"Error: command is not valid UTF-8\n").await?;
                    continue;
                }
                Some(Ok(Request::TooLong)) => {
                    warn!(
                        target: "relay",
                        "Received a line over {} bytes from {}, dropping it",
                        self.max_line_length, peer
                    );
                    let reply = format!(
                        "Error: command exceeds {} bytes\n",
                        self.max_line_length
                    );
                    send(&mut writer, reply.as_bytes()).await?;
                    continue;
                }
                Some(Err(e)) => return Err(RelayError::transport("receiving a command", e)),
            };

            match self.tokens.parse(&line) {
                RelayCommand::Empty => {
                    debug!(target: "relay", "Received empty line from {}, ignoring", peer);
                    continue;
                }
                RelayCommand::Quit => {
                    info!(target: "relay", "Received {:?} from {}, ending connection", line.trim_end(), peer);
                    if let Err(e) = writer.shutdown().await {
                        debug!("Shutdown of {} failed: {}", peer, e);
                    }
                    return Ok(SessionEnd::ClientQuit);
                }
                RelayCommand::CloseServer => {
                    info!(target: "relay", "Received {:?} from {}, closing relay", line.trim_end(), peer);
                    if let Err(e) = writer.shutdown().await {
                        debug!("Shutdown of {} failed: {}", peer, e);
                    }
                    return Ok(SessionEnd::CloseServer);
                }
                RelayCommand::Indicator => {
                    info!(target: "relay", "Received indicator token from {}", peer);
                    self.run_indicator(cancel).await;
                }
                RelayCommand::Shell(command) => {
                    info!(target: "relay", "Received command from {}: {}", peer, command);

                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
                        result = self.executor.execute(&command) => result,
                    };

                    if result.is_success() {
                        info!(target: "relay", "Command succeeded: {}", command);
                    } else {
                        warn!(target: "relay", "Command failed: {}", command);
                    }

                    let bytes = result.into_bytes();
                    debug!("Sending {} bytes to {}", bytes.len(), peer);
                    send(&mut writer, &bytes).await?;
                }
            }
        }
    }

    async fn run_indicator(&self, cancel: &CancellationToken) {
        let Some(command) = &self.indicator_command else {
            debug!("No indicator command configured");
            return;
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = self.executor.execute(command) => result,
        };
        if result.is_success() {
            info!(target: "relay", "Indicator command ran: {}", command);
        } else {
            warn!(target: "relay", "Indicator command failed: {}", command);
        }
    }
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> Result<(), RelayError> {
    if bytes.is_empty() {
        return Ok(());
    }
    writer
        .write_all(bytes)
        .await
        .map_err(|e| RelayError::transport("sending a response", e))?;
    writer
        .flush()
        .await
        .map_err(|e| RelayError::transport("flushing a response", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::{duplex, AsyncReadExt};

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    async fn read_some<R: AsyncRead + Unpin>(reader: &mut R) -> Vec<u8> {
        let mut buf = vec![0u8; 1024];
        let n = reader.read(&mut buf).await.unwrap();
        buf.truncate(n);
        buf
    }

    #[tokio::test]
    async fn test_command_output_round_trip() {
        let (mut client, server) = duplex(4096);
        let handler = RelayHandler::default();
        let cancel = CancellationToken::new();

        let session = tokio::spawn(async move {
            handler.run_session(server, "test", &cancel).await
        });

        client.write_all(b"echo hello\n").await.unwrap();
        assert_eq!(read_some(&mut client).await, b"hello\n");

        client.write_all(b"Q\n").await.unwrap();
        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::ClientQuit);
    }

    #[tokio::test]
    async fn test_requests_are_answered_in_order() {
        let (mut client, server) = duplex(4096);
        let handler = RelayHandler::default();
        let cancel = CancellationToken::new();

        let session = tokio::spawn(async move {
            handler.run_session(server, "test", &cancel).await
        });

        // Both requests in one write; the second must not start before the
        // first has answered.
        client
            .write_all(b"sleep 0.2; echo first\necho second\nQ\n")
            .await
            .unwrap();

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"first\nsecond\n");
        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::ClientQuit);
    }

    #[tokio::test]
    async fn test_error_text_sent_and_session_continues() {
        let (mut client, server) = duplex(4096);
        let handler = RelayHandler::default();
        let cancel = CancellationToken::new();

        let session = tokio::spawn(async move {
            handler.run_session(server, "test", &cancel).await
        });

        client.write_all(b"exit 2\n").await.unwrap();
        let reply = String::from_utf8(read_some(&mut client).await).unwrap();
        assert_eq!(
            reply,
            "Error executing command: Command 'exit 2' returned non-zero exit status 2.\nOutput: "
        );

        client.write_all(b"echo still here\n").await.unwrap();
        assert_eq!(read_some(&mut client).await, b"still here\n");

        drop(client);
        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::Disconnected);
    }

    #[tokio::test]
    async fn test_indicator_token_runs_hook_without_reply() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let marker = temp_dir.path().join("led");
        let handler = RelayHandler::new(
            RelayTokens::default(),
            ShellExecutor::default(),
            Some(format!("echo off > '{}'", marker.display())),
        );
        let (mut client, server) = duplex(4096);
        let cancel = CancellationToken::new();

        let session = tokio::spawn(async move {
            handler.run_session(server, "test", &cancel).await
        });

        client.write_all(b"stop led\n\nsocket close\n").await?;
        let mut received = Vec::new();
        client.read_to_end(&mut received).await?;

        assert!(received.is_empty());
        assert_eq!(session.await??, SessionEnd::CloseServer);
        assert_eq!(std::fs::read_to_string(&marker)?, "off\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_utf8_gets_error_reply() {
        let (mut client, server) = duplex(4096);
        let handler = RelayHandler::default();
        let cancel = CancellationToken::new();

        let session = tokio::spawn(async move {
            handler.run_session(server, "test", &cancel).await
        });

        client.write_all(b"\xff\xfe\n").await.unwrap();
        assert_eq!(
            read_some(&mut client).await,
            b"Error: command is not valid UTF-8\n"
        );

        client.write_all(b"Q\n").await.unwrap();
        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::ClientQuit);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_running_command() {
        let (mut client, server) = duplex(4096);
        let handler = RelayHandler::default();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let session = tokio::spawn(async move {
            handler.run_session(server, "test", &cancel).await
        });

        client.write_all(b"sleep 30\n").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        trigger.cancel();

        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::Cancelled);
    }

    #[tokio::test]
    async fn test_overlong_line_rejected_and_session_continues() {
        let (mut client, server) = duplex(8192);
        let handler = RelayHandler::default().with_max_line_length(16);
        let cancel = CancellationToken::new();

        let session = tokio::spawn(async move {
            handler.run_session(server, "test", &cancel).await
        });

        let mut request = format!("echo {}\n", "x".repeat(64)).into_bytes();
        request.extend_from_slice(b"echo ok\nQ\n");
        client.write_all(&request).await.unwrap();

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"Error: command exceeds 16 bytes\nok\n");
        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::ClientQuit);
    }

    #[tokio::test]
    async fn test_line_at_limit_is_accepted() {
        let (mut client, server) = duplex(4096);
        let handler = RelayHandler::default().with_max_line_length(10);
        let cancel = CancellationToken::new();

        let session = tokio::spawn(async move {
            handler.run_session(server, "test", &cancel).await
        });

        // "echo 12345" is exactly ten bytes.
        client.write_all(b"echo 12345\nQ\n").await.unwrap();

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"12345\n");
        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::ClientQuit);
    }

    #[test]
    fn test_default_limit_matches_config() {
        assert_eq!(
            RelayConfig::default().max_line_length,
            DEFAULT_MAX_LINE_LENGTH
        );
    }

    #[tokio::test]
    async fn test_empty_line_is_logged_without_reply() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (mut client, server) = duplex(4096);
        client.write_all(b"   \nQ\n").await.unwrap();

        let end = RelayHandler::default()
            .run_session(server, "test", &CancellationToken::new())
            .await
            .unwrap();

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(end, SessionEnd::ClientQuit);
        assert!(received.is_empty());
        assert!(
            logs.text().contains("Received empty line from test"),
            "{}",
            logs.text()
        );
    }
}
