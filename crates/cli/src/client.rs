// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream client: dial, auth, demux.
//!
//! One TCP connection carries everything: request/response command traffic
//! matched by `commandId`, plus the free-running envelope stream (PTY
//! output, observed events) surfaced through a broadcast channel for
//! whoever is rendering.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tracing::debug;

use harness_core::CommandId;
use harness_wire::{
    encode_envelope, parse_server_envelope, ClientEnvelope, Command, CommandError, LineDecoder,
    ProtocolError, PtySignalKind, ServerEnvelope,
};

/// Default timeout for one-shot commands. Streaming traffic is unbounded.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("gateway not reachable at {host}:{port}")]
    Unreachable { host: String, port: u16 },

    #[error("auth rejected: {0}")]
    AuthRejected(String),

    #[error("command failed: {0}")]
    Rejected(CommandError),

    #[error("command timed out")]
    CommandTimeout,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// True when the failure means "no gateway there", as opposed to a
    /// gateway that answered and said no.
    pub fn is_not_running(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::ConnectionClosed)
    }
}

type PendingMap = Arc<Mutex<HashMap<CommandId, oneshot::Sender<Result<serde_json::Value, CommandError>>>>>;

/// A live connection to the gateway.
#[derive(Debug)]
pub struct StreamClient {
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    pending: PendingMap,
    envelopes: broadcast::Sender<ServerEnvelope>,
    demux: tokio::task::JoinHandle<()>,
}

impl StreamClient {
    /// Dial once; fails fast when nothing listens.
    pub async fn connect(
        host: &str,
        port: u16,
        auth_token: Option<&str>,
    ) -> Result<Self, ClientError> {
        Self::connect_with_retry(host, port, auth_token, Duration::ZERO, Duration::ZERO).await
    }

    /// Dial with bounded retry: keeps trying until the window closes.
    pub async fn connect_with_retry(
        host: &str,
        port: u16,
        auth_token: Option<&str>,
        retry_window: Duration,
        retry_delay: Duration,
    ) -> Result<Self, ClientError> {
        let deadline = tokio::time::Instant::now() + retry_window;
        let stream = loop {
            match TcpStream::connect((host, port)).await {
                Ok(stream) => break stream,
                Err(err) => {
                    if tokio::time::Instant::now() >= deadline {
                        debug!(%err, host, port, "connect failed");
                        return Err(ClientError::Unreachable {
                            host: host.to_string(),
                            port,
                        });
                    }
                    tokio::time::sleep(retry_delay.max(Duration::from_millis(10))).await;
                }
            }
        };
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (envelope_tx, _) = broadcast::channel(1024);
        let (auth_tx, auth_rx) = oneshot::channel();

        let demux = tokio::spawn(demux_loop(
            read_half,
            Arc::clone(&pending),
            envelope_tx.clone(),
            Some(auth_tx),
        ));

        let client = Self {
            writer: Arc::new(tokio::sync::Mutex::new(write_half)),
            pending,
            envelopes: envelope_tx,
            demux,
        };

        if let Some(token) = auth_token {
            client.send(&ClientEnvelope::Auth { token: token.to_string() }).await?;
            match tokio::time::timeout(Duration::from_secs(5), auth_rx).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(message))) => return Err(ClientError::AuthRejected(message)),
                Ok(Err(_)) | Err(_) => return Err(ClientError::ConnectionClosed),
            }
        }
        Ok(client)
    }

    /// Issue a command and await its terminal envelope.
    pub async fn command(
        &self,
        command: Command,
        timeout: Duration,
    ) -> Result<serde_json::Value, ClientError> {
        let command_id = CommandId::new();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(command_id.clone(), tx);

        let envelope = ClientEnvelope::Command { command_id: command_id.clone(), command };
        if let Err(err) = self.send(&envelope).await {
            self.pending.lock().remove(&command_id);
            return Err(err);
        }

        let result = tokio::time::timeout(timeout, rx).await;
        match result {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(error))) => Err(ClientError::Rejected(error)),
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().remove(&command_id);
                Err(ClientError::CommandTimeout)
            }
        }
    }

    /// Raw envelope sender for pty.input / pty.resize / pty.signal.
    pub async fn send(&self, envelope: &ClientEnvelope) -> Result<(), ClientError> {
        let line = encode_envelope(envelope)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    pub async fn send_input(&self, session_id: &str, data: &[u8]) -> Result<(), ClientError> {
        self.send(&ClientEnvelope::PtyInput {
            session_id: session_id.into(),
            data_base64: harness_wire::encode_chunk(data),
        })
        .await
    }

    pub async fn send_signal(
        &self,
        session_id: &str,
        signal: PtySignalKind,
    ) -> Result<(), ClientError> {
        self.send(&ClientEnvelope::PtySignal { session_id: session_id.into(), signal }).await
    }

    /// Subscribe to the free-running envelope stream (everything that is not
    /// a command response for this client).
    pub fn envelopes(&self) -> broadcast::Receiver<ServerEnvelope> {
        self.envelopes.subscribe()
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.demux.abort();
    }
}

async fn demux_loop(
    mut reader: tokio::net::tcp::OwnedReadHalf,
    pending: PendingMap,
    envelopes: broadcast::Sender<ServerEnvelope>,
    mut auth_tx: Option<oneshot::Sender<Result<(), String>>>,
) {
    use tokio::io::AsyncReadExt;

    let mut decoder = LineDecoder::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for line in decoder.push(&buf[..n]) {
            let Some(envelope) = parse_server_envelope(&line) else { continue };
            match envelope {
                ServerEnvelope::AuthOk => {
                    if let Some(tx) = auth_tx.take() {
                        let _ = tx.send(Ok(()));
                    }
                }
                ServerEnvelope::AuthError { error } => {
                    if let Some(tx) = auth_tx.take() {
                        let _ = tx.send(Err(error));
                    }
                }
                ServerEnvelope::CommandAccepted { .. } => {
                    // Acceptance frees the op-queue slot; completion is
                    // tracked by the pending map.
                }
                ServerEnvelope::CommandCompleted { command_id, result } => {
                    if let Some(tx) = pending.lock().remove(&command_id) {
                        let _ = tx.send(Ok(result));
                    }
                }
                ServerEnvelope::CommandFailed { command_id, error } => {
                    if let Some(tx) = pending.lock().remove(&command_id) {
                        let _ = tx.send(Err(error));
                    }
                }
                other => {
                    let _ = envelopes.send(other);
                }
            }
        }
    }

    // Connection gone: abort every pending command.
    let mut pending = pending.lock();
    for (_, tx) in pending.drain() {
        drop(tx);
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
