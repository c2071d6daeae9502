// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Newline-delimited JSON framing.
//!
//! A [`LineDecoder`] accumulates raw bytes and yields complete lines; each
//! line parses independently. Invalid lines are logged and skipped — a
//! malformed envelope never tears down a connection.

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::warn;

use crate::envelope::{ClientEnvelope, ServerEnvelope};

/// Hard cap on one wire line. Large terminal chunks are base64 of bounded
/// PTY reads, far below this.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Line too long: {size} bytes (max {max})")]
    LineTooLong { size: usize, max: usize },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout")]
    Timeout,
}

/// Encode one envelope as a JSON line (terminating `\n` included).
pub fn encode_envelope<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut line = serde_json::to_vec(msg)?;
    if line.len() >= MAX_LINE_BYTES {
        return Err(ProtocolError::LineTooLong { size: line.len(), max: MAX_LINE_BYTES });
    }
    line.push(b'\n');
    Ok(line)
}

/// Byte accumulator that yields complete `\n`-terminated lines.
///
/// Partial messages never cross a `push` boundary: bytes stay buffered until
/// their terminator arrives. An oversized line is discarded wholesale once
/// its terminator shows up.
#[derive(Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
    discarding: bool,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns the complete lines they finished.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if b == b'\n' {
                if self.discarding {
                    self.discarding = false;
                } else if !self.buf.is_empty() {
                    match String::from_utf8(std::mem::take(&mut self.buf)) {
                        Ok(line) => lines.push(line),
                        Err(_) => warn!("dropping non-UTF-8 wire line"),
                    }
                }
                self.buf.clear();
                continue;
            }
            if self.discarding {
                continue;
            }
            if self.buf.len() >= MAX_LINE_BYTES {
                warn!(max = MAX_LINE_BYTES, "dropping oversized wire line");
                self.buf.clear();
                self.discarding = true;
                continue;
            }
            self.buf.push(b);
        }
        lines
    }
}

/// Parse one line into a client envelope.
///
/// Returns `None` for anything malformed: unknown `kind`, missing fields,
/// wrong types, invalid base64, zero-sized resize. Never panics on input.
pub fn parse_client_envelope(line: &str) -> Option<ClientEnvelope> {
    let envelope: ClientEnvelope = match serde_json::from_str(line) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(%err, "invalid client envelope");
            return None;
        }
    };
    envelope.validate().then_some(envelope)
}

/// Parse one line into a server envelope. Same discipline as
/// [`parse_client_envelope`].
pub fn parse_server_envelope(line: &str) -> Option<ServerEnvelope> {
    match serde_json::from_str(line) {
        Ok(envelope) => Some(envelope),
        Err(err) => {
            warn!(%err, "invalid server envelope");
            None
        }
    }
}

/// Write one envelope with a timeout.
pub async fn write_envelope<W, T>(
    writer: &mut W,
    msg: &T,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let line = encode_envelope(msg)?;
    tokio::time::timeout(timeout, async {
        writer.write_all(&line).await?;
        writer.flush().await
    })
    .await
    .map_err(|_| ProtocolError::Timeout)??;
    Ok(())
}

/// Read raw bytes into `decoder` until it yields at least one line or the
/// peer closes. Returns the decoded lines (possibly more than one).
pub async fn read_line<R>(
    reader: &mut R,
    decoder: &mut LineDecoder,
    timeout: std::time::Duration,
) -> Result<Vec<String>, ProtocolError>
where
    R: AsyncReadExt + Unpin,
{
    let mut buf = [0u8; 8192];
    loop {
        let n = tokio::time::timeout(timeout, reader.read(&mut buf))
            .await
            .map_err(|_| ProtocolError::Timeout)??;
        if n == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }
        let lines = decoder.push(&buf[..n]);
        if !lines.is_empty() {
            return Ok(lines);
        }
    }
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
