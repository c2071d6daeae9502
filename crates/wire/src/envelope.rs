// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Envelope types exchanged over a stream connection.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use harness_core::{CommandId, ExitStatus, ObservedEvent, ThreadId};

use crate::command::Command;

/// Client → server envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ClientEnvelope {
    /// Required first message when the server holds an auth token.
    #[serde(rename = "auth")]
    Auth { token: String },

    #[serde(rename = "command", rename_all = "camelCase")]
    Command { command_id: CommandId, command: Command },

    #[serde(rename = "pty.input", rename_all = "camelCase")]
    PtyInput { session_id: ThreadId, data_base64: String },

    #[serde(rename = "pty.resize", rename_all = "camelCase")]
    PtyResize { session_id: ThreadId, cols: u16, rows: u16 },

    #[serde(rename = "pty.signal", rename_all = "camelCase")]
    PtySignal { session_id: ThreadId, signal: PtySignalKind },
}

impl ClientEnvelope {
    /// Post-parse validation; fields serde cannot express.
    pub fn validate(&self) -> bool {
        match self {
            Self::PtyResize { cols, rows, .. } => *cols > 0 && *rows > 0,
            Self::PtyInput { data_base64, .. } => decode_chunk(data_base64).is_some(),
            _ => true,
        }
    }
}

/// Signals a controller may deliver to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PtySignalKind {
    Interrupt,
    Eof,
    Terminate,
}

harness_core::simple_display! {
    PtySignalKind {
        Interrupt => "interrupt",
        Eof => "eof",
        Terminate => "terminate",
    }
}

/// Server → client envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ServerEnvelope {
    #[serde(rename = "auth.ok")]
    AuthOk,

    #[serde(rename = "auth.error")]
    AuthError { error: String },

    #[serde(rename = "command.accepted", rename_all = "camelCase")]
    CommandAccepted { command_id: CommandId },

    #[serde(rename = "command.completed", rename_all = "camelCase")]
    CommandCompleted { command_id: CommandId, result: serde_json::Value },

    #[serde(rename = "command.failed", rename_all = "camelCase")]
    CommandFailed { command_id: CommandId, error: CommandError },

    /// `cursor` is the broker byte cursor after this chunk.
    #[serde(rename = "pty.output", rename_all = "camelCase")]
    PtyOutput { session_id: ThreadId, cursor: u64, chunk_base64: String },

    #[serde(rename = "pty.event", rename_all = "camelCase")]
    PtyEvent { session_id: ThreadId, event: SessionEvent },

    #[serde(rename = "pty.exit", rename_all = "camelCase")]
    PtyExit { session_id: ThreadId, exit: ExitStatus },

    #[serde(rename = "stream.event", rename_all = "camelCase")]
    StreamEvent { event: ObservedEvent },
}

/// Stable failure payload for `command.failed`.
///
/// `kind` values are part of the protocol: clients match on strings such as
/// `session-not-found` and `session-not-live` to decide between recovery and
/// surfacing the error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandError {
    pub kind: String,
    pub message: String,
}

impl CommandError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind: kind.into(), message: message.into() }
    }

    pub fn session_not_found(session_id: &ThreadId) -> Self {
        Self::new("session-not-found", format!("no session {session_id}"))
    }

    pub fn session_not_live(session_id: &ThreadId) -> Self {
        Self::new("session-not-live", format!("session {session_id} has no live pty"))
    }

    pub fn unknown_command(raw: &str) -> Self {
        Self::new("unknown-command", format!("unknown command type {raw:?}"))
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Sideband events delivered via `pty.event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionEvent {
    #[serde(rename_all = "camelCase")]
    Notify { record: serde_json::Value },
    #[serde(rename_all = "camelCase")]
    SessionExit { exit: ExitStatus },
    TurnCompleted,
    #[serde(rename_all = "camelCase")]
    AttentionRequired { reason: String, record: serde_json::Value },
}

/// Base64-encode a PTY byte chunk for the wire.
pub fn encode_chunk(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode a base64 chunk; `None` on malformed input.
pub fn decode_chunk(encoded: &str) -> Option<Vec<u8>> {
    base64::engine::general_purpose::STANDARD.decode(encoded).ok()
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
