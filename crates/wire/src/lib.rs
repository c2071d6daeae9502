// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream protocol for gateway communication.
//!
//! Wire format: one UTF-8 JSON object per line, `\n` terminated.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod codec;
mod command;
mod envelope;

pub use codec::{
    encode_envelope, parse_client_envelope, parse_server_envelope, read_line, write_envelope,
    LineDecoder, ProtocolError, MAX_LINE_BYTES,
};
pub use command::{ClaimAction, ClaimResult, Command, SessionListResult, SnapshotResult};
pub use envelope::{
    decode_chunk, encode_chunk, ClientEnvelope, CommandError, PtySignalKind, ServerEnvelope,
    SessionEvent,
};
