// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! harness-storage: the control-plane sqlite database.
//!
//! Two writers share one database file with disjoint tables:
//!
//! - [`StateStore`] — directories, repositories, conversations, tasks.
//!   Single-writer from the server's perspective; callers hold it behind a
//!   mutex and clients never touch the file directly.
//! - [`EventLog`] — append-only normalized event envelopes, batched by a
//!   dedicated flusher (short delay or size trigger). Flush failures are
//!   logged and the batch discarded; ingestion never blocks on the disk.

mod event_log;
mod migrations;
mod store;

pub use event_log::{read_events, EventLog, FLUSH_DELAY, FLUSH_THRESHOLD};
pub use migrations::migrate;
pub use store::{StateStore, StoreError};
