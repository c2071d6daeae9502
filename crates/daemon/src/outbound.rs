// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection outbound handle.
//!
//! Every envelope bound for a client goes through its connection's bounded
//! writer queue, which keeps delivery ordered per connection. A subscriber
//! that cannot drain its queue is the slowest client: the send fails, the
//! connection's cancellation token fires, and the writer tears the
//! connection down (logged, not fatal to anyone else).

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use harness_wire::ServerEnvelope;

/// Connection identifier, unique per gateway process.
pub type ConnId = u64;

/// Cloneable sender half of one connection's writer queue.
#[derive(Clone)]
pub struct Outbound {
    conn_id: ConnId,
    tx: mpsc::Sender<ServerEnvelope>,
    cancel: CancellationToken,
}

impl Outbound {
    pub fn new(
        conn_id: ConnId,
        tx: mpsc::Sender<ServerEnvelope>,
        cancel: CancellationToken,
    ) -> Self {
        Self { conn_id, tx, cancel }
    }

    pub fn conn_id(&self) -> ConnId {
        self.conn_id
    }

    /// Queue one envelope. Returns false when the connection is gone or was
    /// just dropped for falling behind.
    pub fn send(&self, envelope: ServerEnvelope) -> bool {
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(conn = self.conn_id, "dropping slow client: writer queue full");
                self.cancel.cancel();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed() || self.cancel.is_cancelled()
    }
}

#[cfg(test)]
#[path = "outbound_tests.rs"]
mod tests;
