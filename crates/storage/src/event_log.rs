// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only event store with group commit.
//!
//! Envelopes are accepted on a channel and written by a dedicated flusher
//! thread in one transaction per batch. A batch goes to disk when it reaches
//! [`FLUSH_THRESHOLD`] entries or when [`FLUSH_DELAY`] has elapsed since its
//! oldest entry. Flush errors are logged and the batch is discarded —
//! ingestion never blocks.

use std::path::Path;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use rusqlite::{params, Connection};
use tracing::{error, warn};

use harness_core::EventEnvelope;

use crate::store::StoreError;

/// Maximum age of a pending batch before it is flushed.
pub const FLUSH_DELAY: Duration = Duration::from_millis(12);

/// Batch size that forces an immediate flush.
pub const FLUSH_THRESHOLD: usize = 64;

enum Msg {
    Append(Box<EventEnvelope>),
    Flush(mpsc::SyncSender<()>),
    Shutdown,
}

/// Handle to the event store flusher. Cloneable; appends are fire-and-forget.
#[derive(Clone)]
pub struct EventLog {
    tx: mpsc::Sender<Msg>,
}

impl EventLog {
    /// Open the event store at `path` (shared control-plane database) and
    /// start the flusher thread.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        crate::migrations::migrate(&conn)?;

        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("event-flusher".to_string())
            .spawn(move || flusher_loop(conn, rx))?;
        Ok(Self { tx })
    }

    /// Queue one envelope for the next batch. Never blocks; if the flusher
    /// is gone the envelope is dropped with a log line.
    pub fn append(&self, envelope: EventEnvelope) {
        if self.tx.send(Msg::Append(Box::new(envelope))).is_err() {
            warn!("event flusher gone; dropping envelope");
        }
    }

    /// Force the pending batch to disk and wait for the write.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        if self.tx.send(Msg::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv_timeout(Duration::from_secs(5));
        }
    }

    /// Stop the flusher after draining pending envelopes.
    pub fn shutdown(&self) {
        self.flush();
        let _ = self.tx.send(Msg::Shutdown);
    }
}

fn flusher_loop(conn: Connection, rx: mpsc::Receiver<Msg>) {
    let mut batch: Vec<EventEnvelope> = Vec::new();
    let mut oldest: Option<Instant> = None;

    loop {
        let wait = match oldest {
            Some(since) => FLUSH_DELAY.saturating_sub(since.elapsed()),
            None => Duration::from_secs(3600),
        };

        match rx.recv_timeout(wait) {
            Ok(Msg::Append(envelope)) => {
                batch.push(*envelope);
                oldest.get_or_insert_with(Instant::now);
                if batch.len() >= FLUSH_THRESHOLD {
                    flush_batch(&conn, &mut batch);
                    oldest = None;
                }
            }
            Ok(Msg::Flush(ack)) => {
                flush_batch(&conn, &mut batch);
                oldest = None;
                let _ = ack.send(());
            }
            Ok(Msg::Shutdown) => {
                flush_batch(&conn, &mut batch);
                return;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                flush_batch(&conn, &mut batch);
                oldest = None;
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                flush_batch(&conn, &mut batch);
                return;
            }
        }
    }
}

fn flush_batch(conn: &Connection, batch: &mut Vec<EventEnvelope>) {
    if batch.is_empty() {
        return;
    }
    let pending = std::mem::take(batch);
    if let Err(err) = write_batch(conn, &pending) {
        // The batch is gone; ingestion must never back up behind the disk.
        error!(%err, dropped = pending.len(), "event batch flush failed");
    }
}

fn write_batch(conn: &Connection, batch: &[EventEnvelope]) -> Result<(), StoreError> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO events (ts, kind, tenant_id, user_id, workspace_id, worktree_id, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for envelope in batch {
            stmt.execute(params![
                envelope.ts,
                envelope.kind.to_string(),
                envelope.scope.tenant_id,
                envelope.scope.user_id,
                envelope.scope.workspace_id,
                envelope.worktree_id,
                serde_json::to_string(&envelope.payload)?,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Read every persisted envelope in insertion order. Test and tooling helper.
pub fn read_events(path: &Path) -> Result<Vec<EventEnvelope>, StoreError> {
    let conn = Connection::open(path)?;
    crate::migrations::migrate(&conn)?;
    let mut stmt = conn.prepare(
        "SELECT id, ts, kind, tenant_id, user_id, workspace_id, worktree_id, payload
         FROM events ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        let kind_raw: String = row.get("kind")?;
        let payload_raw: String = row.get("payload")?;
        Ok((
            row.get::<_, i64>("id")?,
            row.get::<_, String>("ts")?,
            kind_raw,
            harness_core::Scope {
                tenant_id: row.get("tenant_id")?,
                user_id: row.get("user_id")?,
                workspace_id: row.get("workspace_id")?,
            },
            row.get::<_, Option<String>>("worktree_id")?,
            payload_raw,
        ))
    })?;

    let mut events = Vec::new();
    for row in rows {
        let (id, ts, kind_raw, scope, worktree_id, payload_raw) = row?;
        let kind = serde_json::from_str(&format!("\"{kind_raw}\""))?;
        events.push(EventEnvelope {
            id: Some(id),
            ts,
            kind,
            scope,
            worktree_id,
            payload: serde_json::from_str(&payload_raw)?,
        });
    }
    Ok(events)
}

#[cfg(test)]
#[path = "event_log_tests.rs"]
mod tests;
