// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session broker: the fan-out layer over one PTY.
//!
//! The broker owns a monotonic byte cursor and a bounded tail backlog.
//! Every chunk advances the cursor by the chunk's full logical size; the
//! backlog retains at most `budget` bytes for late attachers. An oversized
//! single chunk is truncated to its last `budget` bytes first, then older
//! chunks are evicted until the total fits.
//!
//! Replay of `sinceCursor` returns the retained suffix; a cursor older than
//! the retention window replays from the oldest resident chunk instead (the
//! client knows this history is lossy).

use std::collections::VecDeque;

/// One retained chunk. `cursor` is the broker cursor *after* the chunk's
/// full logical write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerChunk {
    pub cursor: u64,
    pub bytes: Vec<u8>,
}

/// Bounded retention of recent PTY output.
#[derive(Debug)]
pub struct TailBacklog {
    budget: usize,
    cursor: u64,
    chunks: VecDeque<BrokerChunk>,
    retained: usize,
}

impl TailBacklog {
    pub fn new(budget: usize) -> Self {
        Self { budget, cursor: 0, chunks: VecDeque::new(), retained: 0 }
    }

    /// Current byte cursor (total logical bytes ever written).
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Total bytes currently retained.
    pub fn retained_bytes(&self) -> usize {
        self.retained
    }

    /// Record one chunk. Returns the chunk as it should be fanned out to
    /// live subscribers (full bytes, cursor after the write).
    pub fn push(&mut self, bytes: &[u8]) -> BrokerChunk {
        self.cursor += bytes.len() as u64;
        let out = BrokerChunk { cursor: self.cursor, bytes: bytes.to_vec() };

        if self.budget == 0 {
            return out;
        }

        // Truncate an oversized chunk to its last-budget bytes, keeping the
        // cursor of the full logical write.
        let stored = if bytes.len() > self.budget {
            bytes[bytes.len() - self.budget..].to_vec()
        } else {
            bytes.to_vec()
        };
        self.retained += stored.len();
        self.chunks.push_back(BrokerChunk { cursor: self.cursor, bytes: stored });

        // Then evict oldest whole chunks until the total fits.
        while self.retained > self.budget {
            match self.chunks.pop_front() {
                Some(old) => self.retained -= old.bytes.len(),
                None => break,
            }
        }
        out
    }

    /// Replay the retained suffix after `since_cursor`.
    ///
    /// A `since_cursor` older than the retention window yields everything
    /// still resident, starting at the oldest retained cursor.
    pub fn replay(&self, since_cursor: u64) -> Vec<BrokerChunk> {
        self.chunks.iter().filter(|chunk| chunk.cursor > since_cursor).cloned().collect()
    }

    /// The retained tail as one contiguous byte run (for `session.snapshot`).
    pub fn snapshot(&self) -> (u64, Vec<u8>) {
        let mut bytes = Vec::with_capacity(self.retained);
        for chunk in &self.chunks {
            bytes.extend_from_slice(&chunk.bytes);
        }
        (self.cursor, bytes)
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
