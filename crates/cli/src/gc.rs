// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session directory garbage collection.
//!
//! `gateway gc` removes named-session subtrees whose gateway record and all
//! artifacts are older than the retention window and whose recorded PID is
//! no longer alive. Live sessions are counted and skipped.

use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::debug;

use harness_core::paths::WorkspaceLayout;

use crate::lock::process_exists;
use crate::record::GatewayRecord;

/// Sessions older than this are eligible for collection.
pub const GC_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Default, PartialEq, Eq)]
pub struct GcSummary {
    pub removed: usize,
    pub skipped_live: usize,
}

/// Sweep the workspace's `sessions/` directory.
pub fn gc_sessions(layout: &WorkspaceLayout, max_age: Duration) -> std::io::Result<GcSummary> {
    let sessions_dir = layout.sessions_dir();
    let mut summary = GcSummary::default();
    let entries = match std::fs::read_dir(&sessions_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(summary),
        Err(err) => return Err(err),
    };
    let now = SystemTime::now();

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        if let Ok(Some(record)) = GatewayRecord::read(&path.join("gateway.json")) {
            if process_exists(record.pid) {
                summary.skipped_live += 1;
                continue;
            }
        }

        match newest_mtime(&path) {
            Some(newest) => {
                let age = now.duration_since(newest).unwrap_or_default();
                if age < max_age {
                    continue;
                }
            }
            // Unreadable subtree: leave it alone.
            None => continue,
        }

        debug!(path = %path.display(), "removing dead session subtree");
        std::fs::remove_dir_all(&path)?;
        summary.removed += 1;
    }
    Ok(summary)
}

/// Newest mtime across the subtree ("all artifacts" must be old).
fn newest_mtime(root: &Path) -> Option<SystemTime> {
    let mut newest = std::fs::metadata(root).ok()?.modified().ok()?;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = std::fs::read_dir(&dir).ok()?;
        for entry in entries.flatten() {
            let meta = entry.metadata().ok()?;
            if let Ok(mtime) = meta.modified() {
                if mtime > newest {
                    newest = mtime;
                }
            }
            if meta.is_dir() {
                stack.push(entry.path());
            }
        }
    }
    Some(newest)
}

#[cfg(test)]
#[path = "gc_tests.rs"]
mod tests;
