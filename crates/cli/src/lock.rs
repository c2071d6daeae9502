// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-workspace gateway control lock.
//!
//! A JSON lock file serializes gateway control operations across CLIs in
//! one workspace. Acquisition retries within a bounded window; a lock whose
//! owner PID is gone, or whose live PID has a different start time (PID
//! reuse), is stale and gets broken. Reentry by the same process is detected
//! via a per-process token persisted in the file, so nested subcommand code
//! paths in one invocation never deadlock.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Schema marker for the lock file.
pub const LOCK_VERSION: u32 = 1;

/// Default acquisition window.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

const RETRY_DELAY: Duration = Duration::from_millis(25);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out acquiring gateway lock at {0} (held by pid {1:?})")]
    Timeout(PathBuf, Option<u32>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockOwner {
    pub pid: u32,
    /// Kernel start time of the owning process (clock ticks); PID-reuse guard.
    pub started_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub version: u32,
    pub owner: LockOwner,
    pub acquired_at: String,
    pub workspace_root: PathBuf,
    pub token: String,
}

/// Held workspace lock; released on drop (all exit paths).
#[derive(Debug)]
pub struct ControlLock {
    path: PathBuf,
    /// Reentrant acquisitions do not own the file and must not delete it.
    owns_file: bool,
}

impl ControlLock {
    /// Acquire the lock with bounded retry.
    pub fn acquire(
        path: &Path,
        workspace_root: &Path,
        timeout: Duration,
    ) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let deadline = Instant::now() + timeout;
        let mut holder_pid = None;

        loop {
            match try_create(path, workspace_root) {
                Ok(()) => return Ok(Self { path: path.to_path_buf(), owns_file: true }),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    match read_lock(path) {
                        Some(record) if is_self(&record) => {
                            debug!(path = %path.display(), "reentrant lock acquisition");
                            return Ok(Self { path: path.to_path_buf(), owns_file: false });
                        }
                        Some(record) if is_stale(&record.owner) => {
                            debug!(pid = record.owner.pid, "breaking stale gateway lock");
                            let _ = std::fs::remove_file(path);
                        }
                        Some(record) => holder_pid = Some(record.owner.pid),
                        // Unreadable lock: another CLI is mid-write; retry.
                        None => {}
                    }
                }
                Err(err) => return Err(err.into()),
            }

            if Instant::now() >= deadline {
                return Err(LockError::Timeout(path.to_path_buf(), holder_pid));
            }
            std::thread::sleep(RETRY_DELAY);
        }
    }

    /// Run `f` under the lock; releases on every exit path.
    pub fn with_lock<T>(
        path: &Path,
        workspace_root: &Path,
        timeout: Duration,
        f: impl FnOnce() -> T,
    ) -> Result<T, LockError> {
        let guard = Self::acquire(path, workspace_root, timeout)?;
        let result = f();
        drop(guard);
        Ok(result)
    }
}

impl Drop for ControlLock {
    fn drop(&mut self) {
        if self.owns_file {
            // Only remove a file we still own.
            if read_lock(&self.path).is_some_and(|record| is_self(&record)) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }
}

fn try_create(path: &Path, workspace_root: &Path) -> std::io::Result<()> {
    let record = LockRecord {
        version: LOCK_VERSION,
        owner: LockOwner {
            pid: std::process::id(),
            started_at: process_start_time(std::process::id()),
        },
        acquired_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        workspace_root: workspace_root.to_path_buf(),
        token: process_token().to_string(),
    };
    let body = serde_json::to_vec_pretty(&record)
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    // create_new gives exclusive creation; the atomic_write pattern is not
    // usable here because rename would clobber a concurrent owner.
    let tmp = path.with_extension(format!("acquiring-{}", std::process::id()));
    std::fs::write(&tmp, &body)?;
    let result = std::fs::hard_link(&tmp, path);
    let _ = std::fs::remove_file(&tmp);
    result
}

fn read_lock(path: &Path) -> Option<LockRecord> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

fn is_self(record: &LockRecord) -> bool {
    record.owner.pid == std::process::id() && record.token == process_token()
}

/// Dead if the PID is gone, or alive with a different kernel start time.
fn is_stale(owner: &LockOwner) -> bool {
    if !process_exists(owner.pid) {
        return true;
    }
    match (owner.started_at, process_start_time(owner.pid)) {
        (Some(recorded), Some(current)) => recorded != current,
        _ => false,
    }
}

/// Per-process identity persisted into the lock file.
pub fn process_token() -> &'static str {
    static TOKEN: OnceLock<String> = OnceLock::new();
    TOKEN.get_or_init(|| uuid::Uuid::new_v4().simple().to_string())
}

/// Kernel start time from `/proc/<pid>/stat` field 22 (linux); `None` where
/// unavailable, degrading the staleness check to PID liveness only.
pub fn process_start_time(pid: u32) -> Option<u64> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // comm may contain spaces; fields count from after the closing paren.
    let after_comm = stat.rsplit_once(')')?.1;
    after_comm.split_whitespace().nth(19).and_then(|field| field.parse().ok())
}

pub fn process_exists(pid: u32) -> bool {
    match nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        // EPERM still proves the PID is alive.
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
