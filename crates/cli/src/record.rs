// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The gateway record file.
//!
//! One JSON file per workspace/session records the daemon the CLI believes
//! is alive. Writes are atomic (`<path>.tmp-<pid>-<ts>-<uuid>` + rename) so
//! contending CLIs only ever observe a whole record; staleness is detected
//! by probing, never by trusting the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Schema marker for the record file.
pub const RECORD_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed gateway record at {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("invalid gateway record: {0}")]
    Invalid(String),
}

/// The persisted coordinates of a (believed-)running gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRecord {
    pub version: u32,
    pub pid: u32,
    pub host: String,
    pub port: u16,
    pub auth_token: Option<String>,
    pub state_db_path: PathBuf,
    pub started_at: String,
    pub workspace_root: PathBuf,
}

impl GatewayRecord {
    /// Field constraints serde cannot express: port range, absolute paths,
    /// and the non-loopback ⇒ token rule.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.port == 0 {
            return Err(RecordError::Invalid("port must be 1-65535".to_string()));
        }
        if !self.state_db_path.is_absolute() {
            return Err(RecordError::Invalid(format!(
                "stateDbPath must be absolute: {}",
                self.state_db_path.display()
            )));
        }
        if !self.workspace_root.is_absolute() {
            return Err(RecordError::Invalid(format!(
                "workspaceRoot must be absolute: {}",
                self.workspace_root.display()
            )));
        }
        let loopback = match self.host.parse::<std::net::IpAddr>() {
            Ok(addr) => addr.is_loopback(),
            Err(_) => self.host == "localhost",
        };
        if !loopback && self.auth_token.as_deref().unwrap_or_default().is_empty() {
            return Err(RecordError::Invalid(format!(
                "non-loopback host {:?} requires an auth token",
                self.host
            )));
        }
        Ok(())
    }

    /// Read and validate; `None` when no record exists.
    pub fn read(path: &Path) -> Result<Option<Self>, RecordError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let record: Self = serde_json::from_str(&raw).map_err(|e| RecordError::Malformed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        record.validate()?;
        Ok(Some(record))
    }

    /// Atomic write: temp file in the same directory, then rename.
    pub fn write(&self, path: &Path) -> Result<(), RecordError> {
        self.validate()?;
        let mut body = serde_json::to_vec_pretty(self).map_err(|e| RecordError::Malformed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        body.push(b'\n');
        atomic_write(path, &body)?;
        Ok(())
    }
}

/// Write via `<path>.tmp-<pid>-<ts>-<uuid>` + rename; last writer wins. On
/// failure the temp file is best-effort removed.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_file_name(format!(
        "{}.tmp-{}-{}-{}",
        path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        std::process::id(),
        chrono::Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple(),
    ));
    let result = std::fs::write(&tmp, bytes).and_then(|()| std::fs::rename(&tmp, path));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// Remove the record file if present.
pub fn remove(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
