// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace runtime path layout.
//!
//! All gateway runtime state for a workspace lives under
//! `<config-root>/workspaces/<sanitized-basename>-<sha256(path)[0..12]>/`.
//! A named session scopes further under `sessions/<name>/`. The record,
//! log, database, and scripts paths all derive from this layout and nothing
//! else; two CLIs invoked in the same workspace always resolve identical
//! paths.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Maximum length of a `--session` name.
pub const SESSION_NAME_MAX: usize = 64;

#[derive(Debug, Error)]
pub enum PathsError {
    #[error("could not determine config directory (HOME unset?)")]
    NoConfigDir,

    #[error("invalid session name {0:?}: must match [A-Za-z0-9][A-Za-z0-9._-]{{0,63}}")]
    InvalidSessionName(String),
}

/// Resolve the harness config root: `$XDG_CONFIG_HOME/harness` or
/// `~/.config/harness`.
pub fn config_root() -> Result<PathBuf, PathsError> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return Ok(PathBuf::from(xdg).join("harness"));
        }
    }
    let home = dirs::home_dir().ok_or(PathsError::NoConfigDir)?;
    Ok(home.join(".config").join("harness"))
}

/// Validate a `--session` name: `^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$`.
pub fn validate_session_name(name: &str) -> Result<(), PathsError> {
    let mut chars = name.chars();
    let valid_first = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let valid_rest =
        chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !valid_first || !valid_rest || name.len() > SESSION_NAME_MAX {
        return Err(PathsError::InvalidSessionName(name.to_string()));
    }
    Ok(())
}

/// Directory-name component for a workspace root:
/// `<sanitized-basename>-<sha256(path)[0..12]>`.
pub fn workspace_dir_name(workspace_root: &Path) -> String {
    let basename = workspace_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());
    let sanitized: String = basename
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '-' })
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(workspace_root.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();

    format!("{}-{}", sanitized, &hex[..12])
}

/// Resolved runtime paths for one workspace (and optional named session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    /// The directory the user invoked harness in.
    pub workspace_root: PathBuf,
    /// `<config>/workspaces/<basename>-<hash12>/`
    pub runtime_root: PathBuf,
    /// Optional named session under `sessions/<name>/`.
    pub session: Option<String>,
}

impl WorkspaceLayout {
    pub fn new(
        config_root: &Path,
        workspace_root: &Path,
        session: Option<&str>,
    ) -> Result<Self, PathsError> {
        if let Some(name) = session {
            validate_session_name(name)?;
        }
        let runtime_root =
            config_root.join("workspaces").join(workspace_dir_name(workspace_root));
        Ok(Self {
            workspace_root: workspace_root.to_path_buf(),
            runtime_root,
            session: session.map(str::to_owned),
        })
    }

    /// Directory holding this gateway's runtime files: the runtime root for
    /// the default gateway, `sessions/<name>/` for a named session.
    pub fn gateway_dir(&self) -> PathBuf {
        match &self.session {
            Some(name) => self.runtime_root.join("sessions").join(name),
            None => self.runtime_root.clone(),
        }
    }

    pub fn gateway_record(&self) -> PathBuf {
        self.gateway_dir().join("gateway.json")
    }

    pub fn gateway_log(&self) -> PathBuf {
        self.gateway_dir().join("gateway.log")
    }

    pub fn state_db(&self) -> PathBuf {
        self.gateway_dir().join("control-plane.sqlite")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.gateway_dir().join("gateway.lock")
    }

    /// Root of all named sessions for this workspace (the `gc` scan root).
    pub fn sessions_dir(&self) -> PathBuf {
        self.runtime_root.join("sessions")
    }

    /// Workspace-scoped hook/notification relay scripts.
    pub fn scripts_dir(&self) -> PathBuf {
        self.runtime_root.join("scripts")
    }

    /// Workspace-scoped helper binary install path.
    pub fn bin_dir(&self) -> PathBuf {
        self.runtime_root.join("bin")
    }

    /// Stable workspace identifier used as the scope `workspaceId`.
    pub fn workspace_id(&self) -> String {
        workspace_dir_name(&self.workspace_root)
    }
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
