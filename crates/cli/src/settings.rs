// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Settings resolution: flags over `HARNESS_*` environment over defaults,
//! resolved once per invocation and passed down by reference.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use harness_core::paths::{config_root, PathsError, WorkspaceLayout};

/// Default window the CLI waits for a spawned gateway to become ready.
pub const DEFAULT_CONNECT_RETRY_WINDOW: Duration = Duration::from_secs(6);

/// Default tick between readiness probes.
pub const DEFAULT_CONNECT_RETRY_DELAY: Duration = Duration::from_millis(40);

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Paths(#[from] PathsError),

    #[error("could not determine the invocation directory: {0}")]
    NoCwd(std::io::Error),

    #[error("invalid port {0:?}: must be 1-65535")]
    InvalidPort(String),
}

/// Gateway-facing flags shared by `start`, `run`, and `restart`.
#[derive(Debug, Clone, Default)]
pub struct GatewayFlags {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub auth_token: Option<String>,
    pub state_db_path: Option<PathBuf>,
}

/// Fully resolved CLI settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub layout: WorkspaceLayout,
    pub host: String,
    /// Explicit port, if any; otherwise start picks an ephemeral one.
    pub port: Option<u16>,
    pub auth_token: Option<String>,
    pub state_db_path: PathBuf,
    pub connect_retry_window: Duration,
    pub connect_retry_delay: Duration,
}

impl Settings {
    /// Resolve from flags + environment for the workspace the user invoked
    /// harness in (`HARNESS_INVOKE_CWD` overrides the process cwd).
    pub fn resolve(
        session: Option<&str>,
        flags: &GatewayFlags,
    ) -> Result<Self, SettingsError> {
        let workspace_root = match env_var("HARNESS_INVOKE_CWD") {
            Some(cwd) => PathBuf::from(cwd),
            None => std::env::current_dir().map_err(SettingsError::NoCwd)?,
        };
        let session = session
            .map(str::to_owned)
            .or_else(|| env_var("HARNESS_SESSION_NAME"));
        let layout =
            WorkspaceLayout::new(&config_root()?, &workspace_root, session.as_deref())?;

        let host = flags
            .host
            .clone()
            .or_else(|| env_var("HARNESS_CONTROL_PLANE_HOST"))
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let port = match &flags.port {
            Some(port) => Some(*port),
            None => match env_var("HARNESS_CONTROL_PLANE_PORT") {
                Some(raw) => Some(parse_port(&raw)?),
                None => None,
            },
        };
        let auth_token = flags
            .auth_token
            .clone()
            .or_else(|| env_var("HARNESS_CONTROL_PLANE_AUTH_TOKEN"))
            .filter(|t| !t.is_empty());
        let state_db_path = flags
            .state_db_path
            .clone()
            .or_else(|| env_var("HARNESS_CONTROL_PLANE_DB_PATH").map(PathBuf::from))
            .unwrap_or_else(|| layout.state_db());

        Ok(Self {
            layout,
            host,
            port,
            auth_token,
            state_db_path,
            connect_retry_window: env_duration_ms(
                "HARNESS_CONTROL_PLANE_CONNECT_RETRY_WINDOW_MS",
            )
            .unwrap_or(DEFAULT_CONNECT_RETRY_WINDOW),
            connect_retry_delay: env_duration_ms("HARNESS_CONTROL_PLANE_CONNECT_RETRY_DELAY_MS")
                .unwrap_or(DEFAULT_CONNECT_RETRY_DELAY),
        })
    }
}

fn parse_port(raw: &str) -> Result<u16, SettingsError> {
    match raw.trim().parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => Ok(port as u16),
        _ => Err(SettingsError::InvalidPort(raw.to_string())),
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_duration_ms(name: &str) -> Option<Duration> {
    env_var(name).and_then(|raw| raw.parse::<u64>().ok()).map(Duration::from_millis)
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
