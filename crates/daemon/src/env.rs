// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime configuration, resolved once at startup.
//!
//! Flags win over `HARNESS_CONTROL_PLANE_*` environment variables, which win
//! over defaults. The resolved value is passed down by reference; nothing in
//! a hot path reads the environment.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default in-memory tail retained per session for late attachers.
pub const DEFAULT_TAIL_BACKLOG_BYTES: usize = 256 * 1024;

/// Per-connection outbound queue depth before the slow client is dropped.
pub const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// How long an unauthenticated connection may sit before it is closed.
pub const AUTH_DEADLINE: Duration = Duration::from_secs(10);

/// Write timeout for one outbound envelope.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("usage: {0}")]
    Usage(String),

    #[error("invalid port {0:?}: must be 1-65535")]
    InvalidPort(String),

    #[error("non-loopback host {0:?} requires --auth-token")]
    TokenRequired(String),
}

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub host: String,
    pub port: u16,
    pub auth_token: Option<String>,
    pub state_db_path: PathBuf,
    pub workspace_root: PathBuf,
    /// Scope `workspaceId` for every record this gateway writes.
    pub workspace_id: String,
    /// Tail backlog byte budget per session broker.
    pub tail_backlog_bytes: usize,
    /// Embedded mode: a disconnecting client closes the sessions it started.
    pub close_live_sessions_on_client_stop: bool,
}

impl RuntimeConfig {
    /// Parse daemon argv (without the program name) plus environment.
    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut host = env_var("HARNESS_CONTROL_PLANE_HOST");
        let mut port_raw = env_var("HARNESS_CONTROL_PLANE_PORT");
        let mut auth_token = env_var("HARNESS_CONTROL_PLANE_AUTH_TOKEN");
        let mut state_db_path = env_var("HARNESS_CONTROL_PLANE_DB_PATH");
        let mut workspace_root: Option<String> = None;

        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            let value = args.get(i + 1).cloned();
            let take = || -> Result<String, ConfigError> {
                value.ok_or_else(|| ConfigError::Usage(format!("{flag} requires a value")))
            };
            match flag {
                "--host" => host = Some(take()?),
                "--port" => port_raw = Some(take()?),
                "--auth-token" => auth_token = Some(take()?),
                "--state-db-path" => state_db_path = Some(take()?),
                "--workspace-root" => workspace_root = Some(take()?),
                other => {
                    return Err(ConfigError::Usage(format!("unknown flag {other:?}")));
                }
            }
            i += 2;
        }

        let host = host.unwrap_or_else(|| "127.0.0.1".to_string());
        let port = match port_raw {
            Some(raw) => parse_port(&raw)?,
            None => return Err(ConfigError::Usage("--port is required".to_string())),
        };
        let state_db_path = PathBuf::from(
            state_db_path
                .ok_or_else(|| ConfigError::Usage("--state-db-path is required".to_string()))?,
        );
        let workspace_root = workspace_root
            .map(PathBuf::from)
            .or_else(|| env_var("HARNESS_INVOKE_CWD").map(PathBuf::from))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"));

        let auth_token = auth_token.filter(|t| !t.is_empty());
        if !is_loopback(&host) && auth_token.is_none() {
            return Err(ConfigError::TokenRequired(host));
        }

        let workspace_id = harness_core::paths::workspace_dir_name(&workspace_root);
        Ok(Self {
            host,
            port,
            auth_token,
            state_db_path,
            workspace_root,
            workspace_id,
            tail_backlog_bytes: env_var("HARNESS_TAIL_BACKLOG_BYTES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TAIL_BACKLOG_BYTES),
            close_live_sessions_on_client_stop: env_var("HARNESS_EMBEDDED")
                .is_some_and(|v| v == "1" || v == "true"),
        })
    }

    pub fn scope(&self) -> harness_core::Scope {
        harness_core::Scope::local(self.workspace_id.clone())
    }
}

/// Strict port parse: rejects 0, negatives, and anything above 65535.
pub fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    match raw.trim().parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => Ok(port as u16),
        _ => Err(ConfigError::InvalidPort(raw.to_string())),
    }
}

pub fn is_loopback(host: &str) -> bool {
    match host.parse::<std::net::IpAddr>() {
        Ok(addr) => addr.is_loopback(),
        Err(_) => host == "localhost",
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
