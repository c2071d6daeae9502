// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway process management.
//!
//! Spawning the detached daemon, proving it is ready, and tearing processes
//! down with escalation. "Ready" means exactly one thing: the TCP listener
//! accepts and answers `session.list` with a valid envelope inside the
//! retry window.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use thiserror::Error;
use tracing::debug;

use crate::client::StreamClient;
use crate::lock::process_exists;
use crate::settings::Settings;

/// Name of the daemon binary.
pub const DAEMON_BIN: &str = "harnessd";

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("failed to spawn {0}: {1}")]
    Spawn(PathBuf, std::io::Error),

    #[error("gateway exited during startup: {0}")]
    EarlyExit(String),

    #[error("gateway did not become ready within {0:?}")]
    ReadinessTimeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Locate `harnessd`: explicit override, sibling of this binary, then PATH.
pub fn find_daemon_binary() -> PathBuf {
    if let Ok(path) = std::env::var("HARNESS_DAEMON_BIN") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join(DAEMON_BIN);
            if sibling.exists() {
                return sibling;
            }
        }
    }
    PathBuf::from(DAEMON_BIN)
}

/// Ask the OS for a free port by binding and dropping an ephemeral listener.
pub fn pick_ephemeral_port(host: &str) -> std::io::Result<u16> {
    let listener = std::net::TcpListener::bind((host, 0))?;
    Ok(listener.local_addr()?.port())
}

fn daemon_command(settings: &Settings, port: u16) -> Command {
    let mut cmd = Command::new(find_daemon_binary());
    cmd.arg("--host")
        .arg(&settings.host)
        .arg("--port")
        .arg(port.to_string())
        .arg("--state-db-path")
        .arg(&settings.state_db_path)
        .arg("--workspace-root")
        .arg(&settings.layout.workspace_root);
    if let Some(token) = &settings.auth_token {
        cmd.arg("--auth-token").arg(token);
    }
    cmd
}

/// Spawn the daemon detached: fresh process group, stdio appended to the
/// gateway log. The group id (== child pid) is what `stop` signals.
pub fn spawn_detached(
    settings: &Settings,
    port: u16,
    log_path: &Path,
) -> Result<std::process::Child, SpawnError> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log = std::fs::OpenOptions::new().create(true).append(true).open(log_path)?;
    let log_err = log.try_clone()?;

    let mut cmd = daemon_command(settings, port);
    cmd.stdin(Stdio::null()).stdout(Stdio::from(log)).stderr(Stdio::from(log_err));
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd.spawn().map_err(|e| SpawnError::Spawn(find_daemon_binary(), e))
}

/// Spawn the daemon in the foreground, inheriting stdio (`gateway run`).
pub fn spawn_foreground(settings: &Settings, port: u16) -> Result<std::process::Child, SpawnError> {
    let mut cmd = daemon_command(settings, port);
    cmd.spawn().map_err(|e| SpawnError::Spawn(find_daemon_binary(), e))
}

/// One readiness probe: connect and issue `session.list` with `limit=1`.
pub async fn probe_once(settings: &Settings, port: u16) -> bool {
    let client =
        match StreamClient::connect(&settings.host, port, settings.auth_token.as_deref()).await {
            Ok(client) => client,
            Err(_) => return false,
        };
    client
        .command(
            harness_wire::Command::SessionList { limit: Some(1) },
            Duration::from_secs(2),
        )
        .await
        .is_ok()
}

/// Block until the daemon answers, watching `child` for early exit.
pub async fn wait_until_ready(
    settings: &Settings,
    port: u16,
    child: &mut std::process::Child,
    log_path: &Path,
) -> Result<(), SpawnError> {
    let deadline = Instant::now() + settings.connect_retry_window;
    loop {
        if let Ok(Some(status)) = child.try_wait() {
            let detail = read_log_tail(log_path, 5)
                .map(|tail| format!("{status}; log tail:\n{tail}"))
                .unwrap_or_else(|| status.to_string());
            return Err(SpawnError::EarlyExit(detail));
        }
        if probe_once(settings, port).await {
            return Ok(());
        }
        if Instant::now() >= deadline {
            // Kill the half-started child before reporting.
            let _ = kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM);
            return Err(SpawnError::ReadinessTimeout(settings.connect_retry_window));
        }
        tokio::time::sleep(settings.connect_retry_delay).await;
    }
}

/// Last `lines` lines of the gateway log, if any.
pub fn read_log_tail(path: &Path, lines: usize) -> Option<String> {
    let file = std::fs::File::open(path).ok()?;
    let all: Vec<String> = BufReader::new(file).lines().map_while(Result::ok).collect();
    if all.is_empty() {
        return None;
    }
    let start = all.len().saturating_sub(lines);
    Some(all[start..].join("\n"))
}

/// Poll until the PID is gone or the timeout elapses.
pub async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if !process_exists(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    !process_exists(pid)
}

/// Outcome of one terminate attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    Terminated,
    Failed,
}

/// SIGTERM (optionally to the process group too), poll, escalate to SIGKILL
/// iff `force`. `ESRCH` counts as already exited.
pub async fn terminate_process(
    pid: u32,
    signal_group: bool,
    force: bool,
    timeout: Duration,
) -> TerminateOutcome {
    let send = |signal: Signal| {
        if signal_group {
            // The detached daemon leads its own group; negative pid hits it all.
            let _ = kill(Pid::from_raw(-(pid as i32)), signal);
        }
        match kill(Pid::from_raw(pid as i32), signal) {
            Ok(()) => true,
            Err(nix::errno::Errno::ESRCH) => false,
            Err(err) => {
                debug!(pid, %err, "signal delivery failed");
                true
            }
        }
    };

    if !send(Signal::SIGTERM) {
        return TerminateOutcome::Terminated;
    }
    if wait_for_exit(pid, timeout).await {
        return TerminateOutcome::Terminated;
    }
    if !force {
        return TerminateOutcome::Failed;
    }
    send(Signal::SIGKILL);
    if wait_for_exit(pid, timeout).await {
        TerminateOutcome::Terminated
    } else {
        TerminateOutcome::Failed
    }
}

#[cfg(test)]
#[path = "daemon_process_tests.rs"]
mod tests;
