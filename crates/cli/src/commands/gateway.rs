// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `harness gateway` - gateway lifecycle commands.
//!
//! Every mutation runs under the workspace control lock. The record file is
//! only ever trusted after a live probe; a record pointing at a dead PID is
//! stale and silently replaced, a record pointing at a live-but-unreachable
//! PID is an error that demands `stop --force`.

use std::time::Duration;

use chrono::{SecondsFormat, Utc};

use harness_wire::Command as StreamCommand;

use crate::client::StreamClient;
use crate::daemon_process::{
    pick_ephemeral_port, probe_once, read_log_tail, spawn_detached, spawn_foreground,
    terminate_process, wait_until_ready, TerminateOutcome,
};
use crate::exit_error::ExitError;
use crate::gc::{gc_sessions, GC_MAX_AGE};
use crate::lock::{process_exists, ControlLock, DEFAULT_ACQUIRE_TIMEOUT};
use crate::orphans::{cleanup_orphans, OrphanContext};
use crate::record::{self, GatewayRecord, RECORD_VERSION};
use crate::settings::Settings;

const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

fn lock(settings: &Settings) -> Result<ControlLock, ExitError> {
    ControlLock::acquire(
        &settings.layout.lock_file(),
        &settings.layout.workspace_root,
        DEFAULT_ACQUIRE_TIMEOUT,
    )
    .map_err(|e| ExitError::failure(e.to_string()))
}

fn orphan_context(settings: &Settings) -> OrphanContext {
    OrphanContext {
        db_path: settings.state_db_path.clone(),
        bin_dir: settings.layout.bin_dir(),
        scripts_dir: settings.layout.scripts_dir(),
    }
}

/// Probe the recorded daemon; true iff it answers `session.list`.
async fn record_reachable(settings: &Settings, record: &GatewayRecord) -> bool {
    let probe_settings = Settings {
        host: record.host.clone(),
        auth_token: record.auth_token.clone(),
        ..settings.clone()
    };
    probe_once(&probe_settings, record.port).await
}

/// `gateway start`: idempotent when healthy, spawn + probe + record when not.
pub async fn start(settings: &Settings) -> Result<(), ExitError> {
    let guard = lock(settings)?;
    let record_path = settings.layout.gateway_record();

    match GatewayRecord::read(&record_path) {
        Ok(Some(record)) => {
            if record_reachable(settings, &record).await {
                println!(
                    "gateway already running (pid {}, port {})",
                    record.pid, record.port
                );
                return Ok(());
            }
            if process_exists(record.pid) {
                return Err(ExitError::failure(format!(
                    "gateway pid {} is alive but unreachable on port {}; \
                     run 'harness gateway stop --force' first",
                    record.pid, record.port
                )));
            }
            // Dead daemon: remove the stale record and start fresh.
            record::remove(&record_path).map_err(|e| ExitError::failure(e.to_string()))?;
        }
        Ok(None) => {}
        Err(err) => {
            // A corrupt record never blocks startup; replace it.
            eprintln!("warning: {err}; replacing the record");
            record::remove(&record_path).map_err(|e| ExitError::failure(e.to_string()))?;
        }
    }

    let port = match settings.port {
        Some(port) => port,
        None => pick_ephemeral_port(&settings.host)
            .map_err(|e| ExitError::failure(format!("no free port: {e}")))?,
    };
    let log_path = settings.layout.gateway_log();
    let mut child = spawn_detached(settings, port, &log_path)
        .map_err(|e| ExitError::failure(e.to_string()))?;

    if let Err(err) = wait_until_ready(settings, port, &mut child, &log_path).await {
        return Err(ExitError::failure(err.to_string()));
    }

    let record = GatewayRecord {
        version: RECORD_VERSION,
        pid: child.id(),
        host: settings.host.clone(),
        port,
        auth_token: settings.auth_token.clone(),
        state_db_path: settings.state_db_path.clone(),
        started_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        workspace_root: settings.layout.workspace_root.clone(),
    };
    record.write(&record_path).map_err(|e| ExitError::failure(e.to_string()))?;

    println!("gateway started (pid {}, port {port})", child.id());
    drop(guard);
    Ok(())
}

/// `gateway run`: start in the foreground, record while alive.
pub async fn run(settings: &Settings) -> Result<(), ExitError> {
    let record_path = settings.layout.gateway_record();
    let port = {
        let _guard = lock(settings)?;
        if let Ok(Some(record)) = GatewayRecord::read(&record_path) {
            if record_reachable(settings, &record).await {
                return Err(ExitError::failure(format!(
                    "gateway already running (pid {}, port {})",
                    record.pid, record.port
                )));
            }
            record::remove(&record_path).map_err(|e| ExitError::failure(e.to_string()))?;
        }
        match settings.port {
            Some(port) => port,
            None => pick_ephemeral_port(&settings.host)
                .map_err(|e| ExitError::failure(format!("no free port: {e}")))?,
        }
    };

    let mut child =
        spawn_foreground(settings, port).map_err(|e| ExitError::failure(e.to_string()))?;
    let pid = child.id();

    let log_path = settings.layout.gateway_log();
    if let Err(err) = wait_until_ready(settings, port, &mut child, &log_path).await {
        return Err(ExitError::failure(err.to_string()));
    }
    let record = GatewayRecord {
        version: RECORD_VERSION,
        pid,
        host: settings.host.clone(),
        port,
        auth_token: settings.auth_token.clone(),
        state_db_path: settings.state_db_path.clone(),
        started_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        workspace_root: settings.layout.workspace_root.clone(),
    };
    record.write(&record_path).map_err(|e| ExitError::failure(e.to_string()))?;
    println!("gateway running (pid {pid}, port {port}); ctrl-c to stop");

    let status = tokio::task::spawn_blocking(move || child.wait())
        .await
        .map_err(|e| ExitError::failure(e.to_string()))?
        .map_err(|e| ExitError::failure(e.to_string()))?;

    // Remove the record only if it still points at this daemon.
    if let Ok(Some(current)) = GatewayRecord::read(&record_path) {
        if current.pid == pid {
            let _ = record::remove(&record_path);
        }
    }
    if !status.success() {
        return Err(ExitError::failure(format!("gateway exited with {status}")));
    }
    Ok(())
}

/// `gateway stop`.
pub async fn stop(
    settings: &Settings,
    force: bool,
    timeout_ms: Option<u64>,
    cleanup: bool,
) -> Result<(), ExitError> {
    let guard = lock(settings)?;
    let record_path = settings.layout.gateway_record();
    let timeout = timeout_ms.map(Duration::from_millis).unwrap_or(DEFAULT_STOP_TIMEOUT);

    match GatewayRecord::read(&record_path) {
        Ok(Some(record)) => {
            let reachable = record_reachable(settings, &record).await;
            let alive = process_exists(record.pid);
            if !reachable && alive && !force {
                return Err(ExitError::failure(format!(
                    "gateway pid {} is alive but unreachable; re-run with --force",
                    record.pid
                )));
            }
            if alive {
                let outcome = terminate_process(record.pid, true, force, timeout).await;
                if outcome == TerminateOutcome::Failed {
                    return Err(ExitError::failure(format!(
                        "gateway pid {} did not exit within {timeout:?}{}",
                        record.pid,
                        if force { "" } else { "; re-run with --force" },
                    )));
                }
            }
            record::remove(&record_path).map_err(|e| ExitError::failure(e.to_string()))?;
            println!("gateway stopped");
        }
        Ok(None) => println!("gateway not running"),
        Err(err) => {
            eprintln!("warning: {err}; removing the record");
            let _ = record::remove(&record_path);
        }
    }

    if cleanup {
        for summary in cleanup_orphans(&orphan_context(settings), force, timeout).await {
            println!("{}", summary.line());
        }
    }
    drop(guard);
    Ok(())
}

/// `gateway restart`: forced stop + start, reusing the recorded port when no
/// explicit one was given (no intervening gap on the port, best effort).
pub async fn restart(settings: &Settings) -> Result<(), ExitError> {
    let previous_port = GatewayRecord::read(&settings.layout.gateway_record())
        .ok()
        .flatten()
        .map(|record| record.port);

    stop(settings, true, None, false).await?;

    let mut restart_settings = settings.clone();
    if restart_settings.port.is_none() {
        restart_settings.port = previous_port;
    }
    start(&restart_settings).await
}

/// `gateway status`.
pub async fn status(settings: &Settings) -> Result<(), ExitError> {
    let record_path = settings.layout.gateway_record();
    let record = match GatewayRecord::read(&record_path) {
        Ok(Some(record)) => record,
        Ok(None) => {
            println!("gateway not running");
            return Ok(());
        }
        Err(err) => {
            println!("gateway record unreadable: {err}");
            return Ok(());
        }
    };

    let alive = process_exists(record.pid);
    let client =
        StreamClient::connect(&record.host, record.port, record.auth_token.as_deref()).await;
    match client {
        Ok(client) => {
            let result = client
                .command(StreamCommand::SessionList { limit: None }, Duration::from_secs(5))
                .await;
            match result {
                Ok(value) => {
                    let sessions = value["sessions"].as_array().cloned().unwrap_or_default();
                    let live = sessions
                        .iter()
                        .filter(|s| s["live"].as_bool().unwrap_or(false))
                        .count();
                    println!("status: running");
                    println!("pid: {} ({})", record.pid, if alive { "alive" } else { "dead" });
                    println!("endpoint: {}:{}", record.host, record.port);
                    println!("sessions: {} ({} live)", sessions.len(), live);
                }
                Err(err) => {
                    println!("status: unreachable ({err})");
                    println!("pid: {} ({})", record.pid, if alive { "alive" } else { "dead" });
                }
            }
        }
        Err(_) => {
            println!("status: unreachable");
            println!("pid: {} ({})", record.pid, if alive { "alive" } else { "dead" });
            println!("endpoint: {}:{}", record.host, record.port);
        }
    }
    Ok(())
}

/// `gateway gc`.
pub fn gc(settings: &Settings) -> Result<(), ExitError> {
    let summary = gc_sessions(&settings.layout, GC_MAX_AGE)
        .map_err(|e| ExitError::failure(e.to_string()))?;
    println!(
        "gc: removed {} session dir(s), skipped {} live",
        summary.removed, summary.skipped_live
    );
    Ok(())
}

/// `gateway call --json '<command>'`: one-shot RPC against the running
/// gateway; prints the JSON result.
pub async fn call(settings: &Settings, json: &str) -> Result<(), ExitError> {
    let command: StreamCommand = serde_json::from_str(json)
        .map_err(|e| ExitError::usage(format!("invalid command JSON: {e}")))?;

    let record = GatewayRecord::read(&settings.layout.gateway_record())
        .map_err(|e| ExitError::failure(e.to_string()))?
        .ok_or_else(|| ExitError::failure("gateway not running"))?;

    let client =
        StreamClient::connect(&record.host, record.port, record.auth_token.as_deref())
            .await
            .map_err(|e| ExitError::failure(e.to_string()))?;
    let result = client
        .command(command, Duration::from_secs(30))
        .await
        .map_err(|e| ExitError::failure(e.to_string()))?;
    println!("{result}");
    Ok(())
}

/// `gateway logs -n N`.
pub fn logs(settings: &Settings, limit: usize) -> Result<(), ExitError> {
    let path = settings.layout.gateway_log();
    match read_log_tail(&path, limit) {
        Some(tail) => println!("{tail}"),
        None => println!("no log file at {}", path.display()),
    }
    Ok(())
}
