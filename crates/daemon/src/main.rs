// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! harnessd - the gateway daemon.
//!
//! Spawned detached by `harness gateway start` (stdio redirected to
//! `gateway.log`) or run in the foreground by `harness gateway run`.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use harness_daemon::{lifecycle, listener, RuntimeConfig};

fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    let filter = EnvFilter::try_from_env("HARNESS_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    // Non-blocking writer: a wedged log sink must not stall session actors.
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    guard
}

fn main() -> std::process::ExitCode {
    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match RuntimeConfig::from_args(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("harnessd: {err}");
            return std::process::ExitCode::from(2);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("harnessd: failed to start runtime: {err}");
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(config)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "gateway failed");
            eprintln!("harnessd: {err}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn serve(config: RuntimeConfig) -> Result<(), lifecycle::LifecycleError> {
    let started = lifecycle::startup(config).await?;
    let gateway = Arc::clone(&started.gateway);
    let listener_task = tokio::spawn(listener::run(started.listener, Arc::clone(&gateway)));

    wait_for_shutdown(&gateway).await;

    gateway.shutdown.notify_waiters();
    gateway.shutdown_now().await;
    listener_task.abort();
    Ok(())
}

async fn wait_for_shutdown(gateway: &Arc<lifecycle::Gateway>) {
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
    {
        Ok(signal) => signal,
        Err(err) => {
            error!(%err, "failed to install SIGTERM handler");
            gateway.shutdown.notified().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                error!(%err, "ctrl-c handler failed");
            } else {
                info!("interrupt received");
            }
        }
        _ = gateway.shutdown.notified() => info!("shutdown requested"),
    }
}
