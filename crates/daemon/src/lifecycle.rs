// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway lifecycle: startup, shutdown, recovery.

use std::fs::File;
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{info, warn};

use harness_core::Scope;
use harness_storage::{EventLog, StateStore, StoreError};

use crate::env::RuntimeConfig;
use crate::hub::ObservedHub;
use crate::session::{SessionDeps, SessionManager, SessionMsg};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to acquire database lock: another gateway running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind {host}:{port}: {source}")]
    BindFailed { host: String, port: u16, source: std::io::Error },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The running gateway: shared collaborators for the listener and sessions.
pub struct Gateway {
    pub config: RuntimeConfig,
    pub scope: Scope,
    pub store: Arc<Mutex<StateStore>>,
    pub events: EventLog,
    pub hub: Arc<ObservedHub>,
    pub sessions: Arc<SessionManager>,
    pub start_time: Instant,
    pub shutdown: Arc<Notify>,
    // NOTE(lifetime): held to keep the exclusive db sidecar lock; released on drop
    #[allow(dead_code)]
    db_lock: File,
}

/// Startup output: the gateway plus its bound TCP listener.
pub struct StartupResult {
    pub gateway: Arc<Gateway>,
    pub listener: TcpListener,
}

impl std::fmt::Debug for StartupResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StartupResult").finish()
    }
}

/// Bind the listener, lock and open the database, and assemble the gateway.
///
/// The sidecar lock is taken before anything else so two daemons pointed at
/// one workspace database fail fast instead of interleaving writes.
pub async fn startup(config: RuntimeConfig) -> Result<StartupResult, LifecycleError> {
    if let Some(parent) = config.state_db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let lock_path = config.state_db_path.with_extension("sqlite.lock");
    let db_lock = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)?;
    db_lock.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;

    let listener =
        TcpListener::bind((config.host.as_str(), config.port)).await.map_err(|source| {
            LifecycleError::BindFailed { host: config.host.clone(), port: config.port, source }
        })?;

    let store = StateStore::open(&config.state_db_path)?;
    let events = EventLog::open(&config.state_db_path)?;
    let scope = config.scope();

    info!(
        host = %config.host,
        port = config.port,
        db = %config.state_db_path.display(),
        workspace = %config.workspace_id,
        "gateway listening"
    );

    let gateway = Arc::new(Gateway {
        scope,
        store: Arc::new(Mutex::new(store)),
        events,
        hub: Arc::new(ObservedHub::new()),
        sessions: Arc::new(SessionManager::new()),
        start_time: Instant::now(),
        shutdown: Arc::new(Notify::new()),
        db_lock,
        config,
    });
    Ok(StartupResult { gateway, listener })
}

impl Gateway {
    pub fn session_deps(&self) -> SessionDeps {
        SessionDeps {
            store: Arc::clone(&self.store),
            events: self.events.clone(),
            hub: Arc::clone(&self.hub),
            tail_budget: self.config.tail_backlog_bytes,
            desktop_notify: crate::notify::desktop_notify_enabled(),
        }
    }

    /// Graceful teardown: close live sessions, then drain the event log.
    pub async fn shutdown_now(&self) {
        let handles = self.sessions.live_handles();
        if !handles.is_empty() {
            info!(count = handles.len(), "closing live sessions");
        }
        for handle in handles {
            let (tx, rx) = tokio::sync::oneshot::channel();
            if handle.send(SessionMsg::Close { reply: tx }).await {
                let _ = tokio::time::timeout(std::time::Duration::from_secs(2), rx).await;
            }
        }
        self.events.shutdown();
        info!("gateway shutdown complete");
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        let lock_path = self.config.state_db_path.with_extension("sqlite.lock");
        if let Err(err) = std::fs::remove_file(&lock_path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(%err, "failed to remove db lock sidecar");
            }
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
