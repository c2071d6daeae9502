// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane operation queue.
//!
//! Two FIFOs, interactive and background, drained by one run loop:
//! interactive always drains first, priority orders entries within a lane,
//! and keyed supersession lets a rapid burst of identical intents (e.g.
//! holding an activate shortcut) collapse to the newest one. Exactly one op
//! runs at a time, which is what makes supersession and the per-key
//! exclusivity guarantee trivial to uphold.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Which FIFO an op joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Interactive,
    Background,
}

/// Supersession policy for keyed ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Supersede {
    /// Remove queued ops with the same key.
    Pending,
    /// Remove queued ops with the same key and abort a running one.
    PendingAndRunning,
}

/// Queue gauge snapshot, emitted on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueMetrics {
    pub interactive_queued: usize,
    pub background_queued: usize,
    pub running: usize,
}

/// Lifecycle notifications with wait time attached.
#[derive(Debug, Clone)]
pub enum OpEvent {
    Started { id: u64, label: String, wait: Duration },
    Completed { id: u64, label: String },
    Aborted { id: u64, label: String },
    Failed { id: u64, label: String, error: String },
}

/// An op's future: receives its abort token, returns unit or an error string.
pub type OpFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;
pub type OpTask = Box<dyn FnOnce(CancellationToken) -> OpFuture + Send>;

/// Enqueue parameters.
pub struct OpSpec {
    pub label: String,
    pub lane: Lane,
    pub priority: i32,
    pub key: Option<String>,
    pub supersede: Option<Supersede>,
    /// Caller-provided cancellation; linked into the op's abort token.
    pub abort: Option<CancellationToken>,
}

impl OpSpec {
    pub fn interactive(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            lane: Lane::Interactive,
            priority: 0,
            key: None,
            supersede: None,
            abort: None,
        }
    }

    pub fn background(label: impl Into<String>) -> Self {
        Self { lane: Lane::Background, ..Self::interactive(label) }
    }

    pub fn with_key(mut self, key: impl Into<String>, supersede: Supersede) -> Self {
        self.key = Some(key.into());
        self.supersede = Some(supersede);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

struct Entry {
    id: u64,
    label: String,
    priority: i32,
    enqueued_at: Instant,
    key: Option<String>,
    token: CancellationToken,
    task: OpTask,
}

struct Running {
    key: Option<String>,
    token: CancellationToken,
}

#[derive(Default)]
struct QueueState {
    interactive: VecDeque<Entry>,
    background: VecDeque<Entry>,
    running: Option<Running>,
    next_id: u64,
    shutdown: bool,
    drain_waiters: Vec<tokio::sync::oneshot::Sender<()>>,
}

type MetricsCallback = Box<dyn Fn(QueueMetrics) + Send + Sync>;
type EventCallback = Box<dyn Fn(OpEvent) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    metrics: Option<MetricsCallback>,
    lifecycle: Option<EventCallback>,
    on_error: Option<ErrorCallback>,
    on_fatal: Option<ErrorCallback>,
}

struct Inner {
    state: Mutex<QueueState>,
    callbacks: Mutex<Callbacks>,
    wake: Notify,
}

/// The queue handle. Cloneable; the run loop lives as long as any handle.
#[derive(Clone)]
pub struct OpQueue {
    inner: Arc<Inner>,
}

impl OpQueue {
    pub fn new() -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(QueueState::default()),
            callbacks: Mutex::new(Callbacks::default()),
            wake: Notify::new(),
        });
        let loop_inner = Arc::clone(&inner);
        let run = tokio::spawn(run_loop(loop_inner));

        // The loop never panics by construction; if it somehow dies, that is
        // the queue's own failure, not an op's.
        let fatal_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            if let Err(err) = run.await {
                if err.is_panic() {
                    warn!("op queue run loop panicked");
                    if let Some(on_fatal) = &fatal_inner.callbacks.lock().on_fatal {
                        on_fatal("op queue run loop panicked");
                    }
                }
            }
        });

        Self { inner }
    }

    pub fn on_metrics(&self, callback: impl Fn(QueueMetrics) + Send + Sync + 'static) {
        self.inner.callbacks.lock().metrics = Some(Box::new(callback));
    }

    pub fn on_lifecycle(&self, callback: impl Fn(OpEvent) + Send + Sync + 'static) {
        self.inner.callbacks.lock().lifecycle = Some(Box::new(callback));
    }

    pub fn on_error(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.callbacks.lock().on_error = Some(Box::new(callback));
    }

    pub fn on_fatal(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        self.inner.callbacks.lock().on_fatal = Some(Box::new(callback));
    }

    /// Enqueue an op. Returns its id and abort token.
    pub fn enqueue(&self, spec: OpSpec, task: OpTask) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        if let Some(abort) = &spec.abort {
            let token = token.clone();
            let abort = abort.clone();
            tokio::spawn(async move {
                abort.cancelled().await;
                token.cancel();
            });
        }

        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.next_id += 1;
        let id = state.next_id;

        if state.shutdown {
            // A drained queue accepts nothing; the op is born aborted.
            token.cancel();
            drop(guard);
            return (id, token);
        }

        // Keyed supersession before insertion.
        if let (Some(key), Some(mode)) = (&spec.key, spec.supersede) {
            supersede_pending(&mut state.interactive, key);
            supersede_pending(&mut state.background, key);
            if mode == Supersede::PendingAndRunning {
                if let Some(running) = &state.running {
                    if running.key.as_deref() == Some(key) {
                        running.token.cancel();
                    }
                }
            }
        }

        let entry = Entry {
            id,
            label: spec.label,
            priority: spec.priority,
            enqueued_at: Instant::now(),
            key: spec.key,
            token: token.clone(),
            task,
        };
        let lane = match spec.lane {
            Lane::Interactive => &mut state.interactive,
            Lane::Background => &mut state.background,
        };
        // FIFO within a priority class: insert after the last entry whose
        // priority is >= ours.
        let position = lane
            .iter()
            .rposition(|e| e.priority >= entry.priority)
            .map(|p| p + 1)
            .unwrap_or(0);
        lane.insert(position, entry);
        drop(guard);

        self.emit_metrics();
        self.inner.wake.notify_one();
        (id, token)
    }

    /// Resolve once both FIFOs are empty and nothing is running.
    pub async fn wait_for_drain(&self) {
        let rx = {
            let mut state = self.inner.state.lock();
            if state.interactive.is_empty()
                && state.background.is_empty()
                && state.running.is_none()
            {
                return;
            }
            let (tx, rx) = tokio::sync::oneshot::channel();
            state.drain_waiters.push(tx);
            rx
        };
        let _ = rx.await;
    }

    /// Abort everything queued, cancel the running op, and stop accepting
    /// the pretense of order: used at client shutdown.
    pub fn shutdown(&self) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        state.shutdown = true;
        for entry in state.interactive.drain(..).chain(state.background.drain(..)) {
            entry.token.cancel();
        }
        if let Some(running) = &state.running {
            running.token.cancel();
        }
        drop(guard);
        self.emit_metrics();
        self.inner.wake.notify_one();
    }

    pub fn metrics(&self) -> QueueMetrics {
        let state = self.inner.state.lock();
        QueueMetrics {
            interactive_queued: state.interactive.len(),
            background_queued: state.background.len(),
            running: usize::from(state.running.is_some()),
        }
    }

    fn emit_metrics(&self) {
        let metrics = self.metrics();
        if let Some(callback) = &self.inner.callbacks.lock().metrics {
            callback(metrics);
        }
    }

    fn emit_event(&self, event: OpEvent) {
        if let Some(callback) = &self.inner.callbacks.lock().lifecycle {
            callback(event);
        }
    }
}

impl Default for OpQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn supersede_pending(lane: &mut VecDeque<Entry>, key: &str) {
    lane.retain(|entry| {
        if entry.key.as_deref() == Some(key) {
            entry.token.cancel();
            false
        } else {
            true
        }
    });
}

async fn run_loop(inner: Arc<Inner>) {
    let queue = OpQueue { inner: Arc::clone(&inner) };
    loop {
        let entry = {
            let mut guard = inner.state.lock();
            let state = &mut *guard;
            let entry = state
                .interactive
                .pop_front()
                .or_else(|| state.background.pop_front());
            match entry {
                Some(entry) => {
                    state.running =
                        Some(Running { key: entry.key.clone(), token: entry.token.clone() });
                    Some(entry)
                }
                None => {
                    if state.interactive.is_empty()
                        && state.background.is_empty()
                        && state.running.is_none()
                    {
                        for waiter in state.drain_waiters.drain(..) {
                            let _ = waiter.send(());
                        }
                    }
                    None
                }
            }
        };

        let Some(entry) = entry else {
            inner.wake.notified().await;
            continue;
        };

        queue.emit_metrics();

        // Superseded while queued: skip without running.
        if entry.token.is_cancelled() {
            queue.emit_event(OpEvent::Aborted { id: entry.id, label: entry.label.clone() });
            inner.state.lock().running = None;
            queue.emit_metrics();
            continue;
        }

        queue.emit_event(OpEvent::Started {
            id: entry.id,
            label: entry.label.clone(),
            wait: entry.enqueued_at.elapsed(),
        });

        let token = entry.token.clone();
        let task = (entry.task)(token.clone());
        // Run on a child task so an op panic is contained as an error.
        let outcome = tokio::spawn(task).await;

        match outcome {
            Ok(Ok(())) => {
                if token.is_cancelled() {
                    queue.emit_event(OpEvent::Aborted { id: entry.id, label: entry.label });
                } else {
                    queue.emit_event(OpEvent::Completed { id: entry.id, label: entry.label });
                }
            }
            Ok(Err(error)) => {
                if let Some(on_error) = &inner.callbacks.lock().on_error {
                    on_error(&error);
                }
                queue.emit_event(OpEvent::Failed { id: entry.id, label: entry.label, error });
            }
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    "op panicked".to_string()
                } else {
                    "op cancelled".to_string()
                };
                if let Some(on_error) = &inner.callbacks.lock().on_error {
                    on_error(&message);
                }
                queue.emit_event(OpEvent::Failed {
                    id: entry.id,
                    label: entry.label,
                    error: message,
                });
            }
        }

        inner.state.lock().running = None;
        queue.emit_metrics();
    }
}

#[cfg(test)]
#[path = "op_queue_tests.rs"]
mod tests;
