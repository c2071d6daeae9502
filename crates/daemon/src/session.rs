// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-conversation session runtime.
//!
//! Each live conversation runs one actor task that owns every mutable
//! session field: status, attention, telemetry, controller claim, the
//! broker, and the PTY handle. All mutations arrive as messages, so the
//! actor is the serialization point the claim CAS and status machine rely
//! on. PTY bytes flow in from the host's reader thread; protocol commands
//! flow in from connection tasks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use harness_core::{
    map_notify, AgentType, Clock, Controller, ControllerId, EventEnvelope, EventKind, ExitStatus,
    ObservedPayload, Scope, SessionStatus, StatusHint, StatusInput, SystemClock, ThreadId,
};
use harness_storage::{EventLog, StateStore};
use harness_wire::{
    encode_chunk, ClaimAction, ClaimResult, CommandError, PtySignalKind, ServerEnvelope,
    SessionEvent, SnapshotResult,
};

use crate::broker::TailBacklog;
use crate::hub::ObservedHub;
use crate::outbound::{ConnId, Outbound};
use crate::pty::{PtyCommand, PtyError, PtyHost, PtyOutput};

/// Shared collaborators handed to every session actor.
#[derive(Clone)]
pub struct SessionDeps {
    pub store: Arc<Mutex<StateStore>>,
    pub events: EventLog,
    pub hub: Arc<ObservedHub>,
    pub tail_budget: usize,
    pub desktop_notify: bool,
}

/// Launch parameters for one session.
#[derive(Debug, Clone)]
pub struct SessionStart {
    pub thread_id: ThreadId,
    pub agent_type: AgentType,
    pub scope: Scope,
    pub worktree_id: String,
    pub title: String,
    pub command: PtyCommand,
}

/// Messages accepted by a session actor.
pub enum SessionMsg {
    /// Raw input from a connection; ignored unless it is the controller.
    Input { data: Vec<u8>, conn: ConnId },
    Resize { cols: u16, rows: u16, conn: ConnId },
    Signal { signal: PtySignalKind, conn: ConnId },
    /// `session.respond`: forward a line of input, force `running`.
    Respond { text: String, reply: oneshot::Sender<Result<(), CommandError>> },
    Interrupt { reply: oneshot::Sender<Result<(), CommandError>> },
    /// A hook-relay notify record.
    Notify { record: serde_json::Value },
    Attach { since_cursor: Option<u64>, out: Outbound, reply: oneshot::Sender<u64> },
    Detach { conn: ConnId },
    SubscribeEvents { out: Outbound },
    UnsubscribeEvents { conn: ConnId },
    Claim {
        controller: Controller,
        takeover: bool,
        conn: ConnId,
        reply: oneshot::Sender<ClaimResult>,
    },
    Release { controller_id: ControllerId, reply: oneshot::Sender<bool> },
    Snapshot { reply: oneshot::Sender<SnapshotResult> },
    Close { reply: oneshot::Sender<()> },
    ConnClosed { conn: ConnId },
}

/// Handle to a running session actor.
#[derive(Clone)]
pub struct SessionHandle {
    pub thread_id: ThreadId,
    tx: mpsc::Sender<SessionMsg>,
}

impl SessionHandle {
    pub async fn send(&self, msg: SessionMsg) -> bool {
        self.tx.send(msg).await.is_ok()
    }

    /// Best-effort send from non-async contexts.
    pub fn try_send(&self, msg: SessionMsg) -> bool {
        self.tx.try_send(msg).is_ok()
    }

    pub fn is_live(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Registry of live session actors. Dead handles are pruned on access.
#[derive(Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<ThreadId, SessionHandle>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: SessionHandle) {
        self.sessions.lock().insert(handle.thread_id.clone(), handle);
    }

    pub fn get(&self, id: &ThreadId) -> Option<SessionHandle> {
        let mut sessions = self.sessions.lock();
        match sessions.get(id) {
            Some(handle) if handle.is_live() => Some(handle.clone()),
            Some(_) => {
                sessions.remove(id);
                None
            }
            None => None,
        }
    }

    pub fn live_handles(&self) -> Vec<SessionHandle> {
        let mut sessions = self.sessions.lock();
        sessions.retain(|_, handle| handle.is_live());
        sessions.values().cloned().collect()
    }

    pub fn live_count(&self) -> usize {
        self.live_handles().len()
    }

    /// Fan a connection-teardown notice to every live actor.
    pub async fn conn_closed(&self, conn: ConnId) {
        for handle in self.live_handles() {
            handle.send(SessionMsg::ConnClosed { conn }).await;
        }
    }
}

/// Spawn the actor and its PTY. The conversation row must already exist.
pub fn spawn_session(start: SessionStart, deps: SessionDeps) -> Result<SessionHandle, PtyError> {
    let (pty_tx, pty_rx) = mpsc::channel(256);
    let host = PtyHost::spawn(&start.command, pty_tx)?;
    let (msg_tx, msg_rx) = mpsc::channel(256);

    let handle = SessionHandle { thread_id: start.thread_id.clone(), tx: msg_tx };
    let actor = SessionActor::new(start, host, deps);
    tokio::spawn(actor.run(msg_rx, pty_rx));
    Ok(handle)
}

struct SessionActor {
    thread_id: ThreadId,
    agent_type: AgentType,
    scope: Scope,
    worktree_id: String,
    title: String,

    status: SessionStatus,
    attention_reason: Option<String>,
    status_model: Option<String>,
    live: bool,
    process_id: Option<u32>,
    last_event_at: Option<String>,
    last_exit: Option<ExitStatus>,
    latest_telemetry: Option<serde_json::Value>,

    controller: Option<Controller>,
    controller_conn: Option<ConnId>,

    backlog: TailBacklog,
    attached: Vec<Outbound>,
    event_subs: Vec<Outbound>,

    pty: PtyHost,
    exited: bool,

    deps: SessionDeps,
    clock: SystemClock,
}

impl SessionActor {
    fn new(start: SessionStart, pty: PtyHost, deps: SessionDeps) -> Self {
        let process_id = pty.process_id();
        let backlog = TailBacklog::new(deps.tail_budget);
        Self {
            thread_id: start.thread_id,
            agent_type: start.agent_type,
            scope: start.scope,
            worktree_id: start.worktree_id,
            title: start.title,
            status: SessionStatus::Running,
            attention_reason: None,
            status_model: None,
            live: true,
            process_id,
            last_event_at: None,
            last_exit: None,
            latest_telemetry: None,
            controller: None,
            controller_conn: None,
            backlog,
            attached: Vec::new(),
            event_subs: Vec::new(),
            pty,
            exited: false,
            deps,
            clock: SystemClock,
        }
    }

    async fn run(
        mut self,
        mut msg_rx: mpsc::Receiver<SessionMsg>,
        mut pty_rx: mpsc::Receiver<PtyOutput>,
    ) {
        info!(session = %self.thread_id, pid = ?self.process_id, "session started");
        self.persist_envelope(EventKind::SessionStart, serde_json::json!({
            "sessionId": self.thread_id,
            "processId": self.process_id,
        }));
        self.persist_snapshot();
        self.publish_status();

        while !self.exited {
            tokio::select! {
                output = pty_rx.recv() => match output {
                    Some(PtyOutput::Chunk(bytes)) => self.on_pty_chunk(&bytes),
                    Some(PtyOutput::Exit(exit)) => self.on_pty_exit(exit),
                    // Host threads gone without an exit record: treat as exit.
                    None => self.on_pty_exit(ExitStatus { code: None, signal: None }),
                },
                msg = msg_rx.recv() => match msg {
                    Some(msg) => self.on_msg(msg),
                    None => break,
                },
            }
        }

        // Drain control messages briefly so callers racing the exit get
        // answers instead of dropped oneshots.
        while let Ok(msg) = msg_rx.try_recv() {
            self.on_msg(msg);
        }
        debug!(session = %self.thread_id, "session actor stopped");
    }

    fn on_msg(&mut self, msg: SessionMsg) {
        match msg {
            SessionMsg::Input { data, conn } => self.on_input(&data, conn),
            SessionMsg::Resize { cols, rows, conn } => {
                if self.is_controller_conn(conn) && !self.exited {
                    self.pty.resize(cols, rows);
                }
            }
            SessionMsg::Signal { signal, conn } => self.on_signal(signal, conn),
            SessionMsg::Respond { text, reply } => {
                let _ = reply.send(self.on_respond(&text));
            }
            SessionMsg::Interrupt { reply } => {
                let result = if self.exited {
                    Err(CommandError::session_not_live(&self.thread_id))
                } else {
                    self.pty
                        .interrupt()
                        .map_err(|e| CommandError::new("pty-write-failed", e.to_string()))
                };
                let _ = reply.send(result);
            }
            SessionMsg::Notify { record } => self.on_notify(record),
            SessionMsg::Attach { since_cursor, out, reply } => {
                let cursor = self.on_attach(since_cursor, out);
                let _ = reply.send(cursor);
            }
            SessionMsg::Detach { conn } => {
                self.attached.retain(|out| out.conn_id() != conn);
            }
            SessionMsg::SubscribeEvents { out } => {
                self.event_subs.retain(|sub| sub.conn_id() != out.conn_id());
                self.event_subs.push(out);
            }
            SessionMsg::UnsubscribeEvents { conn } => {
                self.event_subs.retain(|sub| sub.conn_id() != conn);
            }
            SessionMsg::Claim { controller, takeover, conn, reply } => {
                let _ = reply.send(self.on_claim(controller, takeover, conn));
            }
            SessionMsg::Release { controller_id, reply } => {
                let _ = reply.send(self.on_release(&controller_id));
            }
            SessionMsg::Snapshot { reply } => {
                let (cursor, bytes) = self.backlog.snapshot();
                let _ = reply.send(SnapshotResult { cursor, chunk_base64: encode_chunk(&bytes) });
            }
            SessionMsg::Close { reply } => {
                if !self.exited {
                    self.pty.terminate();
                }
                let _ = reply.send(());
            }
            SessionMsg::ConnClosed { conn } => {
                self.attached.retain(|out| out.conn_id() != conn);
                self.event_subs.retain(|sub| sub.conn_id() != conn);
                if self.controller_conn == Some(conn) {
                    // The claim survives; only the connection binding clears.
                    self.controller_conn = None;
                }
            }
        }
    }

    // ---- PTY flow ----

    fn on_pty_chunk(&mut self, bytes: &[u8]) {
        if self.exited {
            return;
        }
        let chunk = self.backlog.push(bytes);
        let envelope = ServerEnvelope::PtyOutput {
            session_id: self.thread_id.clone(),
            cursor: chunk.cursor,
            chunk_base64: encode_chunk(&chunk.bytes),
        };
        self.attached.retain(|out| out.send(envelope.clone()));

        self.persist_envelope(EventKind::TerminalOutput, serde_json::json!({
            "sessionId": self.thread_id,
            "cursor": chunk.cursor,
            "chunkBase64": encode_chunk(&chunk.bytes),
        }));

        self.apply_status_input(&StatusInput::PtyOutput);
    }

    fn on_pty_exit(&mut self, exit: ExitStatus) {
        if self.exited {
            // Coalesced: secondary errors after the exit record are dropped.
            return;
        }
        self.exited = true;
        self.live = false;
        self.last_exit = Some(exit.clone());
        self.last_event_at = Some(self.clock.now_rfc3339());

        self.apply_status_input(&StatusInput::PtyExit);

        let exit_envelope =
            ServerEnvelope::PtyExit { session_id: self.thread_id.clone(), exit: exit.clone() };
        self.attached.retain(|out| out.send(exit_envelope.clone()));
        let event = ServerEnvelope::PtyEvent {
            session_id: self.thread_id.clone(),
            event: SessionEvent::SessionExit { exit: exit.clone() },
        };
        self.event_subs.retain(|sub| sub.send(event.clone()));

        self.persist_envelope(EventKind::AgentSessionExit, serde_json::json!({
            "sessionId": self.thread_id,
            "exit": exit,
        }));

        self.attached.clear();
        self.event_subs.clear();
        info!(session = %self.thread_id, code = ?exit.code, "session exited");
    }

    // ---- commands ----

    fn on_input(&mut self, data: &[u8], conn: ConnId) {
        if self.exited || !self.is_controller_conn(conn) {
            return;
        }
        if let Err(err) = self.pty.write(data) {
            warn!(session = %self.thread_id, %err, "controller input write failed");
            return;
        }
        self.apply_status_input(&StatusInput::ControllerInput);
    }

    fn on_signal(&mut self, signal: PtySignalKind, conn: ConnId) {
        if self.exited || !self.is_controller_conn(conn) {
            return;
        }
        let result = match signal {
            PtySignalKind::Interrupt => self.pty.interrupt(),
            PtySignalKind::Eof => self.pty.eof(),
            PtySignalKind::Terminate => {
                self.pty.terminate();
                Ok(())
            }
        };
        if let Err(err) = result {
            warn!(session = %self.thread_id, %signal, %err, "signal delivery failed");
        }
    }

    fn on_respond(&mut self, text: &str) -> Result<(), CommandError> {
        if self.exited {
            return Err(CommandError::session_not_live(&self.thread_id));
        }
        let mut line = text.as_bytes().to_vec();
        if !line.ends_with(b"\n") {
            line.push(b'\n');
        }
        self.pty
            .write(&line)
            .map_err(|e| CommandError::new("pty-write-failed", e.to_string()))?;
        self.apply_status_input(&StatusInput::Respond);
        Ok(())
    }

    fn on_attach(&mut self, since_cursor: Option<u64>, out: Outbound) -> u64 {
        // Replay the retained suffix first, then register; both happen on
        // the actor so no chunk can slip between them.
        for chunk in self.backlog.replay(since_cursor.unwrap_or(0)) {
            out.send(ServerEnvelope::PtyOutput {
                session_id: self.thread_id.clone(),
                cursor: chunk.cursor,
                chunk_base64: encode_chunk(&chunk.bytes),
            });
        }
        self.attached.retain(|sub| sub.conn_id() != out.conn_id());
        self.attached.push(out);
        self.backlog.cursor()
    }

    fn on_claim(&mut self, controller: Controller, takeover: bool, conn: ConnId) -> ClaimResult {
        match &self.controller {
            None => {
                self.controller = Some(controller);
                self.controller_conn = Some(conn);
                self.after_claim_change();
                ClaimResult { action: ClaimAction::Claimed, controller: self.controller.clone() }
            }
            Some(existing) if existing.controller_id == controller.controller_id => {
                // Same controller, possibly a new connection: rebind.
                self.controller_conn = Some(conn);
                ClaimResult {
                    action: ClaimAction::AlreadyOwned,
                    controller: self.controller.clone(),
                }
            }
            Some(_) if takeover => {
                self.controller = Some(controller);
                self.controller_conn = Some(conn);
                self.after_claim_change();
                ClaimResult { action: ClaimAction::Claimed, controller: self.controller.clone() }
            }
            // A non-takeover claim against a foreign controller reports the
            // standing ownership; `takeover-declined` is reserved for a
            // takeover attempt the runtime refuses.
            Some(existing) => ClaimResult {
                action: ClaimAction::AlreadyOwned,
                controller: Some(existing.clone()),
            },
        }
    }

    fn on_release(&mut self, controller_id: &ControllerId) -> bool {
        match &self.controller {
            Some(existing) if existing.controller_id == *controller_id => {
                self.controller = None;
                self.controller_conn = None;
                self.after_claim_change();
                true
            }
            _ => false,
        }
    }

    fn after_claim_change(&mut self) {
        self.persist_snapshot();
        self.publish_status();
    }

    // ---- hook events ----

    fn on_notify(&mut self, record: serde_json::Value) {
        if self.exited {
            return;
        }
        let mapping = map_notify(self.agent_type, &record);
        self.last_event_at = Some(self.clock.now_rfc3339());
        if let Some(model) = record.get("model").and_then(|v| v.as_str()) {
            self.status_model = Some(model.to_string());
        }
        self.latest_telemetry = Some(record.clone());

        self.persist_envelope(EventKind::AgentNotify, serde_json::json!({
            "sessionId": self.thread_id,
            "eventName": mapping.event_name,
            "record": record,
        }));

        self.deps.hub.publish(
            &self.scope,
            ObservedPayload::SessionEvent {
                session_id: self.thread_id.clone(),
                event_name: mapping.event_name.clone(),
                record: record.clone(),
            },
        );

        if let Some(prompt) = record.get("prompt").and_then(|v| v.as_str()) {
            self.deps.hub.publish(
                &self.scope,
                ObservedPayload::SessionPrompt {
                    session_id: self.thread_id.clone(),
                    prompt: prompt.to_string(),
                },
            );
        }

        let notify_envelope = ServerEnvelope::PtyEvent {
            session_id: self.thread_id.clone(),
            event: SessionEvent::Notify { record: record.clone() },
        };
        self.event_subs.retain(|sub| sub.send(notify_envelope.clone()));

        let Some(hint) = mapping.status_hint else {
            // No hint: telemetry only, never a state change.
            self.persist_snapshot();
            return;
        };

        self.deps.hub.publish(
            &self.scope,
            ObservedPayload::SessionKeyEvent {
                session_id: self.thread_id.clone(),
                event_name: mapping.event_name.clone(),
                record: record.clone(),
            },
        );

        if hint == StatusHint::Completed {
            let turn = ServerEnvelope::PtyEvent {
                session_id: self.thread_id.clone(),
                event: SessionEvent::TurnCompleted,
            };
            self.event_subs.retain(|sub| sub.send(turn.clone()));
        }

        let changed = self
            .apply_status_input(&StatusInput::Hint { hint, summary: mapping.summary.clone() });
        if changed && self.status == SessionStatus::NeedsInput {
            let reason =
                self.attention_reason.clone().unwrap_or_else(|| "input required".to_string());
            let attention = ServerEnvelope::PtyEvent {
                session_id: self.thread_id.clone(),
                event: SessionEvent::AttentionRequired {
                    reason: reason.clone(),
                    record: record.clone(),
                },
            };
            self.event_subs.retain(|sub| sub.send(attention.clone()));
            if self.deps.desktop_notify {
                crate::notify::post_attention(&self.title, &reason);
            }
        }
        if !changed {
            self.persist_snapshot();
        }
    }

    // ---- state plumbing ----

    fn is_controller_conn(&self, conn: ConnId) -> bool {
        self.controller_conn == Some(conn)
    }

    /// Run the status machine; on a change, persist and publish.
    fn apply_status_input(&mut self, input: &StatusInput) -> bool {
        let Some(change) =
            harness_core::transition(self.status, self.attention_reason.as_deref(), input)
        else {
            return false;
        };
        self.status = change.status;
        self.attention_reason = change.attention_reason;
        self.persist_snapshot();
        self.publish_status();
        self.persist_envelope(EventKind::SessionStatus, serde_json::json!({
            "sessionId": self.thread_id,
            "status": self.status,
            "attentionReason": self.attention_reason,
        }));
        true
    }

    fn snapshot(&self) -> harness_core::RuntimeSnapshot {
        harness_core::RuntimeSnapshot {
            status: self.status,
            status_model: self.status_model.clone(),
            live: self.live,
            attention_reason: self.attention_reason.clone(),
            process_id: self.process_id,
            last_event_at: self.last_event_at.clone(),
            last_exit: self.last_exit.clone(),
            controller: self.controller.clone(),
        }
    }

    fn persist_snapshot(&self) {
        let result =
            self.deps.store.lock().update_runtime_snapshot(&self.thread_id, &self.snapshot());
        if let Err(err) = result {
            warn!(session = %self.thread_id, %err, "runtime snapshot write failed");
        }
    }

    fn publish_status(&self) {
        self.deps.hub.publish(
            &self.scope,
            ObservedPayload::SessionStatus {
                session_id: self.thread_id.clone(),
                status: self.status,
                attention_reason: self.attention_reason.clone(),
                live: self.live,
                controller: self.controller.clone(),
            },
        );
    }

    fn persist_envelope(&self, kind: EventKind, payload: serde_json::Value) {
        self.deps.events.append(EventEnvelope {
            id: None,
            ts: self.clock.now_rfc3339(),
            kind,
            scope: self.scope.clone(),
            worktree_id: Some(self.worktree_id.clone()),
            payload,
        });
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
