// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command dispatcher.
//!
//! Commands run on spawned tasks; everything session-mutating funnels into
//! the session actor, and everything store-mutating goes through the single
//! store mutex, so per-session ordering and claim atomicity hold no matter
//! how many connections race.

use std::sync::Arc;

use serde_json::json;

use harness_core::{
    map_notify, Clock, Controller, ControllerId, ControllerType, Conversation, EventEnvelope,
    EventKind, ObservedPayload, RuntimeSnapshot, SessionStatus, SystemClock, ThreadId,
};
use harness_storage::StoreError;
use harness_wire::{
    ClaimAction, ClaimResult, Command, CommandError, SessionListResult,
};

use crate::lifecycle::Gateway;
use crate::pty::PtyCommand;
use crate::session::{spawn_session, SessionMsg, SessionStart};

use super::{registry, tasks, ConnCtx};

pub(crate) async fn dispatch(
    gateway: &Arc<Gateway>,
    ctx: &Arc<ConnCtx>,
    command: Command,
) -> Result<serde_json::Value, CommandError> {
    match command {
        Command::SessionList { limit } => {
            let sessions = gateway
                .store
                .lock()
                .list_conversations(&gateway.scope, false, limit)
                .map_err(store_error)?;
            to_json(&SessionListResult { sessions })
        }

        Command::SessionStatus { session_id } => {
            let conversation =
                gateway.store.lock().get_conversation(&session_id).map_err(store_error)?;
            to_json(&conversation)
        }

        Command::SessionSnapshot { session_id } => {
            let handle = live_handle(gateway, &session_id)?;
            let (tx, rx) = tokio::sync::oneshot::channel();
            handle.send(SessionMsg::Snapshot { reply: tx }).await;
            let snapshot = rx.await.map_err(|_| CommandError::session_not_live(&session_id))?;
            to_json(&snapshot)
        }

        Command::SessionRespond { session_id, text } => {
            let handle = live_handle(gateway, &session_id)?;
            let (tx, rx) = tokio::sync::oneshot::channel();
            handle.send(SessionMsg::Respond { text, reply: tx }).await;
            rx.await.map_err(|_| CommandError::session_not_live(&session_id))??;
            Ok(json!({}))
        }

        Command::SessionInterrupt { session_id } => {
            let handle = live_handle(gateway, &session_id)?;
            let (tx, rx) = tokio::sync::oneshot::channel();
            handle.send(SessionMsg::Interrupt { reply: tx }).await;
            rx.await.map_err(|_| CommandError::session_not_live(&session_id))??;
            Ok(json!({}))
        }

        Command::SessionRemove { session_id } => {
            if let Some(handle) = gateway.sessions.get(&session_id) {
                let (tx, rx) = tokio::sync::oneshot::channel();
                handle.send(SessionMsg::Close { reply: tx }).await;
                let _ = rx.await;
            }
            let now = SystemClock.now_rfc3339();
            gateway.store.lock().archive_conversation(&session_id, &now).map_err(store_error)?;
            Ok(json!({}))
        }

        Command::SessionClaim {
            session_id,
            controller_id,
            controller_type,
            controller_label,
            takeover,
        } => {
            let controller = Controller {
                controller_label: controller_label
                    .unwrap_or_else(|| controller_id.as_str().to_string()),
                controller_id,
                controller_type: controller_type.unwrap_or(ControllerType::Human),
                claimed_at: SystemClock.now_rfc3339(),
            };
            let result = match gateway.sessions.get(&session_id) {
                Some(handle) => {
                    let (tx, rx) = tokio::sync::oneshot::channel();
                    handle
                        .send(SessionMsg::Claim {
                            controller,
                            takeover,
                            conn: ctx.conn_id,
                            reply: tx,
                        })
                        .await;
                    rx.await.map_err(|_| CommandError::session_not_live(&session_id))?
                }
                None => claim_persisted(gateway, &session_id, controller, takeover)?,
            };
            to_json(&result)
        }

        Command::SessionRelease { session_id, controller_id } => {
            let released = match gateway.sessions.get(&session_id) {
                Some(handle) => {
                    let (tx, rx) = tokio::sync::oneshot::channel();
                    handle.send(SessionMsg::Release { controller_id, reply: tx }).await;
                    rx.await.map_err(|_| CommandError::session_not_live(&session_id))?
                }
                None => release_persisted(gateway, &session_id, &controller_id)?,
            };
            Ok(json!({ "released": released }))
        }

        Command::SessionNotify { session_id, record } => {
            match gateway.sessions.get(&session_id) {
                Some(handle) => {
                    handle.send(SessionMsg::Notify { record }).await;
                }
                None => notify_persisted(gateway, &session_id, record)?,
            }
            Ok(json!({}))
        }

        Command::PtyStart { session_id, command, args, cwd, cols, rows } => {
            start_pty(gateway, ctx, session_id, command, args, cwd, cols, rows).await
        }

        Command::PtyAttach { session_id, since_cursor } => {
            let handle = live_handle(gateway, &session_id)?;
            let (tx, rx) = tokio::sync::oneshot::channel();
            handle
                .send(SessionMsg::Attach {
                    since_cursor,
                    out: ctx.outbound.clone(),
                    reply: tx,
                })
                .await;
            let cursor = rx.await.map_err(|_| CommandError::session_not_live(&session_id))?;
            Ok(json!({ "cursor": cursor }))
        }

        Command::PtyDetach { session_id } => {
            if let Some(handle) = gateway.sessions.get(&session_id) {
                handle.send(SessionMsg::Detach { conn: ctx.conn_id }).await;
            }
            Ok(json!({}))
        }

        Command::PtySubscribeEvents { session_id } => {
            let handle = live_handle(gateway, &session_id)?;
            handle.send(SessionMsg::SubscribeEvents { out: ctx.outbound.clone() }).await;
            Ok(json!({}))
        }

        Command::PtyUnsubscribeEvents { session_id } => {
            if let Some(handle) = gateway.sessions.get(&session_id) {
                handle.send(SessionMsg::UnsubscribeEvents { conn: ctx.conn_id }).await;
            }
            Ok(json!({}))
        }

        Command::PtyClose { session_id } => {
            let handle = live_handle(gateway, &session_id)?;
            let (tx, rx) = tokio::sync::oneshot::channel();
            handle.send(SessionMsg::Close { reply: tx }).await;
            let _ = rx.await;
            Ok(json!({}))
        }

        Command::AttentionList => {
            let sessions: Vec<Conversation> = gateway
                .store
                .lock()
                .list_conversations(&gateway.scope, false, None)
                .map_err(store_error)?
                .into_iter()
                .filter(|c| c.runtime.status == SessionStatus::NeedsInput)
                .collect();
            to_json(&SessionListResult { sessions })
        }

        Command::DirectoryUpsert { path } => registry::directory_upsert(gateway, &path),
        Command::DirectoryList => registry::directory_list(gateway),
        Command::DirectoryArchive { directory_id } => {
            registry::directory_archive(gateway, &directory_id)
        }

        Command::RepositoryUpsert { name, remote_url, default_branch, metadata } => {
            registry::repository_upsert(
                gateway,
                &name,
                &remote_url,
                default_branch.as_deref(),
                metadata.as_ref(),
            )
        }
        Command::RepositoryList => registry::repository_list(gateway),
        Command::RepositoryUpdate { repository_id, name, default_branch, metadata } => {
            registry::repository_update(
                gateway,
                &repository_id,
                name.as_deref(),
                default_branch.as_deref(),
                metadata.as_ref(),
            )
        }
        Command::RepositoryArchive { repository_id } => {
            registry::repository_archive(gateway, &repository_id)
        }

        Command::TaskCreate { scope_kind, repository_id, project_id, title, body } => {
            tasks::create(
                gateway,
                scope_kind,
                repository_id.as_ref(),
                project_id.as_deref(),
                &title,
                body.as_deref(),
            )
        }
        Command::TaskUpdate { task_id, title, body } => {
            tasks::update(gateway, &task_id, title.as_deref(), body.as_deref())
        }
        Command::TaskDelete { task_id } => tasks::delete(gateway, &task_id),
        Command::TaskList { status, repository_id } => {
            tasks::list(gateway, status, repository_id.as_ref())
        }
        Command::TaskReorder { task_ids } => tasks::reorder(gateway, &task_ids),
        Command::TaskReady { task_id } => {
            tasks::set_status(gateway, &task_id, harness_core::TaskStatus::Ready)
        }
        Command::TaskDraft { task_id } => {
            tasks::set_status(gateway, &task_id, harness_core::TaskStatus::Draft)
        }
        Command::TaskComplete { task_id } => {
            tasks::set_status(gateway, &task_id, harness_core::TaskStatus::Completed)
        }
        Command::TaskClaim { task_id, controller_id, project_id, branch_name, base_branch } => {
            tasks::claim(
                gateway,
                &task_id,
                &controller_id,
                project_id.as_deref(),
                branch_name.as_deref(),
                base_branch.as_deref(),
            )
        }
        Command::TaskPull { controller_id, repository_id, project_id } => {
            tasks::pull(gateway, &controller_id, repository_id.as_ref(), project_id.as_deref())
        }

        Command::ConversationCreate { directory_id, title, agent_type, worktree_id } => {
            let now = SystemClock.now_rfc3339();
            let store = gateway.store.lock();
            let directory = store.get_directory(&directory_id).map_err(store_error)?;
            let conversation = Conversation {
                thread_id: ThreadId::new(),
                directory_id: directory.directory_id,
                scope: gateway.scope.clone(),
                worktree_id: worktree_id.unwrap_or_else(|| "default".to_string()),
                title,
                agent_type,
                adapter_state: json!({}),
                created_at: now,
                archived_at: None,
                runtime: RuntimeSnapshot::default(),
            };
            store.insert_conversation(&conversation).map_err(store_error)?;
            drop(store);
            to_json(&json!({ "session": conversation }))
        }

        Command::ConversationUpdateTitle { session_id, title } => {
            gateway
                .store
                .lock()
                .update_conversation_title(&session_id, &title)
                .map_err(store_error)?;
            Ok(json!({}))
        }

        Command::ConversationList { include_archived } => {
            let sessions = gateway
                .store
                .lock()
                .list_conversations(&gateway.scope, include_archived, None)
                .map_err(store_error)?;
            to_json(&SessionListResult { sessions })
        }

        Command::ConversationArchive { session_id } => {
            if let Some(handle) = gateway.sessions.get(&session_id) {
                let (tx, rx) = tokio::sync::oneshot::channel();
                handle.send(SessionMsg::Close { reply: tx }).await;
                let _ = rx.await;
            }
            let now = SystemClock.now_rfc3339();
            gateway.store.lock().archive_conversation(&session_id, &now).map_err(store_error)?;
            Ok(json!({}))
        }

        Command::StreamSubscribe { after_cursor } => {
            let (sub, cursor) = gateway.hub.subscribe(
                &gateway.scope,
                after_cursor,
                false,
                ctx.outbound.clone(),
            );
            let old = ctx.stream_sub.lock().replace(sub);
            if let Some(old) = old {
                gateway.hub.unsubscribe(old);
            }
            Ok(json!({ "cursor": cursor }))
        }

        Command::StreamUnsubscribe => {
            if let Some(sub) = ctx.stream_sub.lock().take() {
                gateway.hub.unsubscribe(sub);
            }
            Ok(json!({}))
        }

        Command::KeyEventsSubscribe { after_cursor } => {
            let (sub, cursor) =
                gateway.hub.subscribe(&gateway.scope, after_cursor, true, ctx.outbound.clone());
            let old = ctx.key_sub.lock().replace(sub);
            if let Some(old) = old {
                gateway.hub.unsubscribe(old);
            }
            Ok(json!({ "cursor": cursor }))
        }

        Command::KeyEventsUnsubscribe => {
            if let Some(sub) = ctx.key_sub.lock().take() {
                gateway.hub.unsubscribe(sub);
            }
            Ok(json!({}))
        }
    }
}

// ---- helpers ----

pub(crate) fn to_json<T: serde::Serialize>(
    value: &T,
) -> Result<serde_json::Value, CommandError> {
    serde_json::to_value(value)
        .map_err(|e| CommandError::new("internal", format!("serialize failed: {e}")))
}

pub(crate) fn store_error(err: StoreError) -> CommandError {
    match err {
        StoreError::NotFound { kind, id } => {
            CommandError::new(format!("{kind}-not-found"), format!("no {kind} {id}"))
        }
        other => CommandError::new("store-error", other.to_string()),
    }
}

fn live_handle(
    gateway: &Gateway,
    session_id: &ThreadId,
) -> Result<crate::session::SessionHandle, CommandError> {
    if let Some(handle) = gateway.sessions.get(session_id) {
        return Ok(handle);
    }
    // Distinguish a dead session from an unknown one.
    match gateway.store.lock().get_conversation(session_id) {
        Ok(_) => Err(CommandError::session_not_live(session_id)),
        Err(_) => Err(CommandError::session_not_found(session_id)),
    }
}

#[allow(clippy::too_many_arguments)]
async fn start_pty(
    gateway: &Arc<Gateway>,
    ctx: &Arc<ConnCtx>,
    session_id: ThreadId,
    command: Option<String>,
    args: Vec<String>,
    cwd: Option<String>,
    cols: Option<u16>,
    rows: Option<u16>,
) -> Result<serde_json::Value, CommandError> {
    if gateway.sessions.get(&session_id).is_some() {
        return Err(CommandError::new(
            "session-already-live",
            format!("session {session_id} already has a pty"),
        ));
    }
    let (conversation, directory_path) = {
        let store = gateway.store.lock();
        let conversation = store.get_conversation(&session_id).map_err(store_error)?;
        let path = store
            .get_directory(&conversation.directory_id)
            .map(|d| d.path)
            .unwrap_or_else(|_| ".".to_string());
        (conversation, path)
    };

    let mut pty_command =
        PtyCommand::new(command.unwrap_or_else(|| {
            conversation.agent_type.default_command().to_string()
        }));
    pty_command.args = args;
    pty_command.cwd = Some(cwd.unwrap_or(directory_path));
    pty_command.cols = cols.unwrap_or(80);
    pty_command.rows = rows.unwrap_or(24);
    pty_command.env.push(("HARNESS_SESSION_ID".to_string(), session_id.as_str().to_string()));

    let start = SessionStart {
        thread_id: session_id.clone(),
        agent_type: conversation.agent_type,
        scope: gateway.scope.clone(),
        worktree_id: conversation.worktree_id.clone(),
        title: conversation.title.clone(),
        command: pty_command,
    };
    let handle = spawn_session(start, gateway.session_deps())
        .map_err(|e| CommandError::new("pty-start-failed", e.to_string()))?;
    gateway.sessions.insert(handle);
    ctx.owned_sessions.lock().insert(session_id.clone());
    Ok(json!({ "sessionId": session_id }))
}

/// Claim CAS against the persisted snapshot for a non-live session. The
/// store mutex is the serialization point here.
fn claim_persisted(
    gateway: &Gateway,
    session_id: &ThreadId,
    controller: Controller,
    takeover: bool,
) -> Result<ClaimResult, CommandError> {
    let store = gateway.store.lock();
    let conversation = store.get_conversation(session_id).map_err(store_error)?;
    let mut runtime = conversation.runtime.clone();

    let result = match &runtime.controller {
        None => {
            runtime.controller = Some(controller);
            ClaimResult { action: ClaimAction::Claimed, controller: runtime.controller.clone() }
        }
        Some(existing) if existing.controller_id == controller.controller_id => {
            ClaimResult { action: ClaimAction::AlreadyOwned, controller: Some(existing.clone()) }
        }
        Some(_) if takeover => {
            runtime.controller = Some(controller);
            ClaimResult { action: ClaimAction::Claimed, controller: runtime.controller.clone() }
        }
        // Same rule as the live path: a non-takeover claim against a foreign
        // controller reports the standing ownership.
        Some(existing) => ClaimResult {
            action: ClaimAction::AlreadyOwned,
            controller: Some(existing.clone()),
        },
    };

    if result.action == ClaimAction::Claimed {
        store.update_runtime_snapshot(session_id, &runtime).map_err(store_error)?;
        drop(store);
        gateway.hub.publish(
            &gateway.scope,
            ObservedPayload::SessionStatus {
                session_id: session_id.clone(),
                status: runtime.status,
                attention_reason: runtime.attention_reason.clone(),
                live: runtime.live,
                controller: runtime.controller.clone(),
            },
        );
    }
    Ok(result)
}

fn release_persisted(
    gateway: &Gateway,
    session_id: &ThreadId,
    controller_id: &ControllerId,
) -> Result<bool, CommandError> {
    let store = gateway.store.lock();
    let conversation = store.get_conversation(session_id).map_err(store_error)?;
    let mut runtime = conversation.runtime.clone();
    match &runtime.controller {
        Some(existing) if existing.controller_id == *controller_id => {
            runtime.controller = None;
            store.update_runtime_snapshot(session_id, &runtime).map_err(store_error)?;
            drop(store);
            gateway.hub.publish(
                &gateway.scope,
                ObservedPayload::SessionStatus {
                    session_id: session_id.clone(),
                    status: runtime.status,
                    attention_reason: runtime.attention_reason.clone(),
                    live: runtime.live,
                    controller: None,
                },
            );
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Notify for a conversation with no live pty: record and publish, but the
/// status machine never runs (a dead session has nothing to transition).
fn notify_persisted(
    gateway: &Gateway,
    session_id: &ThreadId,
    record: serde_json::Value,
) -> Result<(), CommandError> {
    let conversation =
        gateway.store.lock().get_conversation(session_id).map_err(store_error)?;
    let mapping = map_notify(conversation.agent_type, &record);

    gateway.events.append(EventEnvelope {
        id: None,
        ts: SystemClock.now_rfc3339(),
        kind: EventKind::AgentNotify,
        scope: gateway.scope.clone(),
        worktree_id: Some(conversation.worktree_id.clone()),
        payload: json!({
            "sessionId": session_id,
            "eventName": mapping.event_name,
            "record": record,
        }),
    });
    gateway.hub.publish(
        &gateway.scope,
        ObservedPayload::SessionEvent {
            session_id: session_id.clone(),
            event_name: mapping.event_name,
            record,
        },
    );
    Ok(())
}
