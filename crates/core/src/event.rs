// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event taxonomy.
//!
//! Two distinct event families flow through the gateway:
//!
//! - [`EventEnvelope`] — normalized records appended to the persistent event
//!   store (insertion-ordered, batched writes).
//! - [`ObservedEvent`] — ephemeral hub events with a process-wide monotonic
//!   cursor, fanned out to stream subscribers. Observed events never persist
//!   and their cursors reset on daemon restart.

use serde::{Deserialize, Serialize};

use crate::id::{DirectoryId, RepositoryId, TaskId, ThreadId};
use crate::records::{Controller, Task};
use crate::scope::Scope;
use crate::status::SessionStatus;

/// Kind of a persisted event envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "terminal.output")]
    TerminalOutput,
    #[serde(rename = "agent.notify")]
    AgentNotify,
    #[serde(rename = "agent.session-exit")]
    AgentSessionExit,
    #[serde(rename = "session.status")]
    SessionStatus,
    #[serde(rename = "session.start")]
    SessionStart,
}

crate::simple_display! {
    EventKind {
        TerminalOutput => "terminal.output",
        AgentNotify => "agent.notify",
        AgentSessionExit => "agent.session-exit",
        SessionStatus => "session.status",
        SessionStart => "session.start",
    }
}

/// A normalized record bound for the persistent event store.
///
/// `id` is assigned by the store on insert; envelopes are insertion-ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub ts: String,
    pub kind: EventKind,
    #[serde(flatten)]
    pub scope: Scope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_id: Option<String>,
    pub payload: serde_json::Value,
}

/// An event published on the observed hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedEvent {
    /// Process-wide monotonic cursor; does not persist across restarts.
    pub cursor: u64,
    pub scope: Scope,
    #[serde(flatten)]
    pub payload: ObservedPayload,
}

/// Typed payload of an observed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ObservedPayload {
    #[serde(rename_all = "camelCase")]
    SessionStatus {
        session_id: ThreadId,
        status: SessionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attention_reason: Option<String>,
        live: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        controller: Option<Controller>,
    },
    #[serde(rename_all = "camelCase")]
    SessionEvent {
        session_id: ThreadId,
        event_name: String,
        record: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    SessionKeyEvent {
        session_id: ThreadId,
        event_name: String,
        record: serde_json::Value,
    },
    #[serde(rename_all = "camelCase")]
    SessionPrompt {
        session_id: ThreadId,
        prompt: String,
    },
    #[serde(rename_all = "camelCase")]
    TaskCreated { task: Box<Task> },
    #[serde(rename_all = "camelCase")]
    TaskUpdated { task: Box<Task> },
    #[serde(rename_all = "camelCase")]
    TaskDeleted { task_id: TaskId },
    #[serde(rename_all = "camelCase")]
    TaskReordered { task_ids: Vec<TaskId> },
    #[serde(rename_all = "camelCase")]
    RepositoryUpserted { repository: Box<crate::records::Repository> },
    #[serde(rename_all = "camelCase")]
    RepositoryUpdated { repository: Box<crate::records::Repository> },
    #[serde(rename_all = "camelCase")]
    RepositoryArchived { repository_id: RepositoryId },
    #[serde(rename_all = "camelCase")]
    DirectoryGitUpdated {
        directory_id: DirectoryId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
    },
}

impl ObservedPayload {
    /// True for the payloads a `key-events.subscribe` subscription delivers.
    pub fn is_key_event(&self) -> bool {
        matches!(self, Self::SessionKeyEvent { .. } | Self::SessionPrompt { .. })
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
