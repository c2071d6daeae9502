// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC-style commands carried inside a `command` envelope.
//!
//! Every command receives `command.accepted` immediately on dispatch and
//! exactly one terminal `command.completed` / `command.failed` afterwards.
//! Unknown `type` values fail envelope parsing and are dropped by the
//! decoder; the server answers commands it accepted but cannot satisfy with
//! `command.failed`.

use serde::{Deserialize, Serialize};

use harness_core::{
    AgentType, Controller, ControllerId, Conversation, DirectoryId, RepositoryId, TaskId,
    TaskScopeKind, TaskStatus, ThreadId,
};

/// A control-plane command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "session.list", rename_all = "camelCase")]
    SessionList {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },

    #[serde(rename = "session.status", rename_all = "camelCase")]
    SessionStatus { session_id: ThreadId },

    /// Current tail of the session's terminal backlog.
    #[serde(rename = "session.snapshot", rename_all = "camelCase")]
    SessionSnapshot { session_id: ThreadId },

    /// Forward a line of input and force the status machine to `running`.
    #[serde(rename = "session.respond", rename_all = "camelCase")]
    SessionRespond { session_id: ThreadId, text: String },

    #[serde(rename = "session.interrupt", rename_all = "camelCase")]
    SessionInterrupt { session_id: ThreadId },

    #[serde(rename = "session.remove", rename_all = "camelCase")]
    SessionRemove { session_id: ThreadId },

    #[serde(rename = "session.claim", rename_all = "camelCase")]
    SessionClaim {
        session_id: ThreadId,
        controller_id: ControllerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        controller_type: Option<harness_core::ControllerType>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        controller_label: Option<String>,
        #[serde(default)]
        takeover: bool,
    },

    #[serde(rename = "session.release", rename_all = "camelCase")]
    SessionRelease { session_id: ThreadId, controller_id: ControllerId },

    /// Hook-relay ingestion: a raw notify record for the agent mapper.
    #[serde(rename = "session.notify", rename_all = "camelCase")]
    SessionNotify { session_id: ThreadId, record: serde_json::Value },

    #[serde(rename = "pty.start", rename_all = "camelCase")]
    PtyStart {
        session_id: ThreadId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cols: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rows: Option<u16>,
    },

    #[serde(rename = "pty.attach", rename_all = "camelCase")]
    PtyAttach {
        session_id: ThreadId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        since_cursor: Option<u64>,
    },

    #[serde(rename = "pty.detach", rename_all = "camelCase")]
    PtyDetach { session_id: ThreadId },

    #[serde(rename = "pty.subscribe-events", rename_all = "camelCase")]
    PtySubscribeEvents { session_id: ThreadId },

    #[serde(rename = "pty.unsubscribe-events", rename_all = "camelCase")]
    PtyUnsubscribeEvents { session_id: ThreadId },

    #[serde(rename = "pty.close", rename_all = "camelCase")]
    PtyClose { session_id: ThreadId },

    #[serde(rename = "attention.list")]
    AttentionList,

    #[serde(rename = "directory.upsert", rename_all = "camelCase")]
    DirectoryUpsert { path: String },

    #[serde(rename = "directory.list")]
    DirectoryList,

    #[serde(rename = "directory.archive", rename_all = "camelCase")]
    DirectoryArchive { directory_id: DirectoryId },

    #[serde(rename = "repository.upsert", rename_all = "camelCase")]
    RepositoryUpsert {
        name: String,
        remote_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_branch: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
    },

    #[serde(rename = "repository.list")]
    RepositoryList,

    #[serde(rename = "repository.update", rename_all = "camelCase")]
    RepositoryUpdate {
        repository_id: RepositoryId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default_branch: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
    },

    #[serde(rename = "repository.archive", rename_all = "camelCase")]
    RepositoryArchive { repository_id: RepositoryId },

    #[serde(rename = "task.create", rename_all = "camelCase")]
    TaskCreate {
        scope_kind: TaskScopeKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        repository_id: Option<RepositoryId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_id: Option<String>,
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },

    #[serde(rename = "task.update", rename_all = "camelCase")]
    TaskUpdate {
        task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },

    #[serde(rename = "task.delete", rename_all = "camelCase")]
    TaskDelete { task_id: TaskId },

    #[serde(rename = "task.list", rename_all = "camelCase")]
    TaskList {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<TaskStatus>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        repository_id: Option<RepositoryId>,
    },

    #[serde(rename = "task.reorder", rename_all = "camelCase")]
    TaskReorder { task_ids: Vec<TaskId> },

    #[serde(rename = "task.ready", rename_all = "camelCase")]
    TaskReady { task_id: TaskId },

    #[serde(rename = "task.draft", rename_all = "camelCase")]
    TaskDraft { task_id: TaskId },

    #[serde(rename = "task.complete", rename_all = "camelCase")]
    TaskComplete { task_id: TaskId },

    #[serde(rename = "task.claim", rename_all = "camelCase")]
    TaskClaim {
        task_id: TaskId,
        controller_id: ControllerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_branch: Option<String>,
    },

    /// Claim the next ready task in order.
    #[serde(rename = "task.pull", rename_all = "camelCase")]
    TaskPull {
        controller_id: ControllerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        repository_id: Option<RepositoryId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_id: Option<String>,
    },

    #[serde(rename = "conversation.create", rename_all = "camelCase")]
    ConversationCreate {
        directory_id: DirectoryId,
        title: String,
        agent_type: AgentType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        worktree_id: Option<String>,
    },

    #[serde(rename = "conversation.update-title", rename_all = "camelCase")]
    ConversationUpdateTitle { session_id: ThreadId, title: String },

    #[serde(rename = "conversation.list", rename_all = "camelCase")]
    ConversationList {
        #[serde(default)]
        include_archived: bool,
    },

    #[serde(rename = "conversation.archive", rename_all = "camelCase")]
    ConversationArchive { session_id: ThreadId },

    #[serde(rename = "stream.subscribe", rename_all = "camelCase")]
    StreamSubscribe {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after_cursor: Option<u64>,
    },

    #[serde(rename = "stream.unsubscribe")]
    StreamUnsubscribe,

    #[serde(rename = "key-events.subscribe", rename_all = "camelCase")]
    KeyEventsSubscribe {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        after_cursor: Option<u64>,
    },

    #[serde(rename = "key-events.unsubscribe")]
    KeyEventsUnsubscribe,
}

/// Result payload for `session.list` / `conversation.list` / `attention.list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionListResult {
    pub sessions: Vec<Conversation>,
}

/// Result payload for `session.snapshot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResult {
    pub cursor: u64,
    pub chunk_base64: String,
}

/// Outcome of a `session.claim`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClaimAction {
    Claimed,
    /// The session already has a controller; the result carries it. Returned
    /// both for a same-controller reclaim and for a non-takeover claim
    /// against a foreign controller.
    AlreadyOwned,
    /// A takeover attempt the server refused. Kept as protocol surface for
    /// clients even though the current runtime honors every takeover.
    TakeoverDeclined,
}

harness_core::simple_display! {
    ClaimAction {
        Claimed => "claimed",
        AlreadyOwned => "already-owned",
        TakeoverDeclined => "takeover-declined",
    }
}

/// Result payload for `session.claim` / `session.release`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResult {
    pub action: ClaimAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<Controller>,
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
