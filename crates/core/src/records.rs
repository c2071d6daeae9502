// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable records of the gateway data model.
//!
//! All wire and file representations use camelCase field names; timestamps
//! are RFC-3339 strings. Archival is soft: records carry `archivedAt`
//! instead of being deleted.

use serde::{Deserialize, Serialize};

use crate::agent::AgentType;
use crate::id::{ControllerId, DirectoryId, RepositoryId, TaskId, ThreadId};
use crate::scope::Scope;
use crate::status::SessionStatus;

/// A registered working directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    pub directory_id: DirectoryId,
    /// Absolute, normalized path.
    pub path: String,
    #[serde(flatten)]
    pub scope: Scope,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
}

/// A known repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub repository_id: RepositoryId,
    #[serde(flatten)]
    pub scope: Scope,
    pub name: String,
    /// Normalized remote URL (trailing `.git` and slash stripped).
    pub remote_url: String,
    pub default_branch: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
}

/// Strip the noise git remotes accumulate so equal remotes compare equal.
pub fn normalize_remote_url(url: &str) -> String {
    let trimmed = url.trim();
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    trimmed.strip_suffix(".git").unwrap_or(trimmed).to_string()
}

/// The claimant currently allowed to drive a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Controller {
    pub controller_id: ControllerId,
    pub controller_type: ControllerType,
    pub controller_label: String,
    pub claimed_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerType {
    Human,
    Agent,
}

crate::simple_display! {
    ControllerType {
        Human => "human",
        Agent => "agent",
    }
}

/// Exit record of a PTY child.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
}

/// The mutable runtime snapshot embedded in a conversation record.
///
/// Adapter state and the last telemetry survive a live → exited transition
/// so the UI can still render the conversation's final shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSnapshot {
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_model: Option<String>,
    pub live: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attention_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_exit: Option<ExitStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<Controller>,
}

impl Default for RuntimeSnapshot {
    fn default() -> Self {
        Self {
            status: SessionStatus::Exited,
            status_model: None,
            live: false,
            attention_reason: None,
            process_id: None,
            last_event_at: None,
            last_exit: None,
            controller: None,
        }
    }
}

/// A conversation (session / thread) record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub thread_id: ThreadId,
    pub directory_id: DirectoryId,
    #[serde(flatten)]
    pub scope: Scope,
    pub worktree_id: String,
    pub title: String,
    pub agent_type: AgentType,
    /// Opaque agent-adapter state (resume tokens, model selection).
    #[serde(default)]
    pub adapter_state: serde_json::Value,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<String>,
    #[serde(flatten)]
    pub runtime: RuntimeSnapshot,
}

/// Task board status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Draft,
    Ready,
    Claimed,
    Completed,
}

crate::simple_display! {
    TaskStatus {
        Draft => "draft",
        Ready => "ready",
        Claimed => "claimed",
        Completed => "completed",
    }
}

impl TaskStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "ready" => Some(Self::Ready),
            "claimed" => Some(Self::Claimed),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskScopeKind {
    Repository,
    Project,
}

crate::simple_display! {
    TaskScopeKind {
        Repository => "repository",
        Project => "project",
    }
}

impl TaskScopeKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "repository" => Some(Self::Repository),
            "project" => Some(Self::Project),
            _ => None,
        }
    }
}

/// A task-board entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: TaskId,
    #[serde(flatten)]
    pub scope: Scope,
    pub scope_kind: TaskScopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<RepositoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub status: TaskStatus,
    pub order_index: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by_controller_id: Option<ControllerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by_project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[cfg(test)]
#[path = "records_tests.rs"]
mod tests;
