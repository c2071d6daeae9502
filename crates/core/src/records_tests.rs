// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

#[parameterized(
    plain = { "https://github.com/acme/widget", "https://github.com/acme/widget" },
    dot_git = { "https://github.com/acme/widget.git", "https://github.com/acme/widget" },
    trailing_slash = { "https://github.com/acme/widget/", "https://github.com/acme/widget" },
    ssh = { "git@github.com:acme/widget.git", "git@github.com:acme/widget" },
    padded = { "  https://github.com/acme/widget.git ", "https://github.com/acme/widget" },
)]
fn remote_url_normalization(input: &str, expected: &str) {
    assert_eq!(normalize_remote_url(input), expected);
}

#[test]
fn conversation_serializes_with_embedded_snapshot() {
    let conversation = Conversation {
        thread_id: ThreadId::from_string("thr-a"),
        directory_id: DirectoryId::from_string("dir-a"),
        scope: Scope::local("ws-1"),
        worktree_id: "wt-main".into(),
        title: "fix the build".into(),
        agent_type: AgentType::Claude,
        adapter_state: json!({ "resumeToken": "abc" }),
        created_at: "2026-01-01T00:00:00Z".into(),
        archived_at: None,
        runtime: RuntimeSnapshot {
            status: SessionStatus::Running,
            live: true,
            process_id: Some(4242),
            ..Default::default()
        },
    };

    let value = serde_json::to_value(&conversation).unwrap();
    assert_eq!(value["threadId"], "thr-a");
    assert_eq!(value["agentType"], "claude");
    assert_eq!(value["status"], "running");
    assert_eq!(value["live"], true);
    assert_eq!(value["processId"], 4242);
    assert_eq!(value["workspaceId"], "ws-1");

    let back: Conversation = serde_json::from_value(value).unwrap();
    assert_eq!(back, conversation);
}

#[test]
fn default_snapshot_is_exited_and_dead() {
    let snapshot = RuntimeSnapshot::default();
    assert_eq!(snapshot.status, SessionStatus::Exited);
    assert!(!snapshot.live);
    assert!(snapshot.controller.is_none());
}

#[test]
fn task_round_trips_with_claim_fields() {
    let task = Task {
        task_id: TaskId::from_string("tsk-a"),
        scope: Scope::local("ws-1"),
        scope_kind: TaskScopeKind::Repository,
        repository_id: Some(RepositoryId::from_string("rep-a")),
        project_id: None,
        title: "ship it".into(),
        body: "details".into(),
        status: TaskStatus::Claimed,
        order_index: 3,
        claimed_by_controller_id: Some(ControllerId::from_string("ctl-a")),
        claimed_by_project_id: None,
        branch_name: Some("task/ship-it".into()),
        base_branch: Some("main".into()),
        claimed_at: Some("2026-01-02T00:00:00Z".into()),
        completed_at: None,
        created_at: "2026-01-01T00:00:00Z".into(),
        updated_at: "2026-01-02T00:00:00Z".into(),
    };
    let json = serde_json::to_string(&task).unwrap();
    let back: Task = serde_json::from_str(&json).unwrap();
    assert_eq!(back, task);
}

#[test]
fn task_status_parse_round_trips() {
    for status in
        [TaskStatus::Draft, TaskStatus::Ready, TaskStatus::Claimed, TaskStatus::Completed]
    {
        assert_eq!(TaskStatus::parse(&status.to_string()), Some(status));
    }
    assert_eq!(TaskStatus::parse("unknown"), None);
}
