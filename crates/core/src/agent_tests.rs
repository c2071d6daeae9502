// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

#[test]
fn normalize_strips_punctuation_and_case() {
    assert_eq!(normalize_hook_name("agent-turn-complete"), "agentturncomplete");
    assert_eq!(normalize_hook_name("Notification"), "notification");
    assert_eq!(normalize_hook_name("Pre_Tool.Use"), "pretooluse");
}

#[test]
fn codex_turn_complete_maps_to_completed() {
    let mapping =
        map_notify(AgentType::Codex, &json!({ "hook_event_name": "agent-turn-complete" }));
    assert_eq!(mapping.event_name, "codex.turn-complete");
    assert_eq!(mapping.status_hint, Some(StatusHint::Completed));
}

#[test]
fn codex_other_notify_has_no_hint() {
    let mapping = map_notify(AgentType::Codex, &json!({ "hook_event_name": "something-else" }));
    assert_eq!(mapping.event_name, "codex.notify");
    assert_eq!(mapping.status_hint, None);
}

#[parameterized(
    user_prompt_submit = { "UserPromptSubmit", StatusHint::Running },
    pre_tool_use = { "PreToolUse", StatusHint::Running },
    stop = { "Stop", StatusHint::Completed },
    subagent_stop = { "SubagentStop", StatusHint::Completed },
    session_end = { "SessionEnd", StatusHint::Completed },
)]
fn claude_lifecycle_hooks(raw: &str, expected: StatusHint) {
    let mapping = map_notify(AgentType::Claude, &json!({ "hook_event_name": raw }));
    assert_eq!(mapping.status_hint, Some(expected));
}

#[parameterized(
    permission_request = { "permissionRequest", StatusHint::NeedsInput },
    approval_request = { "approval_request", StatusHint::NeedsInput },
    approval_required = { "approvalRequired", StatusHint::NeedsInput },
    input_required = { "inputRequired", StatusHint::NeedsInput },
    permission_approved = { "permissionApproved", StatusHint::Running },
    permission_granted = { "permission_granted", StatusHint::Running },
    approval_approved = { "approvalApproved", StatusHint::Running },
    approval_granted = { "approvalGranted", StatusHint::Running },
)]
fn claude_notification_tokens(token: &str, expected: StatusHint) {
    let mapping = map_notify(
        AgentType::Claude,
        &json!({ "hook_event_name": "Notification", "notification_type": token }),
    );
    assert_eq!(mapping.status_hint, Some(expected));
    // The raw token becomes the summary so it can surface as the attention reason.
    assert_eq!(mapping.summary.as_deref(), Some(token));
}

#[test]
fn claude_unknown_notification_has_no_hint() {
    let mapping = map_notify(
        AgentType::Claude,
        &json!({ "hook_event_name": "Notification", "notification_type": "idleReminder" }),
    );
    assert_eq!(mapping.event_name, "claude.notification");
    assert_eq!(mapping.status_hint, None);
}

#[test]
fn cursor_before_submit_prompt_runs() {
    let mapping = map_notify(AgentType::Cursor, &json!({ "hook_event_name": "beforeSubmitPrompt" }));
    assert_eq!(mapping.status_hint, Some(StatusHint::Running));
}

#[parameterized(
    shell = { "beforeShellExecution" },
    mcp = { "beforeMcpExecution" },
    tool = { "beforeToolCall" },
)]
fn cursor_before_tool_variants_run(raw: &str) {
    let mapping = map_notify(AgentType::Cursor, &json!({ "hook_event_name": raw }));
    assert_eq!(mapping.status_hint, Some(StatusHint::Running));
}

#[parameterized(
    stop = { json!({ "hook_event_name": "stop" }) },
    session_end = { json!({ "hook_event_name": "sessionEnd" }) },
    abort = { json!({ "hook_event_name": "turnAborted" }) },
    final_aborted = { json!({ "hook_event_name": "turnEnd", "final_status": "aborted" }) },
    final_cancelled = { json!({ "hook_event_name": "turnEnd", "final_status": "cancelled" }) },
    final_completed = { json!({ "hook_event_name": "turnEnd", "final_status": "completed" }) },
)]
fn cursor_terminal_hooks_complete(record: serde_json::Value) {
    let mapping = map_notify(AgentType::Cursor, &record);
    assert_eq!(mapping.status_hint, Some(StatusHint::Completed));
}

#[test]
fn cursor_after_tool_summarizes_without_hint() {
    let mapping = map_notify(
        AgentType::Cursor,
        &json!({ "hook_event_name": "afterShellExecution", "tool": "Shell" }),
    );
    assert_eq!(mapping.status_hint, None);
    assert_eq!(mapping.summary.as_deref(), Some("tool finished (hook)"));
}

#[test]
fn unmapped_payload_joins_keys_for_diagnosis() {
    let mapping = map_notify(
        AgentType::Claude,
        &json!({ "hook_event_name": "somethingNew", "zed": 1, "alpha": 2 }),
    );
    assert_eq!(mapping.event_name, "claude.notify.unmapped");
    assert_eq!(mapping.status_hint, None);
    assert_eq!(mapping.summary.as_deref(), Some("alpha,hook_event_name,zed"));
}

#[test]
fn critique_always_unmapped() {
    let mapping = map_notify(AgentType::Critique, &json!({ "hook_event_name": "stop" }));
    assert_eq!(mapping.event_name, "critique.notify.unmapped");
    assert_eq!(mapping.status_hint, None);
}

#[test]
fn agent_type_round_trips() {
    for agent in [AgentType::Codex, AgentType::Claude, AgentType::Cursor, AgentType::Critique] {
        assert_eq!(AgentType::parse(&agent.to_string()), Some(agent));
    }
    assert_eq!(AgentType::parse("vim"), None);
}
