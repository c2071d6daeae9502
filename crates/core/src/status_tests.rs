// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn hint(h: StatusHint, summary: Option<&str>) -> StatusInput {
    StatusInput::Hint { hint: h, summary: summary.map(str::to_owned) }
}

#[parameterized(
    running = { SessionStatus::Running },
    needs_input = { SessionStatus::NeedsInput },
    completed = { SessionStatus::Completed },
)]
fn pty_exit_from_any_live_state(from: SessionStatus) {
    let change = transition(from, None, &StatusInput::PtyExit).unwrap();
    assert_eq!(change.status, SessionStatus::Exited);
    assert_eq!(change.attention_reason, None);
}

#[test]
fn exited_is_terminal() {
    for input in [
        StatusInput::PtyExit,
        StatusInput::PtyOutput,
        StatusInput::ControllerInput,
        StatusInput::Respond,
        hint(StatusHint::Running, None),
        hint(StatusHint::NeedsInput, None),
        hint(StatusHint::Completed, None),
    ] {
        assert_eq!(transition(SessionStatus::Exited, None, &input), None);
    }
}

#[test]
fn needs_input_hint_sets_attention_from_summary() {
    let change = transition(
        SessionStatus::Running,
        None,
        &hint(StatusHint::NeedsInput, Some("permissionRequest")),
    )
    .unwrap();
    assert_eq!(change.status, SessionStatus::NeedsInput);
    assert_eq!(change.attention_reason.as_deref(), Some("permissionRequest"));
}

#[test]
fn needs_input_hint_keeps_existing_attention() {
    let change =
        transition(SessionStatus::Running, Some("earlier"), &hint(StatusHint::NeedsInput, None))
            .unwrap();
    assert_eq!(change.attention_reason.as_deref(), Some("earlier"));
}

#[test]
fn needs_input_hint_falls_back_to_default_reason() {
    let change =
        transition(SessionStatus::Running, None, &hint(StatusHint::NeedsInput, None)).unwrap();
    assert_eq!(change.attention_reason.as_deref(), Some("input required"));
}

#[test]
fn needs_input_hint_ignored_outside_running() {
    assert_eq!(
        transition(SessionStatus::Completed, None, &hint(StatusHint::NeedsInput, None)),
        None
    );
}

#[test]
fn controller_input_clears_needs_input() {
    let change =
        transition(SessionStatus::NeedsInput, Some("reason"), &StatusInput::ControllerInput)
            .unwrap();
    assert_eq!(change.status, SessionStatus::Running);
    assert_eq!(change.attention_reason, None);
}

#[test]
fn controller_input_is_noop_while_running() {
    assert_eq!(transition(SessionStatus::Running, None, &StatusInput::ControllerInput), None);
}

#[parameterized(
    from_running = { SessionStatus::Running },
    from_needs_input = { SessionStatus::NeedsInput },
)]
fn completed_hint(from: SessionStatus) {
    let change = transition(from, Some("reason"), &hint(StatusHint::Completed, None)).unwrap();
    assert_eq!(change.status, SessionStatus::Completed);
    assert_eq!(change.attention_reason, None);
}

#[test]
fn output_revives_completed_session() {
    let change = transition(SessionStatus::Completed, None, &StatusInput::PtyOutput).unwrap();
    assert_eq!(change.status, SessionStatus::Running);
}

#[test]
fn output_is_noop_while_running() {
    assert_eq!(transition(SessionStatus::Running, None, &StatusInput::PtyOutput), None);
}

#[test]
fn respond_forces_running() {
    let change = transition(SessionStatus::Completed, None, &StatusInput::Respond).unwrap();
    assert_eq!(change.status, SessionStatus::Running);
}

#[test]
fn status_round_trips_serde() {
    for status in [
        SessionStatus::Running,
        SessionStatus::NeedsInput,
        SessionStatus::Completed,
        SessionStatus::Exited,
    ] {
        let json = serde_json::to_string(&status).unwrap();
        let back: SessionStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
        assert_eq!(SessionStatus::parse(&status.to_string()), Some(status));
    }
    assert_eq!(serde_json::to_string(&SessionStatus::NeedsInput).unwrap(), "\"needs-input\"");
}
