// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session status machine.
//!
//! The session runtime derives a conversation's status from PTY and hook
//! signals. The transition table lives here as a pure function so the actor
//! stays a thin driver and the table is testable in isolation.

use serde::{Deserialize, Serialize};

use crate::agent::StatusHint;

/// Derived status of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Running,
    NeedsInput,
    Completed,
    Exited,
}

crate::simple_display! {
    SessionStatus {
        Running => "running",
        NeedsInput => "needs-input",
        Completed => "completed",
        Exited => "exited",
    }
}

impl SessionStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "needs-input" => Some(Self::NeedsInput),
            "completed" => Some(Self::Completed),
            "exited" => Some(Self::Exited),
            _ => None,
        }
    }
}

/// An input to the status machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusInput {
    /// The PTY child exited.
    PtyExit,
    /// Any PTY output chunk.
    PtyOutput,
    /// Input bytes from the current controller.
    ControllerInput,
    /// An explicit `session.respond` command.
    Respond,
    /// A notify hook event mapped to a status hint, with an optional summary
    /// used as the attention reason.
    Hint { hint: StatusHint, summary: Option<String> },
}

/// Result of applying an input: the new status and the attention reason to
/// store alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub status: SessionStatus,
    pub attention_reason: Option<String>,
}

/// Apply one input to the machine.
///
/// Returns `None` when the input does not change the status. `Exited` is
/// terminal: nothing transitions out of it. A notify event without a hint
/// never reaches this function.
pub fn transition(
    current: SessionStatus,
    current_attention: Option<&str>,
    input: &StatusInput,
) -> Option<StatusChange> {
    use SessionStatus::*;

    if current == Exited {
        return None;
    }

    match input {
        StatusInput::PtyExit => {
            Some(StatusChange { status: Exited, attention_reason: None })
        }
        StatusInput::PtyOutput => match current {
            Completed => Some(StatusChange {
                status: Running,
                attention_reason: current_attention.map(str::to_owned),
            }),
            _ => None,
        },
        StatusInput::ControllerInput => match current {
            NeedsInput => Some(StatusChange { status: Running, attention_reason: None }),
            _ => None,
        },
        StatusInput::Respond => match current {
            Running => None,
            _ => Some(StatusChange { status: Running, attention_reason: None }),
        },
        StatusInput::Hint { hint, summary } => match hint {
            StatusHint::Running => match current {
                Running => None,
                _ => Some(StatusChange { status: Running, attention_reason: None }),
            },
            StatusHint::NeedsInput => match current {
                Running => Some(StatusChange {
                    status: NeedsInput,
                    attention_reason: Some(
                        summary
                            .clone()
                            .or_else(|| current_attention.map(str::to_owned))
                            .unwrap_or_else(|| "input required".to_string()),
                    ),
                }),
                _ => None,
            },
            StatusHint::Completed => match current {
                Running | NeedsInput => {
                    Some(StatusChange { status: Completed, attention_reason: None })
                }
                _ => None,
            },
        },
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
