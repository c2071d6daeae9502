// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent types and the hook-notify mapper.
//!
//! Each agent family publishes hook events under its own vocabulary. The
//! mapper normalizes hook names (lowercase, strip non-alphanumerics) and
//! returns a `{event_name, status_hint, summary}` triple for the session
//! runtime. Payloads the table does not recognize map to an explicit
//! `<agent>.notify.unmapped` record carrying the payload keys so they can be
//! diagnosed from the event log.

use serde::{Deserialize, Serialize};

/// The agent CLI family driving a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Codex,
    Claude,
    Cursor,
    Critique,
}

crate::simple_display! {
    AgentType {
        Codex => "codex",
        Claude => "claude",
        Cursor => "cursor",
        Critique => "critique",
    }
}

impl AgentType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "codex" => Some(Self::Codex),
            "claude" => Some(Self::Claude),
            "cursor" => Some(Self::Cursor),
            "critique" => Some(Self::Critique),
            _ => None,
        }
    }

    /// Default launch command for `pty.start` when the client does not
    /// override it.
    pub fn default_command(&self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Claude => "claude",
            Self::Cursor => "cursor-agent",
            Self::Critique => "critique",
        }
    }
}

/// Status direction suggested by a hook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusHint {
    Running,
    NeedsInput,
    Completed,
}

/// Result of mapping one notify record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyMapping {
    /// Normalized event name, e.g. `claude.stop` or `codex.notify.unmapped`.
    pub event_name: String,
    pub status_hint: Option<StatusHint>,
    /// Human-readable detail; used as the attention reason for
    /// `needs-input` hints.
    pub summary: Option<String>,
}

/// Lowercase and strip non-alphanumerics: `agent-turn-complete` →
/// `agentturncomplete`, `Notification` → `notification`.
pub fn normalize_hook_name(name: &str) -> String {
    name.chars().filter(char::is_ascii_alphanumeric).map(|c| c.to_ascii_lowercase()).collect()
}

/// Map a notify record from a hook relay to its session-runtime meaning.
///
/// `record` is the raw hook payload; the hook name is read from its
/// `hook_event_name` field.
pub fn map_notify(agent: AgentType, record: &serde_json::Value) -> NotifyMapping {
    let raw_name = record.get("hook_event_name").and_then(|v| v.as_str()).unwrap_or("");
    let name = normalize_hook_name(raw_name);

    let mapped = match agent {
        AgentType::Codex => map_codex(&name),
        AgentType::Claude => map_claude(&name, record),
        AgentType::Cursor => map_cursor(&name, record),
        AgentType::Critique => None,
    };

    match mapped {
        Some((event, status_hint, summary)) => NotifyMapping {
            event_name: format!("{agent}.{event}"),
            status_hint,
            summary,
        },
        None => unmapped(agent, record),
    }
}

type Mapped = (&'static str, Option<StatusHint>, Option<String>);

fn map_codex(name: &str) -> Option<Mapped> {
    match name {
        "agentturncomplete" => Some(("turn-complete", Some(StatusHint::Completed), None)),
        // Other codex notifies are real events with no status meaning.
        "" => None,
        _ => Some(("notify", None, None)),
    }
}

fn map_claude(name: &str, record: &serde_json::Value) -> Option<Mapped> {
    match name {
        "userpromptsubmit" => Some(("user-prompt-submit", Some(StatusHint::Running), None)),
        "pretooluse" => Some(("pre-tool-use", Some(StatusHint::Running), None)),
        "stop" => Some(("stop", Some(StatusHint::Completed), None)),
        "subagentstop" => Some(("subagent-stop", Some(StatusHint::Completed), None)),
        "sessionend" => Some(("session-end", Some(StatusHint::Completed), None)),
        "notification" => {
            let raw = record.get("notification_type").and_then(|v| v.as_str()).unwrap_or("");
            let token = normalize_hook_name(raw);
            match token.as_str() {
                "permissionapproved" | "permissiongranted" | "approvalapproved"
                | "approvalgranted" => {
                    Some(("notification", Some(StatusHint::Running), Some(raw.to_string())))
                }
                "permissionrequest" | "approvalrequest" | "approvalrequired"
                | "inputrequired" => {
                    Some(("notification", Some(StatusHint::NeedsInput), Some(raw.to_string())))
                }
                _ => Some(("notification", None, None)),
            }
        }
        _ => None,
    }
}

fn map_cursor(name: &str, record: &serde_json::Value) -> Option<Mapped> {
    let final_status = record
        .get("final_status")
        .and_then(|v| v.as_str())
        .map(normalize_hook_name)
        .unwrap_or_default();
    let has_tool = record.get("tool").is_some() || record.get("tool_name").is_some();

    if name == "beforesubmitprompt" {
        return Some(("before-submit-prompt", Some(StatusHint::Running), None));
    }
    if name.starts_with("before")
        && (name.contains("shell") || name.contains("mcp") || name.contains("tool"))
    {
        return Some(("before-tool", Some(StatusHint::Running), None));
    }
    if name == "stop"
        || name == "sessionend"
        || name.contains("abort")
        || matches!(final_status.as_str(), "aborted" | "cancelled" | "completed")
    {
        return Some(("stop", Some(StatusHint::Completed), None));
    }
    if name.starts_with("after") && has_tool {
        return Some(("after-tool", None, Some("tool finished (hook)".to_string())));
    }
    None
}

fn unmapped(agent: AgentType, record: &serde_json::Value) -> NotifyMapping {
    let keys = match record.as_object() {
        Some(map) => {
            let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
            keys.sort_unstable();
            keys.join(",")
        }
        None => String::new(),
    };
    NotifyMapping {
        event_name: format!("{agent}.notify.unmapped"),
        status_hint: None,
        summary: if keys.is_empty() { None } else { Some(keys) },
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
