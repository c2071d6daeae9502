// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Desktop notification for attention-required transitions.
//!
//! Posting runs on a blocking task and failures only log; a headless host
//! must never affect session state.

use tracing::debug;

/// True unless `HARNESS_NO_DESKTOP_NOTIFY` disables posting.
pub fn desktop_notify_enabled() -> bool {
    std::env::var("HARNESS_NO_DESKTOP_NOTIFY").map(|v| v.is_empty()).unwrap_or(true)
}

/// Post "session needs input" for a conversation.
pub fn post_attention(title: &str, reason: &str) {
    let summary = format!("harness: {title}");
    let body = reason.to_string();
    tokio::task::spawn_blocking(move || {
        let result = notify_rust::Notification::new()
            .summary(&summary)
            .body(&body)
            .appname("harness")
            .show();
        if let Err(err) = result {
            debug!(%err, "desktop notification failed");
        }
    });
}
