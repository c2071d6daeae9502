// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use harness_core::{EventKind, Scope};
use serde_json::json;

fn envelope(n: usize) -> EventEnvelope {
    EventEnvelope {
        id: None,
        ts: format!("2026-01-01T00:00:{n:02}Z"),
        kind: EventKind::AgentNotify,
        scope: Scope::local("ws-test"),
        worktree_id: None,
        payload: json!({ "n": n }),
    }
}

#[test]
fn append_then_flush_persists_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("control-plane.sqlite");
    let log = EventLog::open(&path).unwrap();

    for n in 0..5 {
        log.append(envelope(n));
    }
    log.flush();

    let events = read_events(&path).unwrap();
    assert_eq!(events.len(), 5);
    for (n, event) in events.iter().enumerate() {
        assert_eq!(event.payload["n"], n);
        assert!(event.id.is_some());
    }
    // Insertion order means strictly increasing ids.
    let ids: Vec<i64> = events.iter().filter_map(|e| e.id).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn threshold_batch_flushes_without_explicit_flush() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("control-plane.sqlite");
    let log = EventLog::open(&path).unwrap();

    for n in 0..FLUSH_THRESHOLD {
        log.append(envelope(n));
    }

    // The size trigger fires on its own; poll briefly rather than flushing.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    loop {
        let count = read_events(&path).unwrap().len();
        if count >= FLUSH_THRESHOLD {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "batch never flushed ({count} rows)");
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
}

#[test]
fn delay_trigger_flushes_small_batches() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("control-plane.sqlite");
    let log = EventLog::open(&path).unwrap();

    log.append(envelope(0));
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
    loop {
        if read_events(&path).unwrap().len() == 1 {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "delay trigger never flushed");
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
}

#[test]
fn shutdown_drains_pending() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("control-plane.sqlite");
    let log = EventLog::open(&path).unwrap();
    log.append(envelope(0));
    log.append(envelope(1));
    log.shutdown();
    assert_eq!(read_events(&path).unwrap().len(), 2);
}

#[test]
fn scope_columns_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("control-plane.sqlite");
    let log = EventLog::open(&path).unwrap();

    let mut event = envelope(0);
    event.worktree_id = Some("wt-x".into());
    event.kind = EventKind::TerminalOutput;
    log.append(event);
    log.flush();

    let events = read_events(&path).unwrap();
    assert_eq!(events[0].kind, EventKind::TerminalOutput);
    assert_eq!(events[0].worktree_id.as_deref(), Some("wt-x"));
    assert_eq!(events[0].scope, Scope::local("ws-test"));
}
