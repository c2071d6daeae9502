// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::record::RECORD_VERSION;
use std::path::PathBuf;

fn layout(config_root: &Path) -> WorkspaceLayout {
    WorkspaceLayout::new(config_root, Path::new("/home/dev/proj"), None).unwrap()
}

fn make_session(layout: &WorkspaceLayout, name: &str, pid: u32) -> PathBuf {
    let dir = layout.sessions_dir().join(name);
    std::fs::create_dir_all(&dir).unwrap();
    let record = GatewayRecord {
        version: RECORD_VERSION,
        pid,
        host: "127.0.0.1".into(),
        port: 4501,
        auth_token: None,
        state_db_path: dir.join("control-plane.sqlite"),
        started_at: "2026-01-01T00:00:00Z".into(),
        workspace_root: PathBuf::from("/home/dev/proj"),
    };
    record.write(&dir.join("gateway.json")).unwrap();
    std::fs::write(dir.join("gateway.log"), "log\n").unwrap();
    dir
}

#[test]
fn missing_sessions_dir_is_a_clean_noop() {
    let root = tempfile::tempdir().unwrap();
    let summary = gc_sessions(&layout(root.path()), GC_MAX_AGE).unwrap();
    assert_eq!(summary, GcSummary::default());
}

#[test]
fn aged_out_dead_session_is_removed() {
    let root = tempfile::tempdir().unwrap();
    let layout = layout(root.path());
    let dir = make_session(&layout, "old-dead", 4_000_000);

    // A zero retention window makes every dead session "older than" it.
    let summary = gc_sessions(&layout, Duration::ZERO).unwrap();
    assert_eq!(summary.removed, 1);
    assert_eq!(summary.skipped_live, 0);
    assert!(!dir.exists());
}

#[test]
fn recent_dead_session_is_kept_under_real_window() {
    let root = tempfile::tempdir().unwrap();
    let layout = layout(root.path());
    let dir = make_session(&layout, "recent-dead", 4_000_000);

    let summary = gc_sessions(&layout, GC_MAX_AGE).unwrap();
    assert_eq!(summary.removed, 0);
    assert!(dir.exists());
}

#[test]
fn live_session_is_skipped_with_a_counter() {
    let root = tempfile::tempdir().unwrap();
    let layout = layout(root.path());
    // Our own PID is alive no matter how old the files look.
    let dir = make_session(&layout, "live", std::process::id());

    let summary = gc_sessions(&layout, Duration::ZERO).unwrap();
    assert_eq!(summary.removed, 0);
    assert_eq!(summary.skipped_live, 1);
    assert!(dir.exists());
}

#[test]
fn fresh_artifact_within_window_keeps_the_subtree() {
    let root = tempfile::tempdir().unwrap();
    let layout = layout(root.path());
    let dir = make_session(&layout, "fresh", 4_000_000);
    // One artifact newer than a one-hour window.
    std::fs::write(dir.join("gateway.log"), "fresh line\n").unwrap();

    let summary = gc_sessions(&layout, Duration::from_secs(3600)).unwrap();
    assert_eq!(summary.removed, 0);
    assert!(dir.exists());
}

#[test]
fn plain_files_in_sessions_dir_are_ignored() {
    let root = tempfile::tempdir().unwrap();
    let layout = layout(root.path());
    std::fs::create_dir_all(layout.sessions_dir()).unwrap();
    std::fs::write(layout.sessions_dir().join("stray.txt"), "not a session").unwrap();

    let summary = gc_sessions(&layout, Duration::ZERO).unwrap();
    assert_eq!(summary, GcSummary::default());
    assert!(layout.sessions_dir().join("stray.txt").exists());
}
