// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gateway call` and orphan-reap specs.

use crate::specs::prelude::*;
use serial_test::serial;
use std::time::Duration;

#[test]
#[serial]
fn call_without_a_gateway_fails_cleanly() {
    let ws = Workspace::new();
    let assert = ws
        .harness()
        .args(["gateway", "call", "--json", r#"{"type":"session.list"}"#])
        .timeout(Duration::from_secs(30))
        .assert()
        .code(1);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("not running"), "stderr: {stderr}");
}

#[test]
fn call_with_malformed_json_is_a_usage_error() {
    let ws = Workspace::new();
    ws.harness()
        .args(["gateway", "call", "--json", "{nope"])
        .timeout(Duration::from_secs(30))
        .assert()
        .code(2);
}

#[test]
#[serial]
fn call_round_trips_directory_commands() {
    let ws = Workspace::new();
    ws.harness().args(["gateway", "start"]).timeout(Duration::from_secs(30)).assert().success();

    let upsert = format!(
        r#"{{"type":"directory.upsert","path":"{}"}}"#,
        ws.path().display()
    );
    let output = ws
        .harness()
        .args(["gateway", "call", "--json", &upsert])
        .timeout(Duration::from_secs(30))
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).into_owned();
    let value: serde_json::Value = serde_json::from_str(stdout.trim()).expect("json result");
    let directory_id = value["directory"]["directoryId"].as_str().expect("directoryId");
    assert!(directory_id.starts_with("dir-"));

    let output = ws
        .harness()
        .args(["gateway", "call", "--json", r#"{"type":"directory.list"}"#])
        .timeout(Duration::from_secs(30))
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).into_owned();
    assert!(stdout.contains(directory_id), "stdout: {stdout}");
}

/// A detached fake `sqlite3` chewing on the workspace database is reaped by
/// `gateway stop`.
#[test]
#[serial]
fn stop_reaps_an_orphaned_sqlite_helper() {
    let ws = Workspace::new();
    ws.harness().args(["gateway", "start"]).timeout(Duration::from_secs(30)).assert().success();
    let db_path = ws.read_record()["stateDbPath"].as_str().unwrap().to_string();

    // A stand-in sqlite3: matching is by command signature, not binary
    // identity, so a sleeping script with the right argv works everywhere.
    let bin = tempfile::tempdir().unwrap();
    let fake_sqlite = bin.path().join("sqlite3");
    std::fs::write(&fake_sqlite, "#!/bin/sh\nsleep 300\n").unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&fake_sqlite, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    let status = std::process::Command::new("/bin/sh")
        .arg("-c")
        .arg(format!(
            "'{}' '{}' 'select count(*) from events;' >/dev/null 2>&1 & exit 0",
            fake_sqlite.display(),
            db_path,
        ))
        .status()
        .unwrap();
    assert!(status.success());

    // Find the orphan and confirm it reparented to init; otherwise this
    // environment uses a subreaper and the scan cannot see it as an orphan.
    let found = wait_for(2_000, || {
        harness_cli::orphans::scan_process_table()
            .iter()
            .any(|entry| entry.argv.iter().any(|arg| arg.contains(&db_path)))
    });
    assert!(found, "fake sqlite3 never appeared in the process table");
    let orphaned = harness_cli::orphans::scan_process_table()
        .iter()
        .any(|entry| entry.ppid == 1 && entry.argv.iter().any(|arg| arg.contains(&db_path)));

    let output = ws
        .harness()
        .args(["gateway", "stop"])
        .timeout(Duration::from_secs(60))
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).into_owned();
    assert!(stdout.contains("gateway stopped"), "stdout: {stdout}");

    if orphaned {
        assert!(
            stdout.contains("orphan sqlite cleanup: terminated 1 process(es)"),
            "stdout: {stdout}"
        );
        // The orphan is gone shortly after.
        assert!(wait_for(4_000, || {
            !harness_cli::orphans::scan_process_table()
                .iter()
                .any(|entry| entry.argv.iter().any(|arg| arg.contains(&db_path)))
        }));
    } else {
        // Subreaper environment: the class still reports, just empty.
        assert!(stdout.contains("orphan sqlite cleanup:"), "stdout: {stdout}");
        // Clean up the stand-in ourselves.
        let _ = std::process::Command::new("pkill")
            .args(["-f", &db_path])
            .status();
    }
}
