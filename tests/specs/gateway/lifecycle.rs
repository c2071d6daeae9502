// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway lifecycle specs: cold start, idempotence, stop, restart, gc.

use crate::specs::prelude::*;
use serial_test::serial;
use std::time::Duration;

#[test]
#[serial]
fn cold_start_writes_record_and_answers_rpc() {
    let ws = Workspace::new();

    let output = ws
        .harness()
        .args(["gateway", "start"])
        .timeout(Duration::from_secs(30))
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).into_owned();
    assert!(stdout.contains("gateway started"), "stdout: {stdout}");

    let record = ws.read_record();
    assert!(record["pid"].as_u64().unwrap() > 0);
    let port = record["port"].as_u64().unwrap();
    assert!((1..=65535).contains(&port));
    assert_eq!(record["version"], 1);
    assert!(record["stateDbPath"].as_str().unwrap().ends_with("control-plane.sqlite"));

    // One-shot RPC against the running gateway prints the JSON result.
    let output = ws
        .harness()
        .args(["gateway", "call", "--json", r#"{"type":"session.list"}"#])
        .timeout(Duration::from_secs(30))
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).into_owned();
    assert!(stdout.contains("\"sessions\":[]"), "stdout: {stdout}");
}

#[test]
#[serial]
fn start_is_idempotent_against_a_healthy_daemon() {
    let ws = Workspace::new();
    ws.harness().args(["gateway", "start"]).timeout(Duration::from_secs(30)).assert().success();
    let first = ws.read_record();

    let output = ws
        .harness()
        .args(["gateway", "start"])
        .timeout(Duration::from_secs(30))
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).into_owned();
    assert!(stdout.contains("already running"), "stdout: {stdout}");

    // No new process, no record rewrite.
    let second = ws.read_record();
    similar_asserts::assert_eq!(first, second);
}

#[test]
#[serial]
fn stop_terminates_the_daemon_and_reports_orphan_classes() {
    let ws = Workspace::new();
    ws.harness().args(["gateway", "start"]).timeout(Duration::from_secs(30)).assert().success();
    let pid = ws.read_record()["pid"].as_u64().unwrap() as u32;

    let output = ws
        .harness()
        .args(["gateway", "stop"])
        .timeout(Duration::from_secs(30))
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).into_owned();
    assert!(stdout.contains("gateway stopped"), "stdout: {stdout}");
    // A summary line per orphan class.
    for label in ["daemon", "sqlite", "pty helper", "notify relay"] {
        assert!(stdout.contains(&format!("orphan {label} cleanup:")), "stdout: {stdout}");
    }

    assert!(!ws.record_path().exists(), "record removed");
    assert!(
        wait_for(4_000, || !process_alive(pid)),
        "daemon pid {pid} still alive after stop"
    );
}

#[test]
#[serial]
fn stop_without_a_daemon_reports_not_running() {
    let ws = Workspace::new();
    let output = ws
        .harness()
        .args(["gateway", "stop", "--no-cleanup-orphans"])
        .timeout(Duration::from_secs(30))
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).into_owned();
    assert!(stdout.contains("gateway not running"), "stdout: {stdout}");
}

#[test]
#[serial]
fn restart_changes_pid_but_keeps_the_port() {
    let ws = Workspace::new();
    ws.harness().args(["gateway", "start"]).timeout(Duration::from_secs(30)).assert().success();
    let before = ws.read_record();

    ws.harness()
        .args(["gateway", "restart"])
        .timeout(Duration::from_secs(60))
        .assert()
        .success();
    let after = ws.read_record();

    assert_ne!(before["pid"], after["pid"]);
    assert_eq!(before["port"], after["port"], "restart reuses the recorded port");
}

#[test]
#[serial]
fn status_reports_running_and_not_running() {
    let ws = Workspace::new();
    let output = ws
        .harness()
        .args(["gateway", "status"])
        .timeout(Duration::from_secs(30))
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).into_owned();
    assert!(stdout.contains("gateway not running"), "stdout: {stdout}");

    ws.harness().args(["gateway", "start"]).timeout(Duration::from_secs(30)).assert().success();
    let output = ws
        .harness()
        .args(["gateway", "status"])
        .timeout(Duration::from_secs(30))
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).into_owned();
    assert!(stdout.contains("status: running"), "stdout: {stdout}");
    assert!(stdout.contains("sessions: 0 (0 live)"), "stdout: {stdout}");
}

#[test]
fn invalid_session_name_is_a_usage_error() {
    let ws = Workspace::new();
    let assert = ws
        .harness()
        .args(["--session", ".bad name", "gateway", "status"])
        .timeout(Duration::from_secs(30))
        .assert()
        .code(2);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("invalid session name"), "stderr: {stderr}");
}

#[test]
fn out_of_range_port_is_rejected_at_parse() {
    let ws = Workspace::new();
    ws.harness()
        .args(["gateway", "start", "--port", "0"])
        .timeout(Duration::from_secs(30))
        .assert()
        .code(2);
    ws.harness()
        .args(["gateway", "start", "--port", "65536"])
        .timeout(Duration::from_secs(30))
        .assert()
        .code(2);
}

#[test]
#[serial]
fn gc_reports_counts() {
    let ws = Workspace::new();
    let output =
        ws.harness().args(["gateway", "gc"]).timeout(Duration::from_secs(30)).assert().success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).into_owned();
    assert!(stdout.contains("gc: removed 0 session dir(s), skipped 0 live"), "stdout: {stdout}");
}

#[test]
fn gc_rejects_a_session_scope() {
    let ws = Workspace::new();
    let assert = ws
        .harness()
        .args(["--session", "pr-42", "gateway", "gc"])
        .timeout(Duration::from_secs(30))
        .assert()
        .code(2);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).into_owned();
    assert!(stderr.contains("not accepted"), "stderr: {stderr}");
}

#[test]
#[serial]
fn named_session_gets_its_own_gateway_dir() {
    let ws = Workspace::new();
    ws.harness()
        .args(["--session", "pr-42", "gateway", "start"])
        .timeout(Duration::from_secs(30))
        .assert()
        .success();

    let sessions_record = ws.gateway_dir().join("sessions/pr-42/gateway.json");
    assert!(sessions_record.exists(), "missing {sessions_record:?}");
    assert!(!ws.record_path().exists(), "default record untouched");

    ws.harness()
        .args(["--session", "pr-42", "gateway", "stop", "--force", "--no-cleanup-orphans"])
        .timeout(Duration::from_secs(30))
        .assert()
        .success();
}

fn process_alive(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}
