// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn config(dir: &std::path::Path, port: u16) -> RuntimeConfig {
    RuntimeConfig {
        host: "127.0.0.1".into(),
        port,
        auth_token: None,
        state_db_path: dir.join("control-plane.sqlite"),
        workspace_root: dir.to_path_buf(),
        workspace_id: "ws-test".into(),
        tail_backlog_bytes: 4096,
        close_live_sessions_on_client_stop: false,
    }
}

async fn free_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn startup_binds_and_opens_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let port = free_port().await;
    let result = startup(config(dir.path(), port)).await.unwrap();

    assert_eq!(result.listener.local_addr().unwrap().port(), port);
    assert!(dir.path().join("control-plane.sqlite").exists());
    assert_eq!(result.gateway.sessions.live_count(), 0);
}

#[tokio::test]
async fn second_gateway_on_same_db_fails_lock() {
    let dir = tempfile::tempdir().unwrap();
    let first = startup(config(dir.path(), free_port().await)).await.unwrap();

    let err = startup(config(dir.path(), free_port().await)).await.unwrap_err();
    assert!(matches!(err, LifecycleError::LockFailed(_)));
    drop(first);
}

#[tokio::test]
async fn bind_conflict_is_reported() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let port = free_port().await;
    let first = startup(config(dir_a.path(), port)).await.unwrap();

    let err = startup(config(dir_b.path(), port)).await.unwrap_err();
    assert!(matches!(err, LifecycleError::BindFailed { .. }));
    drop(first);
}

#[tokio::test]
async fn shutdown_completes_with_no_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let result = startup(config(dir.path(), free_port().await)).await.unwrap();
    result.gateway.shutdown_now().await;
}
