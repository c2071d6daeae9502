// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream-protocol specs: the CLI client against an in-process gateway.

use std::sync::Arc;
use std::time::Duration;

use harness_cli::client::{StreamClient, DEFAULT_COMMAND_TIMEOUT};
use harness_core::{ObservedPayload, SessionStatus};
use harness_daemon::{lifecycle, listener, RuntimeConfig};
use harness_wire::{Command, ServerEnvelope};
use serde_json::json;

struct InProcessGateway {
    port: u16,
    _dir: tempfile::TempDir,
    gateway: Arc<lifecycle::Gateway>,
}

async fn gateway_with_tail_budget(tail_backlog_bytes: usize) -> InProcessGateway {
    let dir = tempfile::tempdir().unwrap();
    let config = RuntimeConfig {
        host: "127.0.0.1".into(),
        port: 0,
        auth_token: None,
        state_db_path: dir.path().join("control-plane.sqlite"),
        workspace_root: dir.path().to_path_buf(),
        workspace_id: "ws-spec".into(),
        tail_backlog_bytes,
        close_live_sessions_on_client_stop: false,
    };
    let started = lifecycle::startup(config).await.unwrap();
    let port = started.listener.local_addr().unwrap().port();
    let gateway = Arc::clone(&started.gateway);
    tokio::spawn(listener::run(started.listener, started.gateway));
    InProcessGateway { port, _dir: dir, gateway }
}

async fn create_session(
    client: &StreamClient,
    dir: &std::path::Path,
    shell_script: &str,
) -> String {
    let result = client
        .command(
            Command::DirectoryUpsert { path: dir.to_string_lossy().into_owned() },
            DEFAULT_COMMAND_TIMEOUT,
        )
        .await
        .unwrap();
    let directory_id = result["directory"]["directoryId"].as_str().unwrap().to_string();

    let result = client
        .command(
            Command::ConversationCreate {
                directory_id: directory_id.as_str().into(),
                title: "spec".into(),
                agent_type: harness_core::AgentType::Claude,
                worktree_id: None,
            },
            DEFAULT_COMMAND_TIMEOUT,
        )
        .await
        .unwrap();
    let session_id = result["session"]["threadId"].as_str().unwrap().to_string();

    client
        .command(
            Command::PtyStart {
                session_id: session_id.as_str().into(),
                command: Some("/bin/sh".into()),
                args: vec!["-c".into(), shell_script.into()],
                cwd: None,
                cols: None,
                rows: None,
            },
            DEFAULT_COMMAND_TIMEOUT,
        )
        .await
        .unwrap();
    session_id
}

/// Lossy replay: with a tiny tail budget, a late attacher sees only the
/// retained suffix and none of the evicted bytes.
#[tokio::test]
async fn late_attach_replay_is_lossy_under_a_tiny_budget() {
    let server = gateway_with_tail_budget(4).await;
    let client = StreamClient::connect("127.0.0.1", server.port, None).await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    let session_id = create_session(
        &client,
        dir.path(),
        "printf '12345\\n'; sleep 1; printf 'abcdef\\n'; sleep 30",
    )
    .await;

    // Wait for both writes to pass through the broker.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(8);
    loop {
        let result = client
            .command(
                Command::SessionSnapshot { session_id: session_id.as_str().into() },
                DEFAULT_COMMAND_TIMEOUT,
            )
            .await
            .unwrap();
        if result["cursor"].as_u64().unwrap() >= 13 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "broker never saw both writes");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    let mut envelopes = client.envelopes();
    client
        .command(
            Command::PtyAttach { session_id: session_id.as_str().into(), since_cursor: Some(0) },
            DEFAULT_COMMAND_TIMEOUT,
        )
        .await
        .unwrap();

    let mut replayed = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while replayed.len() < 4 {
        let envelope = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            envelope = envelopes.recv() => envelope,
        };
        if let Ok(ServerEnvelope::PtyOutput { chunk_base64, .. }) = envelope {
            replayed.extend(harness_wire::decode_chunk(&chunk_base64).unwrap());
        } else if envelope.is_err() {
            break;
        }
    }

    let text = String::from_utf8_lossy(&replayed).into_owned();
    assert!(!replayed.is_empty(), "no replay received");
    assert!(replayed.len() <= 4, "budget-4 backlog replayed {} bytes", replayed.len());
    assert!(!text.contains("12345"), "evicted bytes replayed: {text:?}");
    // The tail is a suffix of the second write (PTY newline mapping aside).
    assert!("abcdef\r\n".ends_with(&text) || "abcdef\n".ends_with(&text), "tail {text:?}");

    client
        .command(
            Command::PtyClose { session_id: session_id.as_str().into() },
            DEFAULT_COMMAND_TIMEOUT,
        )
        .await
        .unwrap();
}

/// Needs-input round trip through the real wire: notify → needs-input with
/// reason → controller input → running again.
#[tokio::test]
async fn needs_input_round_trip_over_the_wire() {
    let server = gateway_with_tail_budget(64 * 1024).await;
    let client = StreamClient::connect("127.0.0.1", server.port, None).await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    client
        .command(Command::StreamSubscribe { after_cursor: Some(0) }, DEFAULT_COMMAND_TIMEOUT)
        .await
        .unwrap();
    let mut envelopes = client.envelopes();

    let session_id = create_session(&client, dir.path(), "sleep 30").await;

    let result = client
        .command(
            Command::SessionClaim {
                session_id: session_id.as_str().into(),
                controller_id: "ctl-spec".into(),
                controller_type: None,
                controller_label: Some("spec tty".into()),
                takeover: false,
            },
            DEFAULT_COMMAND_TIMEOUT,
        )
        .await
        .unwrap();
    assert_eq!(result["action"], "claimed");

    client
        .command(
            Command::SessionNotify {
                session_id: session_id.as_str().into(),
                record: json!({
                    "hook_event_name": "Notification",
                    "notification_type": "permissionRequest",
                }),
            },
            DEFAULT_COMMAND_TIMEOUT,
        )
        .await
        .unwrap();

    // The observed stream surfaces needs-input with the raw reason.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let envelope = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => panic!("no needs-input observed"),
            envelope = envelopes.recv() => envelope.unwrap(),
        };
        if let ServerEnvelope::StreamEvent { event } = envelope {
            if let ObservedPayload::SessionStatus { status, attention_reason, .. } =
                event.payload
            {
                if status == SessionStatus::NeedsInput {
                    assert_eq!(attention_reason.as_deref(), Some("permissionRequest"));
                    break;
                }
            }
        }
    }

    // Controller input clears it.
    client.send_input(&session_id, b"y\n").await.unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let envelope = tokio::select! {
            _ = tokio::time::sleep_until(deadline) => panic!("never returned to running"),
            envelope = envelopes.recv() => envelope.unwrap(),
        };
        if let ServerEnvelope::StreamEvent { event } = envelope {
            if let ObservedPayload::SessionStatus { status, attention_reason, .. } =
                event.payload
            {
                if status == SessionStatus::Running {
                    assert_eq!(attention_reason, None);
                    break;
                }
            }
        }
    }

    assert_eq!(server.gateway.sessions.live_count(), 1);
    client
        .command(
            Command::PtyClose { session_id: session_id.as_str().into() },
            DEFAULT_COMMAND_TIMEOUT,
        )
        .await
        .unwrap();
}

/// Takeover flow between two connections (claims are serialized on the
/// session actor, exactly one winner).
#[tokio::test]
async fn takeover_moves_the_controller_between_clients() {
    let server = gateway_with_tail_budget(64 * 1024).await;
    let client_a = StreamClient::connect("127.0.0.1", server.port, None).await.unwrap();
    let client_b = StreamClient::connect("127.0.0.1", server.port, None).await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    let session_id = create_session(&client_a, dir.path(), "sleep 30").await;
    let claim = |controller: &str, takeover: bool| Command::SessionClaim {
        session_id: session_id.as_str().into(),
        controller_id: controller.into(),
        controller_type: None,
        controller_label: None,
        takeover,
    };

    let result =
        client_a.command(claim("A", false), DEFAULT_COMMAND_TIMEOUT).await.unwrap();
    assert_eq!(result["action"], "claimed");
    // B without takeover learns the session is already owned by A.
    let result =
        client_b.command(claim("B", false), DEFAULT_COMMAND_TIMEOUT).await.unwrap();
    assert_eq!(result["action"], "already-owned");
    assert_eq!(result["controller"]["controllerId"], "A");
    let result =
        client_b.command(claim("B", true), DEFAULT_COMMAND_TIMEOUT).await.unwrap();
    assert_eq!(result["action"], "claimed");
    assert_eq!(result["controller"]["controllerId"], "B");

    client_a
        .command(
            Command::PtyClose { session_id: session_id.as_str().into() },
            DEFAULT_COMMAND_TIMEOUT,
        )
        .await
        .unwrap();
}
