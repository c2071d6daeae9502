// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stream server: accept loop and per-connection tasks.
//!
//! Each connection gets a reader task (this function), a writer task with a
//! bounded queue, and one spawned task per accepted command. Auth, when the
//! gateway holds a token, gates everything: pre-auth envelopes other than
//! `auth` are silently dropped, and a connection that never authenticates is
//! closed after a deadline.

mod commands;
mod registry;
mod tasks;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use harness_core::ThreadId;
use harness_wire::{
    parse_client_envelope, write_envelope, ClientEnvelope, LineDecoder, ServerEnvelope,
};

use crate::env::{AUTH_DEADLINE, OUTBOUND_QUEUE_DEPTH, WRITE_TIMEOUT};
use crate::hub::SubId;
use crate::lifecycle::Gateway;
use crate::outbound::{ConnId, Outbound};
use crate::session::SessionMsg;

/// Per-connection server-side state.
pub(crate) struct ConnCtx {
    pub conn_id: ConnId,
    pub outbound: Outbound,
    /// Sessions this connection started (closed on disconnect in embedded mode).
    pub owned_sessions: Mutex<HashSet<ThreadId>>,
    pub stream_sub: Mutex<Option<SubId>>,
    pub key_sub: Mutex<Option<SubId>>,
}

/// Accept connections until shutdown.
pub async fn run(listener: TcpListener, gateway: Arc<Gateway>) {
    let mut next_conn: ConnId = 0;
    loop {
        tokio::select! {
            _ = gateway.shutdown.notified() => {
                info!("listener stopping");
                break;
            }
            result = listener.accept() => match result {
                Ok((stream, addr)) => {
                    next_conn += 1;
                    let conn_id = next_conn;
                    debug!(conn = conn_id, %addr, "connection accepted");
                    let gateway = Arc::clone(&gateway);
                    tokio::spawn(async move {
                        handle_connection(stream, conn_id, gateway).await;
                    });
                }
                Err(err) => error!(%err, "accept error"),
            },
        }
    }
}

async fn handle_connection(stream: TcpStream, conn_id: ConnId, gateway: Arc<Gateway>) {
    if let Err(err) = stream.set_nodelay(true) {
        debug!(%err, "set_nodelay failed");
    }
    let (mut reader, writer) = stream.into_split();
    let cancel = CancellationToken::new();
    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
    let outbound = Outbound::new(conn_id, out_tx, cancel.clone());
    tokio::spawn(writer_task(writer, out_rx, cancel.clone()));

    let ctx = Arc::new(ConnCtx {
        conn_id,
        outbound: outbound.clone(),
        owned_sessions: Mutex::new(HashSet::new()),
        stream_sub: Mutex::new(None),
        key_sub: Mutex::new(None),
    });

    let mut decoder = LineDecoder::new();
    if gateway.config.auth_token.is_some() {
        match authenticate(&mut reader, &mut decoder, &outbound, &cancel, &gateway).await {
            Some(leftover) => {
                // Envelopes that rode in the same segment as the auth line.
                for line in leftover {
                    if let Some(envelope) = parse_client_envelope(&line) {
                        route_envelope(envelope, &ctx, &gateway).await;
                    }
                }
            }
            None => {
                cancel.cancel();
                cleanup(&ctx, &gateway).await;
                return;
            }
        }
    }

    let mut buf = [0u8; 8192];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            read = reader.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    for line in decoder.push(&buf[..n]) {
                        if let Some(envelope) = parse_client_envelope(&line) {
                            route_envelope(envelope, &ctx, &gateway).await;
                        }
                    }
                }
                Err(err) => {
                    debug!(conn = conn_id, %err, "read error");
                    break;
                }
            },
        }
    }

    cancel.cancel();
    cleanup(&ctx, &gateway).await;
    debug!(conn = conn_id, "connection closed");
}

/// Await a valid `auth` envelope. Pre-auth non-auth envelopes are dropped.
///
/// On success returns the lines that arrived after the auth line in the
/// same read, so they are processed instead of lost. `None` means the
/// connection must close.
async fn authenticate(
    reader: &mut (impl AsyncReadExt + Unpin),
    decoder: &mut LineDecoder,
    outbound: &Outbound,
    cancel: &CancellationToken,
    gateway: &Gateway,
) -> Option<Vec<String>> {
    let expected = gateway.config.auth_token.as_deref().unwrap_or_default();
    let mut buf = [0u8; 4096];
    let deadline = tokio::time::Instant::now() + AUTH_DEADLINE;

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep_until(deadline) => {
                debug!(conn = outbound.conn_id(), "auth deadline elapsed");
                return None;
            }
            read = reader.read(&mut buf) => read,
        };
        let n = match read {
            Ok(0) | Err(_) => return None,
            Ok(n) => n,
        };
        let mut lines = decoder.push(&buf[..n]).into_iter();
        while let Some(line) = lines.next() {
            match parse_client_envelope(&line) {
                Some(ClientEnvelope::Auth { token }) => {
                    if token == expected {
                        outbound.send(ServerEnvelope::AuthOk);
                        return Some(lines.collect());
                    }
                    outbound
                        .send(ServerEnvelope::AuthError { error: "invalid token".to_string() });
                    // Give the writer a beat to flush the error before close.
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    return None;
                }
                Some(_) => {
                    debug!(conn = outbound.conn_id(), "dropping pre-auth envelope");
                }
                None => {}
            }
        }
    }
}

async fn route_envelope(envelope: ClientEnvelope, ctx: &Arc<ConnCtx>, gateway: &Arc<Gateway>) {
    match envelope {
        // Harmless after auth (or when no token is configured).
        ClientEnvelope::Auth { .. } => {
            ctx.outbound.send(ServerEnvelope::AuthOk);
        }
        ClientEnvelope::Command { command_id, command } => {
            // Accepted before any side effect so the client can free its
            // op-queue slot while tracking completion.
            ctx.outbound.send(ServerEnvelope::CommandAccepted { command_id: command_id.clone() });
            let ctx = Arc::clone(ctx);
            let gateway = Arc::clone(gateway);
            tokio::spawn(async move {
                let envelope = match commands::dispatch(&gateway, &ctx, command).await {
                    Ok(result) => ServerEnvelope::CommandCompleted { command_id, result },
                    Err(error) => ServerEnvelope::CommandFailed { command_id, error },
                };
                ctx.outbound.send(envelope);
            });
        }
        ClientEnvelope::PtyInput { session_id, data_base64 } => {
            let Some(data) = harness_wire::decode_chunk(&data_base64) else { return };
            if let Some(handle) = gateway.sessions.get(&session_id) {
                handle.send(SessionMsg::Input { data, conn: ctx.conn_id }).await;
            }
        }
        ClientEnvelope::PtyResize { session_id, cols, rows } => {
            if let Some(handle) = gateway.sessions.get(&session_id) {
                handle.send(SessionMsg::Resize { cols, rows, conn: ctx.conn_id }).await;
            }
        }
        ClientEnvelope::PtySignal { session_id, signal } => {
            if let Some(handle) = gateway.sessions.get(&session_id) {
                handle.send(SessionMsg::Signal { signal, conn: ctx.conn_id }).await;
            }
        }
    }
}

async fn writer_task(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<ServerEnvelope>,
    cancel: CancellationToken,
) {
    loop {
        let envelope = tokio::select! {
            _ = cancel.cancelled() => break,
            envelope = rx.recv() => match envelope {
                Some(envelope) => envelope,
                None => break,
            },
        };
        if let Err(err) = write_envelope(&mut writer, &envelope, WRITE_TIMEOUT).await {
            debug!(%err, "write failed; dropping connection");
            cancel.cancel();
            break;
        }
    }
}

/// Disconnect teardown: subscriptions, broker attachments, owned sessions.
async fn cleanup(ctx: &Arc<ConnCtx>, gateway: &Arc<Gateway>) {
    gateway.hub.remove_conn(ctx.conn_id);
    gateway.sessions.conn_closed(ctx.conn_id).await;

    if gateway.config.close_live_sessions_on_client_stop {
        let owned: Vec<ThreadId> = ctx.owned_sessions.lock().iter().cloned().collect();
        for session_id in owned {
            if let Some(handle) = gateway.sessions.get(&session_id) {
                warn!(session = %session_id, "closing session with its client");
                let (tx, _rx) = tokio::sync::oneshot::channel();
                handle.send(SessionMsg::Close { reply: tx }).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
