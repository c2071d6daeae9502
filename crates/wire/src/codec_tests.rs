// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::command::Command;
use crate::envelope::ClientEnvelope;

#[test]
fn encode_appends_newline() {
    let envelope = ClientEnvelope::Auth { token: "t".into() };
    let line = encode_envelope(&envelope).unwrap();
    assert_eq!(*line.last().unwrap(), b'\n');
    assert!(!line[..line.len() - 1].contains(&b'\n'));
}

#[test]
fn decoder_handles_split_lines() {
    let mut decoder = LineDecoder::new();
    assert!(decoder.push(b"{\"kind\":").is_empty());
    assert!(decoder.push(b"\"auth\",\"token\":\"t\"}").is_empty());
    let lines = decoder.push(b"\n");
    assert_eq!(lines.len(), 1);
    let envelope = parse_client_envelope(&lines[0]).unwrap();
    assert_eq!(envelope, ClientEnvelope::Auth { token: "t".into() });
}

#[test]
fn decoder_yields_multiple_lines_per_push() {
    let mut decoder = LineDecoder::new();
    let lines = decoder.push(b"{\"a\":1}\n{\"b\":2}\n");
    assert_eq!(lines, vec!["{\"a\":1}".to_string(), "{\"b\":2}".to_string()]);
}

#[test]
fn decoder_skips_empty_lines() {
    let mut decoder = LineDecoder::new();
    let lines = decoder.push(b"\n\n{\"a\":1}\n\n");
    assert_eq!(lines, vec!["{\"a\":1}".to_string()]);
}

#[test]
fn invalid_line_is_passed_over() {
    assert!(parse_client_envelope("not json").is_none());
    assert!(parse_client_envelope("{\"kind\":\"made-up\"}").is_none());
    assert!(parse_client_envelope("{}").is_none());
    // missing required field
    assert!(parse_client_envelope("{\"kind\":\"auth\"}").is_none());
    // wrong type for a field
    assert!(parse_client_envelope("{\"kind\":\"auth\",\"token\":17}").is_none());
}

#[test]
fn parse_round_trips_valid_client_envelope() {
    let envelope = ClientEnvelope::Command {
        command_id: "cmd-9".into(),
        command: Command::PtyDetach { session_id: "thr-a".into() },
    };
    let line = encode_envelope(&envelope).unwrap();
    let text = std::str::from_utf8(&line[..line.len() - 1]).unwrap();
    assert_eq!(parse_client_envelope(text).unwrap(), envelope);
}

#[test]
fn resize_with_zero_rows_rejected_at_parse() {
    let line = "{\"kind\":\"pty.resize\",\"sessionId\":\"thr-a\",\"cols\":80,\"rows\":0}";
    assert!(parse_client_envelope(line).is_none());
}

#[test]
fn negative_dimension_rejected_at_parse() {
    let line = "{\"kind\":\"pty.resize\",\"sessionId\":\"thr-a\",\"cols\":-1,\"rows\":24}";
    assert!(parse_client_envelope(line).is_none());
}

#[tokio::test]
async fn write_then_read_over_duplex() {
    let (mut client, mut server) = tokio::io::duplex(1024);
    let envelope = ClientEnvelope::Auth { token: "abc".into() };
    write_envelope(&mut client, &envelope, std::time::Duration::from_secs(1)).await.unwrap();

    let mut decoder = LineDecoder::new();
    let lines =
        read_line(&mut server, &mut decoder, std::time::Duration::from_secs(1)).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(parse_client_envelope(&lines[0]).unwrap(), envelope);
}

#[tokio::test]
async fn read_reports_connection_closed() {
    let (client, mut server) = tokio::io::duplex(64);
    drop(client);
    let mut decoder = LineDecoder::new();
    let err = read_line(&mut server, &mut decoder, std::time::Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
}
