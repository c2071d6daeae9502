// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn serializes_camel_case() {
    let scope = Scope::local("ws-1");
    let json = serde_json::to_value(&scope).unwrap();
    assert_eq!(json["tenantId"], "local");
    assert_eq!(json["userId"], "local");
    assert_eq!(json["workspaceId"], "ws-1");
}

#[test]
fn matches_is_exact() {
    let a = Scope::local("ws-1");
    let b = Scope::local("ws-1");
    let c = Scope::local("ws-2");
    assert!(a.matches(&b));
    assert!(!a.matches(&c));
}
