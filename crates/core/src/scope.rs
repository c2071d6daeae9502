// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scope tuple carried on every durable record.
//!
//! Scope is a filter, never a join key: records are written with the scope of
//! the gateway that produced them and queries only ever match within one
//! scope. There is no cross-scope access anywhere in the core.

use serde::{Deserialize, Serialize};

/// `(tenantId, userId, workspaceId)` — sessions additionally carry a
/// `worktreeId` on their own record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub tenant_id: String,
    pub user_id: String,
    pub workspace_id: String,
}

impl Scope {
    pub fn new(
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        workspace_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            user_id: user_id.into(),
            workspace_id: workspace_id.into(),
        }
    }

    /// The default local single-user scope for a workspace.
    pub fn local(workspace_id: impl Into<String>) -> Self {
        Self::new("local", "local", workspace_id)
    }

    pub fn matches(&self, other: &Scope) -> bool {
        self == other
    }
}

#[cfg(test)]
#[path = "scope_tests.rs"]
mod tests;
