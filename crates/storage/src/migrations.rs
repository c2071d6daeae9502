// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stepped schema migrations keyed on `PRAGMA user_version`.

use rusqlite::Connection;

use crate::store::StoreError;

const MIGRATIONS: &[&str] = &[
    // v1: initial control-plane schema
    "
    CREATE TABLE directories (
        directory_id TEXT PRIMARY KEY,
        path TEXT NOT NULL,
        tenant_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        workspace_id TEXT NOT NULL,
        created_at TEXT NOT NULL,
        archived_at TEXT
    );
    CREATE INDEX idx_directories_scope ON directories (tenant_id, user_id, workspace_id);

    CREATE TABLE repositories (
        repository_id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        workspace_id TEXT NOT NULL,
        name TEXT NOT NULL,
        remote_url TEXT NOT NULL,
        default_branch TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        archived_at TEXT
    );
    CREATE INDEX idx_repositories_scope ON repositories (tenant_id, user_id, workspace_id);

    CREATE TABLE threads (
        thread_id TEXT PRIMARY KEY,
        directory_id TEXT NOT NULL,
        tenant_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        workspace_id TEXT NOT NULL,
        worktree_id TEXT NOT NULL,
        title TEXT NOT NULL,
        agent_type TEXT NOT NULL,
        adapter_state TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        archived_at TEXT,
        status TEXT NOT NULL,
        status_model TEXT,
        live INTEGER NOT NULL DEFAULT 0,
        attention_reason TEXT,
        process_id INTEGER,
        last_event_at TEXT,
        last_exit TEXT,
        controller TEXT
    );
    CREATE INDEX idx_threads_scope ON threads (tenant_id, user_id, workspace_id);

    CREATE TABLE tasks (
        task_id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        workspace_id TEXT NOT NULL,
        scope_kind TEXT NOT NULL,
        repository_id TEXT,
        project_id TEXT,
        title TEXT NOT NULL,
        body TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL,
        order_index INTEGER NOT NULL,
        claimed_by_controller_id TEXT,
        claimed_by_project_id TEXT,
        branch_name TEXT,
        base_branch TEXT,
        claimed_at TEXT,
        completed_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX idx_tasks_scope ON tasks (tenant_id, user_id, workspace_id, order_index);

    CREATE TABLE events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ts TEXT NOT NULL,
        kind TEXT NOT NULL,
        tenant_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        workspace_id TEXT NOT NULL,
        worktree_id TEXT,
        payload TEXT NOT NULL
    );
    CREATE INDEX idx_events_scope ON events (tenant_id, user_id, workspace_id, id);
    ",
];

/// Bring a connection up to the current schema version. Idempotent; safe to
/// call from every opener of the shared database file.
pub fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let version: i64 =
        conn.query_row("PRAGMA user_version", [], |row| row.get(0)).map_err(StoreError::from)?;

    for (index, sql) in MIGRATIONS.iter().enumerate() {
        let target = (index + 1) as i64;
        if version >= target {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.pragma_update(None, "user_version", target)?;
    }
    Ok(())
}
