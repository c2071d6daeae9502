// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The control-plane state store.
//!
//! One sqlite connection with WAL journaling and a busy timeout. Every
//! accessor filters by scope; no query crosses scopes. JSON-shaped columns
//! (adapter state, metadata, controller, last exit) are stored as TEXT and
//! decoded on read.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;

use harness_core::{
    records::normalize_remote_url, AgentType, Controller, ControllerId, Conversation, Directory,
    DirectoryId, ExitStatus, Repository, RepositoryId, RuntimeSnapshot, Scope, SessionStatus,
    Task, TaskId, TaskScopeKind, TaskStatus, ThreadId,
};

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt column: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound { kind, id: id.to_string() }
    }
}

/// Persistent store for directories, repositories, conversations, and tasks.
pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    /// Open (creating if needed) the store at `path` and migrate.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        crate::migrations::migrate(&conn)?;
        Ok(Self { conn })
    }

    // ---- directories ----

    /// Insert a directory, or return the existing active record for the
    /// same normalized path.
    pub fn upsert_directory(
        &self,
        scope: &Scope,
        path: &str,
        now: &str,
    ) -> Result<Directory, StoreError> {
        if let Some(existing) = self
            .conn
            .query_row(
                "SELECT * FROM directories
                 WHERE path = ?1 AND tenant_id = ?2 AND user_id = ?3 AND workspace_id = ?4
                   AND archived_at IS NULL",
                params![path, scope.tenant_id, scope.user_id, scope.workspace_id],
                directory_from_row,
            )
            .optional()?
        {
            return Ok(existing);
        }

        let directory = Directory {
            directory_id: DirectoryId::new(),
            path: path.to_string(),
            scope: scope.clone(),
            created_at: now.to_string(),
            archived_at: None,
        };
        self.conn.execute(
            "INSERT INTO directories (directory_id, path, tenant_id, user_id, workspace_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                directory.directory_id.as_str(),
                directory.path,
                scope.tenant_id,
                scope.user_id,
                scope.workspace_id,
                directory.created_at,
            ],
        )?;
        Ok(directory)
    }

    pub fn get_directory(&self, id: &DirectoryId) -> Result<Directory, StoreError> {
        self.conn
            .query_row(
                "SELECT * FROM directories WHERE directory_id = ?1",
                params![id.as_str()],
                directory_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("directory", id))
    }

    pub fn list_directories(&self, scope: &Scope) -> Result<Vec<Directory>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM directories
             WHERE tenant_id = ?1 AND user_id = ?2 AND workspace_id = ?3 AND archived_at IS NULL
             ORDER BY created_at, directory_id",
        )?;
        let rows = stmt.query_map(
            params![scope.tenant_id, scope.user_id, scope.workspace_id],
            directory_from_row,
        )?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn archive_directory(&self, id: &DirectoryId, now: &str) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE directories SET archived_at = ?2 WHERE directory_id = ?1 AND archived_at IS NULL",
            params![id.as_str(), now],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("directory", id));
        }
        Ok(())
    }

    // ---- repositories ----

    /// Insert a repository, or refresh the existing record matching the
    /// normalized remote URL.
    pub fn upsert_repository(
        &self,
        scope: &Scope,
        name: &str,
        remote_url: &str,
        default_branch: Option<&str>,
        metadata: Option<&serde_json::Value>,
        now: &str,
    ) -> Result<(Repository, bool), StoreError> {
        let remote = normalize_remote_url(remote_url);
        let existing = self
            .conn
            .query_row(
                "SELECT * FROM repositories
                 WHERE remote_url = ?1 AND tenant_id = ?2 AND user_id = ?3 AND workspace_id = ?4
                   AND archived_at IS NULL",
                params![remote, scope.tenant_id, scope.user_id, scope.workspace_id],
                repository_from_row,
            )
            .optional()?;

        if let Some(mut repo) = existing {
            repo.name = name.to_string();
            if let Some(branch) = default_branch {
                repo.default_branch = branch.to_string();
            }
            if let Some(meta) = metadata {
                repo.metadata = meta.clone();
            }
            self.conn.execute(
                "UPDATE repositories SET name = ?2, default_branch = ?3, metadata = ?4
                 WHERE repository_id = ?1",
                params![
                    repo.repository_id.as_str(),
                    repo.name,
                    repo.default_branch,
                    serde_json::to_string(&repo.metadata)?,
                ],
            )?;
            return Ok((repo, false));
        }

        let repo = Repository {
            repository_id: RepositoryId::new(),
            scope: scope.clone(),
            name: name.to_string(),
            remote_url: remote,
            default_branch: default_branch.unwrap_or("main").to_string(),
            metadata: metadata.cloned().unwrap_or_else(|| serde_json::json!({})),
            created_at: now.to_string(),
            archived_at: None,
        };
        self.conn.execute(
            "INSERT INTO repositories
                 (repository_id, tenant_id, user_id, workspace_id, name, remote_url,
                  default_branch, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                repo.repository_id.as_str(),
                scope.tenant_id,
                scope.user_id,
                scope.workspace_id,
                repo.name,
                repo.remote_url,
                repo.default_branch,
                serde_json::to_string(&repo.metadata)?,
                repo.created_at,
            ],
        )?;
        Ok((repo, true))
    }

    pub fn update_repository(
        &self,
        id: &RepositoryId,
        name: Option<&str>,
        default_branch: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<Repository, StoreError> {
        let mut repo = self.get_repository(id)?;
        if let Some(name) = name {
            repo.name = name.to_string();
        }
        if let Some(branch) = default_branch {
            repo.default_branch = branch.to_string();
        }
        if let Some(meta) = metadata {
            repo.metadata = meta.clone();
        }
        self.conn.execute(
            "UPDATE repositories SET name = ?2, default_branch = ?3, metadata = ?4
             WHERE repository_id = ?1",
            params![
                id.as_str(),
                repo.name,
                repo.default_branch,
                serde_json::to_string(&repo.metadata)?,
            ],
        )?;
        Ok(repo)
    }

    pub fn get_repository(&self, id: &RepositoryId) -> Result<Repository, StoreError> {
        self.conn
            .query_row(
                "SELECT * FROM repositories WHERE repository_id = ?1",
                params![id.as_str()],
                repository_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("repository", id))
    }

    pub fn list_repositories(&self, scope: &Scope) -> Result<Vec<Repository>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM repositories
             WHERE tenant_id = ?1 AND user_id = ?2 AND workspace_id = ?3 AND archived_at IS NULL
             ORDER BY created_at, repository_id",
        )?;
        let rows = stmt.query_map(
            params![scope.tenant_id, scope.user_id, scope.workspace_id],
            repository_from_row,
        )?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn archive_repository(&self, id: &RepositoryId, now: &str) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE repositories SET archived_at = ?2
             WHERE repository_id = ?1 AND archived_at IS NULL",
            params![id.as_str(), now],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("repository", id));
        }
        Ok(())
    }

    // ---- conversations ----

    pub fn insert_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO threads
                 (thread_id, directory_id, tenant_id, user_id, workspace_id, worktree_id,
                  title, agent_type, adapter_state, created_at, archived_at,
                  status, status_model, live, attention_reason, process_id,
                  last_event_at, last_exit, controller)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                     ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            params![
                conversation.thread_id.as_str(),
                conversation.directory_id.as_str(),
                conversation.scope.tenant_id,
                conversation.scope.user_id,
                conversation.scope.workspace_id,
                conversation.worktree_id,
                conversation.title,
                conversation.agent_type.to_string(),
                serde_json::to_string(&conversation.adapter_state)?,
                conversation.created_at,
                conversation.archived_at,
                conversation.runtime.status.to_string(),
                conversation.runtime.status_model,
                conversation.runtime.live as i64,
                conversation.runtime.attention_reason,
                conversation.runtime.process_id,
                conversation.runtime.last_event_at,
                opt_json(conversation.runtime.last_exit.as_ref())?,
                opt_json(conversation.runtime.controller.as_ref())?,
            ],
        )?;
        Ok(())
    }

    pub fn get_conversation(&self, id: &ThreadId) -> Result<Conversation, StoreError> {
        self.conn
            .query_row(
                "SELECT * FROM threads WHERE thread_id = ?1",
                params![id.as_str()],
                conversation_from_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("session", id))
    }

    pub fn list_conversations(
        &self,
        scope: &Scope,
        include_archived: bool,
        limit: Option<u32>,
    ) -> Result<Vec<Conversation>, StoreError> {
        let archived_clause = if include_archived { "" } else { "AND archived_at IS NULL" };
        let sql = format!(
            "SELECT * FROM threads
             WHERE tenant_id = ?1 AND user_id = ?2 AND workspace_id = ?3 {archived_clause}
             ORDER BY created_at, thread_id LIMIT ?4",
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                scope.tenant_id,
                scope.user_id,
                scope.workspace_id,
                limit.map(i64::from).unwrap_or(-1),
            ],
            conversation_from_row,
        )?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    pub fn update_conversation_title(
        &self,
        id: &ThreadId,
        title: &str,
    ) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE threads SET title = ?2 WHERE thread_id = ?1",
            params![id.as_str(), title],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("session", id));
        }
        Ok(())
    }

    pub fn update_adapter_state(
        &self,
        id: &ThreadId,
        adapter_state: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE threads SET adapter_state = ?2 WHERE thread_id = ?1",
            params![id.as_str(), serde_json::to_string(adapter_state)?],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("session", id));
        }
        Ok(())
    }

    pub fn archive_conversation(&self, id: &ThreadId, now: &str) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE threads SET archived_at = ?2 WHERE thread_id = ?1 AND archived_at IS NULL",
            params![id.as_str(), now],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("session", id));
        }
        Ok(())
    }

    /// Persist the runtime snapshot embedded in a conversation row.
    pub fn update_runtime_snapshot(
        &self,
        id: &ThreadId,
        runtime: &RuntimeSnapshot,
    ) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE threads SET
                 status = ?2, status_model = ?3, live = ?4, attention_reason = ?5,
                 process_id = ?6, last_event_at = ?7, last_exit = ?8, controller = ?9
             WHERE thread_id = ?1",
            params![
                id.as_str(),
                runtime.status.to_string(),
                runtime.status_model,
                runtime.live as i64,
                runtime.attention_reason,
                runtime.process_id,
                runtime.last_event_at,
                opt_json(runtime.last_exit.as_ref())?,
                opt_json(runtime.controller.as_ref())?,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("session", id));
        }
        Ok(())
    }

    // ---- tasks ----

    pub fn create_task(
        &self,
        scope: &Scope,
        scope_kind: TaskScopeKind,
        repository_id: Option<&RepositoryId>,
        project_id: Option<&str>,
        title: &str,
        body: Option<&str>,
        now: &str,
    ) -> Result<Task, StoreError> {
        let next_index: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(order_index), -1) + 1 FROM tasks
             WHERE tenant_id = ?1 AND user_id = ?2 AND workspace_id = ?3",
            params![scope.tenant_id, scope.user_id, scope.workspace_id],
            |row| row.get(0),
        )?;

        let task = Task {
            task_id: TaskId::new(),
            scope: scope.clone(),
            scope_kind,
            repository_id: repository_id.cloned(),
            project_id: project_id.map(str::to_owned),
            title: title.to_string(),
            body: body.unwrap_or_default().to_string(),
            status: TaskStatus::Draft,
            order_index: next_index,
            claimed_by_controller_id: None,
            claimed_by_project_id: None,
            branch_name: None,
            base_branch: None,
            claimed_at: None,
            completed_at: None,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        };
        self.conn.execute(
            "INSERT INTO tasks
                 (task_id, tenant_id, user_id, workspace_id, scope_kind, repository_id,
                  project_id, title, body, status, order_index, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                task.task_id.as_str(),
                scope.tenant_id,
                scope.user_id,
                scope.workspace_id,
                task.scope_kind.to_string(),
                task.repository_id.as_ref().map(|id| id.as_str().to_owned()),
                task.project_id,
                task.title,
                task.body,
                task.status.to_string(),
                task.order_index,
                task.created_at,
                task.updated_at,
            ],
        )?;
        Ok(task)
    }

    pub fn get_task(&self, id: &TaskId) -> Result<Task, StoreError> {
        self.conn
            .query_row("SELECT * FROM tasks WHERE task_id = ?1", params![id.as_str()], task_from_row)
            .optional()?
            .ok_or_else(|| StoreError::not_found("task", id))
    }

    pub fn update_task(
        &self,
        id: &TaskId,
        title: Option<&str>,
        body: Option<&str>,
        now: &str,
    ) -> Result<Task, StoreError> {
        let mut task = self.get_task(id)?;
        if let Some(title) = title {
            task.title = title.to_string();
        }
        if let Some(body) = body {
            task.body = body.to_string();
        }
        task.updated_at = now.to_string();
        self.conn.execute(
            "UPDATE tasks SET title = ?2, body = ?3, updated_at = ?4 WHERE task_id = ?1",
            params![id.as_str(), task.title, task.body, task.updated_at],
        )?;
        Ok(task)
    }

    pub fn delete_task(&self, id: &TaskId) -> Result<(), StoreError> {
        let changed =
            self.conn.execute("DELETE FROM tasks WHERE task_id = ?1", params![id.as_str()])?;
        if changed == 0 {
            return Err(StoreError::not_found("task", id));
        }
        Ok(())
    }

    pub fn list_tasks(
        &self,
        scope: &Scope,
        status: Option<TaskStatus>,
        repository_id: Option<&RepositoryId>,
    ) -> Result<Vec<Task>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM tasks
             WHERE tenant_id = ?1 AND user_id = ?2 AND workspace_id = ?3
               AND (?4 IS NULL OR status = ?4)
               AND (?5 IS NULL OR repository_id = ?5)
             ORDER BY order_index, task_id",
        )?;
        let rows = stmt.query_map(
            params![
                scope.tenant_id,
                scope.user_id,
                scope.workspace_id,
                status.map(|s| s.to_string()),
                repository_id.map(|id| id.as_str().to_owned()),
            ],
            task_from_row,
        )?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Apply a full ordering: each listed task takes its position's index.
    pub fn reorder_tasks(&self, task_ids: &[TaskId], now: &str) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        for (index, id) in task_ids.iter().enumerate() {
            let changed = tx.execute(
                "UPDATE tasks SET order_index = ?2, updated_at = ?3 WHERE task_id = ?1",
                params![id.as_str(), index as i64, now],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("task", id));
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Move a task between draft/ready/completed. Claim fields are cleared
    /// when a claimed task is pushed back to draft or ready.
    pub fn set_task_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        now: &str,
    ) -> Result<Task, StoreError> {
        let completed_at = matches!(status, TaskStatus::Completed).then(|| now.to_string());
        let changed = self.conn.execute(
            "UPDATE tasks SET status = ?2, updated_at = ?3, completed_at = ?4,
                 claimed_by_controller_id = CASE WHEN ?2 IN ('draft','ready') THEN NULL ELSE claimed_by_controller_id END,
                 claimed_by_project_id = CASE WHEN ?2 IN ('draft','ready') THEN NULL ELSE claimed_by_project_id END,
                 branch_name = CASE WHEN ?2 IN ('draft','ready') THEN NULL ELSE branch_name END,
                 base_branch = CASE WHEN ?2 IN ('draft','ready') THEN NULL ELSE base_branch END,
                 claimed_at = CASE WHEN ?2 IN ('draft','ready') THEN NULL ELSE claimed_at END
             WHERE task_id = ?1",
            params![id.as_str(), status.to_string(), now, completed_at],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("task", id));
        }
        self.get_task(id)
    }

    /// Claim a specific task for a controller.
    pub fn claim_task(
        &self,
        id: &TaskId,
        controller_id: &ControllerId,
        project_id: Option<&str>,
        branch_name: Option<&str>,
        base_branch: Option<&str>,
        now: &str,
    ) -> Result<Task, StoreError> {
        let changed = self.conn.execute(
            "UPDATE tasks SET status = 'claimed', claimed_by_controller_id = ?2,
                 claimed_by_project_id = ?3, branch_name = ?4, base_branch = ?5,
                 claimed_at = ?6, updated_at = ?6
             WHERE task_id = ?1",
            params![
                id.as_str(),
                controller_id.as_str(),
                project_id,
                branch_name,
                base_branch,
                now
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("task", id));
        }
        self.get_task(id)
    }

    /// Claim the first ready task in order, if any.
    pub fn pull_task(
        &self,
        scope: &Scope,
        controller_id: &ControllerId,
        repository_id: Option<&RepositoryId>,
        project_id: Option<&str>,
        now: &str,
    ) -> Result<Option<Task>, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let next: Option<String> = tx
            .query_row(
                "SELECT task_id FROM tasks
                 WHERE tenant_id = ?1 AND user_id = ?2 AND workspace_id = ?3
                   AND status = 'ready'
                   AND (?4 IS NULL OR repository_id = ?4)
                   AND (?5 IS NULL OR project_id = ?5)
                 ORDER BY order_index, task_id LIMIT 1",
                params![
                    scope.tenant_id,
                    scope.user_id,
                    scope.workspace_id,
                    repository_id.map(|id| id.as_str().to_owned()),
                    project_id,
                ],
                |row| row.get(0),
            )
            .optional()?;

        let Some(task_id) = next else {
            tx.commit()?;
            return Ok(None);
        };
        tx.execute(
            "UPDATE tasks SET status = 'claimed', claimed_by_controller_id = ?2,
                 claimed_by_project_id = ?3, claimed_at = ?4, updated_at = ?4
             WHERE task_id = ?1",
            params![task_id, controller_id.as_str(), project_id, now],
        )?;
        tx.commit()?;
        self.get_task(&TaskId::from_string(task_id)).map(Some)
    }
}

fn opt_json<T: serde::Serialize>(value: Option<&T>) -> Result<Option<String>, StoreError> {
    value.map(|v| serde_json::to_string(v)).transpose().map_err(StoreError::from)
}

fn scope_from_row(row: &Row<'_>) -> rusqlite::Result<Scope> {
    Ok(Scope {
        tenant_id: row.get("tenant_id")?,
        user_id: row.get("user_id")?,
        workspace_id: row.get("workspace_id")?,
    })
}

fn json_column(row: &Row<'_>, name: &str) -> rusqlite::Result<serde_json::Value> {
    let raw: String = row.get(name)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn opt_json_column<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    name: &str,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(name)?;
    raw.map(|s| {
        serde_json::from_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

fn directory_from_row(row: &Row<'_>) -> rusqlite::Result<Directory> {
    Ok(Directory {
        directory_id: DirectoryId::from_string(row.get::<_, String>("directory_id")?),
        path: row.get("path")?,
        scope: scope_from_row(row)?,
        created_at: row.get("created_at")?,
        archived_at: row.get("archived_at")?,
    })
}

fn repository_from_row(row: &Row<'_>) -> rusqlite::Result<Repository> {
    Ok(Repository {
        repository_id: RepositoryId::from_string(row.get::<_, String>("repository_id")?),
        scope: scope_from_row(row)?,
        name: row.get("name")?,
        remote_url: row.get("remote_url")?,
        default_branch: row.get("default_branch")?,
        metadata: json_column(row, "metadata")?,
        created_at: row.get("created_at")?,
        archived_at: row.get("archived_at")?,
    })
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let status_raw: String = row.get("status")?;
    let agent_raw: String = row.get("agent_type")?;
    Ok(Conversation {
        thread_id: ThreadId::from_string(row.get::<_, String>("thread_id")?),
        directory_id: DirectoryId::from_string(row.get::<_, String>("directory_id")?),
        scope: scope_from_row(row)?,
        worktree_id: row.get("worktree_id")?,
        title: row.get("title")?,
        agent_type: AgentType::parse(&agent_raw).unwrap_or(AgentType::Claude),
        adapter_state: json_column(row, "adapter_state")?,
        created_at: row.get("created_at")?,
        archived_at: row.get("archived_at")?,
        runtime: RuntimeSnapshot {
            status: SessionStatus::parse(&status_raw).unwrap_or(SessionStatus::Exited),
            status_model: row.get("status_model")?,
            live: row.get::<_, i64>("live")? != 0,
            attention_reason: row.get("attention_reason")?,
            process_id: row.get("process_id")?,
            last_event_at: row.get("last_event_at")?,
            last_exit: opt_json_column::<ExitStatus>(row, "last_exit")?,
            controller: opt_json_column::<Controller>(row, "controller")?,
        },
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status_raw: String = row.get("status")?;
    let kind_raw: String = row.get("scope_kind")?;
    Ok(Task {
        task_id: TaskId::from_string(row.get::<_, String>("task_id")?),
        scope: scope_from_row(row)?,
        scope_kind: TaskScopeKind::parse(&kind_raw).unwrap_or(TaskScopeKind::Repository),
        repository_id: row
            .get::<_, Option<String>>("repository_id")?
            .map(RepositoryId::from_string),
        project_id: row.get("project_id")?,
        title: row.get("title")?,
        body: row.get("body")?,
        status: TaskStatus::parse(&status_raw).unwrap_or(TaskStatus::Draft),
        order_index: row.get("order_index")?,
        claimed_by_controller_id: row
            .get::<_, Option<String>>("claimed_by_controller_id")?
            .map(ControllerId::from_string),
        claimed_by_project_id: row.get("claimed_by_project_id")?,
        branch_name: row.get("branch_name")?,
        base_branch: row.get("base_branch")?,
        claimed_at: row.get("claimed_at")?,
        completed_at: row.get("completed_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
