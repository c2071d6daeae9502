// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directory and repository handlers.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use harness_core::{Clock, DirectoryId, ObservedPayload, RepositoryId, SystemClock};
use harness_wire::CommandError;

use crate::lifecycle::Gateway;

use super::commands::{store_error, to_json};

pub(crate) fn directory_upsert(
    gateway: &Arc<Gateway>,
    path: &str,
) -> Result<serde_json::Value, CommandError> {
    if !Path::new(path).is_absolute() {
        return Err(CommandError::new(
            "invalid-path",
            format!("directory path must be absolute: {path:?}"),
        ));
    }
    let normalized = normalize_path(path);
    let now = SystemClock.now_rfc3339();
    let directory = gateway
        .store
        .lock()
        .upsert_directory(&gateway.scope, &normalized, &now)
        .map_err(store_error)?;

    // Long read off the command path: probe git state on a worker and
    // publish when it lands.
    let gateway_bg = Arc::clone(gateway);
    let directory_id = directory.directory_id.clone();
    let probe_path = normalized.clone();
    tokio::task::spawn_blocking(move || {
        let branch = read_git_branch(Path::new(&probe_path));
        gateway_bg.hub.publish(
            &gateway_bg.scope,
            ObservedPayload::DirectoryGitUpdated { directory_id, branch },
        );
    });

    to_json(&json!({ "directory": directory }))
}

pub(crate) fn directory_list(gateway: &Arc<Gateway>) -> Result<serde_json::Value, CommandError> {
    let directories =
        gateway.store.lock().list_directories(&gateway.scope).map_err(store_error)?;
    to_json(&json!({ "directories": directories }))
}

pub(crate) fn directory_archive(
    gateway: &Arc<Gateway>,
    directory_id: &DirectoryId,
) -> Result<serde_json::Value, CommandError> {
    let now = SystemClock.now_rfc3339();
    gateway.store.lock().archive_directory(directory_id, &now).map_err(store_error)?;
    Ok(json!({}))
}

pub(crate) fn repository_upsert(
    gateway: &Arc<Gateway>,
    name: &str,
    remote_url: &str,
    default_branch: Option<&str>,
    metadata: Option<&serde_json::Value>,
) -> Result<serde_json::Value, CommandError> {
    let now = SystemClock.now_rfc3339();
    let (repository, created) = gateway
        .store
        .lock()
        .upsert_repository(&gateway.scope, name, remote_url, default_branch, metadata, &now)
        .map_err(store_error)?;

    let payload = if created {
        ObservedPayload::RepositoryUpserted { repository: Box::new(repository.clone()) }
    } else {
        ObservedPayload::RepositoryUpdated { repository: Box::new(repository.clone()) }
    };
    gateway.hub.publish(&gateway.scope, payload);
    to_json(&json!({ "repository": repository }))
}

pub(crate) fn repository_list(gateway: &Arc<Gateway>) -> Result<serde_json::Value, CommandError> {
    let repositories =
        gateway.store.lock().list_repositories(&gateway.scope).map_err(store_error)?;
    to_json(&json!({ "repositories": repositories }))
}

pub(crate) fn repository_update(
    gateway: &Arc<Gateway>,
    repository_id: &RepositoryId,
    name: Option<&str>,
    default_branch: Option<&str>,
    metadata: Option<&serde_json::Value>,
) -> Result<serde_json::Value, CommandError> {
    let repository = gateway
        .store
        .lock()
        .update_repository(repository_id, name, default_branch, metadata)
        .map_err(store_error)?;
    gateway.hub.publish(
        &gateway.scope,
        ObservedPayload::RepositoryUpdated { repository: Box::new(repository.clone()) },
    );
    to_json(&json!({ "repository": repository }))
}

pub(crate) fn repository_archive(
    gateway: &Arc<Gateway>,
    repository_id: &RepositoryId,
) -> Result<serde_json::Value, CommandError> {
    let now = SystemClock.now_rfc3339();
    gateway.store.lock().archive_repository(repository_id, &now).map_err(store_error)?;
    gateway.hub.publish(
        &gateway.scope,
        ObservedPayload::RepositoryArchived { repository_id: repository_id.clone() },
    );
    Ok(json!({}))
}

/// Strip redundant separators without touching symlinks.
fn normalize_path(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len());
    let mut last_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !last_slash {
                normalized.push(c);
            }
            last_slash = true;
        } else {
            normalized.push(c);
            last_slash = false;
        }
    }
    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// Current branch from `.git/HEAD`: a symbolic ref yields the branch name, a
/// detached head yields the short hash, no repository yields `None`.
fn read_git_branch(dir: &Path) -> Option<String> {
    let head = std::fs::read_to_string(dir.join(".git").join("HEAD")).ok()?;
    let head = head.trim();
    if let Some(reference) = head.strip_prefix("ref: ") {
        return Some(
            reference.strip_prefix("refs/heads/").unwrap_or(reference).to_string(),
        );
    }
    if head.len() >= 8 {
        debug!(dir = %dir.display(), "detached head");
        return Some(head[..8].to_string());
    }
    None
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
