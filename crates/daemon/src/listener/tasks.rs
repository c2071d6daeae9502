// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task-board handlers.

use std::sync::Arc;

use serde_json::json;

use harness_core::{
    Clock, ControllerId, ObservedPayload, RepositoryId, SystemClock, Task, TaskId, TaskScopeKind,
    TaskStatus,
};
use harness_wire::CommandError;

use crate::lifecycle::Gateway;

use super::commands::{store_error, to_json};

pub(crate) fn create(
    gateway: &Arc<Gateway>,
    scope_kind: TaskScopeKind,
    repository_id: Option<&RepositoryId>,
    project_id: Option<&str>,
    title: &str,
    body: Option<&str>,
) -> Result<serde_json::Value, CommandError> {
    let now = SystemClock.now_rfc3339();
    let task = gateway
        .store
        .lock()
        .create_task(&gateway.scope, scope_kind, repository_id, project_id, title, body, &now)
        .map_err(store_error)?;
    publish(gateway, ObservedPayload::TaskCreated { task: Box::new(task.clone()) });
    to_json(&json!({ "task": task }))
}

pub(crate) fn update(
    gateway: &Arc<Gateway>,
    task_id: &TaskId,
    title: Option<&str>,
    body: Option<&str>,
) -> Result<serde_json::Value, CommandError> {
    let now = SystemClock.now_rfc3339();
    let task =
        gateway.store.lock().update_task(task_id, title, body, &now).map_err(store_error)?;
    publish(gateway, ObservedPayload::TaskUpdated { task: Box::new(task.clone()) });
    to_json(&json!({ "task": task }))
}

pub(crate) fn delete(
    gateway: &Arc<Gateway>,
    task_id: &TaskId,
) -> Result<serde_json::Value, CommandError> {
    gateway.store.lock().delete_task(task_id).map_err(store_error)?;
    publish(gateway, ObservedPayload::TaskDeleted { task_id: task_id.clone() });
    Ok(json!({}))
}

pub(crate) fn list(
    gateway: &Arc<Gateway>,
    status: Option<TaskStatus>,
    repository_id: Option<&RepositoryId>,
) -> Result<serde_json::Value, CommandError> {
    let tasks = gateway
        .store
        .lock()
        .list_tasks(&gateway.scope, status, repository_id)
        .map_err(store_error)?;
    to_json(&json!({ "tasks": tasks }))
}

pub(crate) fn reorder(
    gateway: &Arc<Gateway>,
    task_ids: &[TaskId],
) -> Result<serde_json::Value, CommandError> {
    let now = SystemClock.now_rfc3339();
    gateway.store.lock().reorder_tasks(task_ids, &now).map_err(store_error)?;
    publish(gateway, ObservedPayload::TaskReordered { task_ids: task_ids.to_vec() });
    Ok(json!({}))
}

pub(crate) fn set_status(
    gateway: &Arc<Gateway>,
    task_id: &TaskId,
    status: TaskStatus,
) -> Result<serde_json::Value, CommandError> {
    let now = SystemClock.now_rfc3339();
    let task =
        gateway.store.lock().set_task_status(task_id, status, &now).map_err(store_error)?;
    publish(gateway, ObservedPayload::TaskUpdated { task: Box::new(task.clone()) });
    to_json(&json!({ "task": task }))
}

pub(crate) fn claim(
    gateway: &Arc<Gateway>,
    task_id: &TaskId,
    controller_id: &ControllerId,
    project_id: Option<&str>,
    branch_name: Option<&str>,
    base_branch: Option<&str>,
) -> Result<serde_json::Value, CommandError> {
    let now = SystemClock.now_rfc3339();
    let task = gateway
        .store
        .lock()
        .claim_task(task_id, controller_id, project_id, branch_name, base_branch, &now)
        .map_err(store_error)?;
    publish(gateway, ObservedPayload::TaskUpdated { task: Box::new(task.clone()) });
    to_json(&json!({ "task": task }))
}

pub(crate) fn pull(
    gateway: &Arc<Gateway>,
    controller_id: &ControllerId,
    repository_id: Option<&RepositoryId>,
    project_id: Option<&str>,
) -> Result<serde_json::Value, CommandError> {
    let now = SystemClock.now_rfc3339();
    let pulled: Option<Task> = gateway
        .store
        .lock()
        .pull_task(&gateway.scope, controller_id, repository_id, project_id, &now)
        .map_err(store_error)?;
    if let Some(task) = &pulled {
        publish(gateway, ObservedPayload::TaskUpdated { task: Box::new(task.clone()) });
    }
    to_json(&json!({ "task": pulled }))
}

fn publish(gateway: &Arc<Gateway>, payload: ObservedPayload) {
    gateway.hub.publish(&gateway.scope, payload);
}
