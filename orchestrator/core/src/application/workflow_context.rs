// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Workflow Context Service
//!
//! Server-side owner of the progress cursor. Answers "what should worker W do
//! next?" and accepts or rejects the status reports that advance the cursor.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Turn determination, report validation, cursor persistence
//! - **Collaborators:**
//!   - Domain: `cursor` rules, `WorkflowContext`
//!   - Infrastructure: `WorkflowRepository`

use crate::domain::cursor::{self, CursorError};
use crate::domain::repository::{RepositoryError, WorkflowRepository};
use crate::domain::workflow::{Action, ActionStatusReport, Workflow, WorkflowContext, WorkflowData};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Errors surfaced to RPC callers. Each variant maps to one gRPC status code.
#[derive(Debug, Error)]
pub enum WorkflowContextError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    FailedPrecondition(String),

    #[error("{0}")]
    NotFound(String),

    /// Storage failure; the cursor has not moved and the call may be retried
    #[error("{0}")]
    Aborted(String),
}

impl From<CursorError> for WorkflowContextError {
    fn from(err: CursorError) -> Self {
        match err {
            CursorError::ActionMismatch { .. } => {
                WorkflowContextError::InvalidArgument(err.to_string())
            }
            CursorError::Finished(_) | CursorError::IndexOutOfRange { .. } => {
                WorkflowContextError::FailedPrecondition(err.to_string())
            }
        }
    }
}

fn storage_error(err: RepositoryError) -> WorkflowContextError {
    match err {
        RepositoryError::NotFound(msg) => WorkflowContextError::NotFound(msg),
        other => WorkflowContextError::Aborted(other.to_string()),
    }
}

fn require(value: &str, field: &str) -> Result<(), WorkflowContextError> {
    if value.is_empty() {
        return Err(WorkflowContextError::InvalidArgument(format!(
            "{} is required",
            field
        )));
    }
    Ok(())
}

pub struct WorkflowContextService {
    repository: Arc<dyn WorkflowRepository>,
    // workflow id -> lock held while a report reads and writes that cursor
    report_locks: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WorkflowContextService {
    pub fn new(repository: Arc<dyn WorkflowRepository>) -> Self {
        Self {
            repository,
            report_locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    fn report_lock(&self, workflow_id: &str) -> Arc<Mutex<()>> {
        self.report_locks
            .lock()
            .entry(workflow_id.to_string())
            .or_default()
            .clone()
    }

    /// Forget the lock once no other report holds or waits on it.
    fn release_report_lock(&self, workflow_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.report_locks.lock();
        // One reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(workflow_id);
        }
    }

    /// Register a workflow and create its `Pending` cursor.
    pub async fn create_workflow(
        &self,
        workflow: Workflow,
    ) -> Result<WorkflowContext, WorkflowContextError> {
        workflow
            .validate()
            .map_err(|e| WorkflowContextError::InvalidArgument(e.to_string()))?;

        let worker_ids = workflow.worker_ids();
        self.repository
            .create_workflow(&workflow, &worker_ids)
            .await
            .map_err(|e| WorkflowContextError::Aborted(e.to_string()))?;

        info!(
            workflow_id = %workflow.id,
            actions = workflow.actions.len(),
            workers = ?worker_ids,
            "Workflow created"
        );
        Ok(WorkflowContext::new(&workflow))
    }

    /// Contexts of the workflows for which `worker_id` currently holds the turn.
    pub async fn get_workflow_contexts(
        &self,
        worker_id: &str,
    ) -> Result<Vec<WorkflowContext>, WorkflowContextError> {
        require(worker_id, "worker_id")?;

        let workflow_ids = self
            .repository
            .get_workflows_for_worker(worker_id)
            .await
            .map_err(|e| WorkflowContextError::Aborted(e.to_string()))?;

        let mut contexts = Vec::new();
        for workflow_id in workflow_ids {
            let context = self
                .repository
                .get_workflow_context(&workflow_id)
                .await
                .map_err(|e| WorkflowContextError::Aborted(e.to_string()))?;

            if self.is_applicable_to_send(&context, worker_id).await {
                contexts.push(context);
            }
        }
        Ok(contexts)
    }

    async fn is_applicable_to_send(&self, context: &WorkflowContext, worker_id: &str) -> bool {
        if context.current_action_state.is_failure() {
            return false;
        }
        match self.repository.get_workflow_actions(&context.workflow_id).await {
            Ok(actions) => cursor::is_applicable_to_send(context, &actions, worker_id),
            Err(e) => {
                warn!(
                    workflow_id = %context.workflow_id,
                    error = %e,
                    "Failed to load workflow actions, skipping"
                );
                false
            }
        }
    }

    /// Validate `report` against the cursor and persist the advanced cursor.
    pub async fn report_action_status(
        &self,
        report: &ActionStatusReport,
    ) -> Result<WorkflowContext, WorkflowContextError> {
        let result = self.apply_report(report).await;
        let outcome = match &result {
            Ok(_) => "accepted",
            Err(WorkflowContextError::InvalidArgument(_)) => "invalid",
            Err(WorkflowContextError::FailedPrecondition(_)) => "precondition",
            Err(WorkflowContextError::NotFound(_)) => "not_found",
            Err(WorkflowContextError::Aborted(_)) => "aborted",
        };
        metrics::counter!("ironworks_status_reports_total", "result" => outcome).increment(1);
        result
    }

    async fn apply_report(
        &self,
        report: &ActionStatusReport,
    ) -> Result<WorkflowContext, WorkflowContextError> {
        require(&report.workflow_id, "workflow_id")?;
        require(&report.task_name, "task_name")?;
        require(&report.action_name, "action_name")?;

        let lock = self.report_lock(&report.workflow_id);
        let result = {
            let _guard = lock.lock().await;
            self.advance_cursor(report).await
        };
        self.release_report_lock(&report.workflow_id, lock);
        result
    }

    async fn advance_cursor(
        &self,
        report: &ActionStatusReport,
    ) -> Result<WorkflowContext, WorkflowContextError> {
        let context = self
            .repository
            .get_workflow_context(&report.workflow_id)
            .await
            .map_err(storage_error)?;
        let actions = self
            .repository
            .get_workflow_actions(&report.workflow_id)
            .await
            .map_err(storage_error)?;

        let next = cursor::advance(&context, &actions, report).map_err(|e| {
            warn!(
                workflow_id = %report.workflow_id,
                worker_id = %report.worker_id,
                action = %report.action_name,
                status = %report.action_status,
                error = %e,
                "Status report rejected"
            );
            WorkflowContextError::from(e)
        })?;

        self.repository
            .record_action_status(&next, report, Utc::now())
            .await
            .map_err(|e| WorkflowContextError::Aborted(e.to_string()))?;

        debug!(
            workflow_id = %next.workflow_id,
            index = next.current_action_index,
            state = %next.current_action_state,
            "Cursor advanced"
        );
        Ok(next)
    }

    pub async fn get_workflow_actions(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<Action>, WorkflowContextError> {
        require(workflow_id, "workflow_id")?;
        self.repository
            .get_workflow_actions(workflow_id)
            .await
            .map_err(storage_error)
    }

    /// Stored data at `version` (`0` = latest). Empty at version 0 when nothing
    /// was stored yet.
    pub async fn get_workflow_data(
        &self,
        workflow_id: &str,
        version: i32,
    ) -> Result<WorkflowData, WorkflowContextError> {
        require(workflow_id, "workflow_id")?;
        match self.repository.get_workflow_data(workflow_id, version).await {
            Ok(data) => Ok(data),
            Err(RepositoryError::NotFound(_)) => Ok(WorkflowData {
                workflow_id: workflow_id.to_string(),
                ..Default::default()
            }),
            Err(e) => Err(WorkflowContextError::Aborted(e.to_string())),
        }
    }

    pub async fn get_workflow_metadata(
        &self,
        workflow_id: &str,
        version: i32,
    ) -> Result<Vec<u8>, WorkflowContextError> {
        require(workflow_id, "workflow_id")?;
        match self
            .repository
            .get_workflow_metadata(workflow_id, version)
            .await
        {
            Ok(metadata) => Ok(metadata),
            Err(RepositoryError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(WorkflowContextError::Aborted(e.to_string())),
        }
    }

    pub async fn get_workflow_data_version(
        &self,
        workflow_id: &str,
    ) -> Result<i32, WorkflowContextError> {
        require(workflow_id, "workflow_id")?;
        self.repository
            .get_workflow_data_version(workflow_id)
            .await
            .map_err(|e| WorkflowContextError::Aborted(e.to_string()))
    }

    /// Store a new data version and return its number.
    pub async fn update_workflow_data(
        &self,
        workflow_id: &str,
        metadata: &[u8],
        data: &[u8],
    ) -> Result<i32, WorkflowContextError> {
        require(workflow_id, "workflow_id")?;
        let version = self
            .repository
            .insert_workflow_data(workflow_id, metadata, data)
            .await
            .map_err(storage_error)?;
        debug!(workflow_id, version, "Workflow data updated");
        Ok(version)
    }

    /// Workflow definition, for dispatching to agents.
    pub async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow, WorkflowContextError> {
        require(workflow_id, "workflow_id")?;
        self.repository
            .get_workflow(workflow_id)
            .await
            .map_err(storage_error)
    }
}
