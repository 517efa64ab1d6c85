// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contract for workflows, the progress cursor, the status history
//! and the ephemeral workflow data store. Defined here, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Implementations |
//! |-------|----------------|
//! | `WorkflowRepository` | `InMemoryWorkflowRepository`, `PostgresWorkflowRepository` |
//!
//! The backend is selected at server startup: Postgres when
//! `spec.server.database_url` is configured, in-memory otherwise.

use crate::domain::workflow::{
    Action, ActionStatusReport, Workflow, WorkflowContext, WorkflowData, WorkflowEventRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Version number meaning "the newest stored version".
pub const LATEST_VERSION: i32 = 0;

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Store a workflow definition, its initial cursor and its worker assignments.
    async fn create_workflow(
        &self,
        workflow: &Workflow,
        worker_ids: &[String],
    ) -> Result<(), RepositoryError>;

    async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow, RepositoryError>;

    async fn get_workflow_context(
        &self,
        workflow_id: &str,
    ) -> Result<WorkflowContext, RepositoryError>;

    /// Overwrite the cursor row. Must be atomic.
    async fn update_workflow_state(&self, context: &WorkflowContext) -> Result<(), RepositoryError>;

    /// Append an immutable status-history row.
    async fn insert_workflow_event(
        &self,
        report: &ActionStatusReport,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// `update_workflow_state` and `insert_workflow_event` as one atomic
    /// write. On error neither change is visible.
    async fn record_action_status(
        &self,
        context: &WorkflowContext,
        report: &ActionStatusReport,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    async fn get_workflow_actions(&self, workflow_id: &str) -> Result<Vec<Action>, RepositoryError>;

    /// Status history in insertion order.
    async fn list_workflow_events(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<WorkflowEventRecord>, RepositoryError>;

    /// Ids of the workflows with at least one action owned by `worker_id`.
    async fn get_workflows_for_worker(&self, worker_id: &str)
        -> Result<Vec<String>, RepositoryError>;

    /// `version == LATEST_VERSION` selects the newest version.
    async fn get_workflow_data(
        &self,
        workflow_id: &str,
        version: i32,
    ) -> Result<WorkflowData, RepositoryError>;

    async fn get_workflow_metadata(
        &self,
        workflow_id: &str,
        version: i32,
    ) -> Result<Vec<u8>, RepositoryError> {
        Ok(self.get_workflow_data(workflow_id, version).await?.metadata)
    }

    /// Newest stored version, `0` when nothing was stored yet.
    async fn get_workflow_data_version(&self, workflow_id: &str) -> Result<i32, RepositoryError>;

    /// Store a new version and return its number.
    async fn insert_workflow_data(
        &self,
        workflow_id: &str,
        metadata: &[u8],
        data: &[u8],
    ) -> Result<i32, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RepositoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound(_))
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
