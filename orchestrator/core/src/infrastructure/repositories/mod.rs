// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of `WorkflowRepository`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist workflows, cursors, status history and workflow data
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **PostgresWorkflowRepository** - production storage, cursor updates in transactions
//! - **InMemoryWorkflowRepository** - HashMap-backed storage for development and tests

pub mod postgres_workflow;

pub use postgres_workflow::PostgresWorkflowRepository;

use crate::domain::repository::{RepositoryError, WorkflowRepository, LATEST_VERSION};
use crate::domain::workflow::{
    Action, ActionStatusReport, Workflow, WorkflowContext, WorkflowData, WorkflowEventRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Store {
    workflows: HashMap<String, Workflow>,
    contexts: HashMap<String, WorkflowContext>,
    events: Vec<WorkflowEventRecord>,
    // worker id -> workflow ids, in creation order
    assignments: HashMap<String, Vec<String>>,
    data: HashMap<String, Vec<WorkflowData>>,
}

impl Store {
    fn write_state(&mut self, context: &WorkflowContext) -> Result<(), RepositoryError> {
        let slot = self
            .contexts
            .get_mut(&context.workflow_id)
            .ok_or_else(|| not_found(&context.workflow_id))?;
        *slot = context.clone();
        Ok(())
    }

    fn write_event(
        &mut self,
        report: &ActionStatusReport,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        if !self.workflows.contains_key(&report.workflow_id) {
            return Err(not_found(&report.workflow_id));
        }
        self.events.push(WorkflowEventRecord::from_report(report, at));
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryWorkflowRepository {
    store: Arc<RwLock<Store>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(workflow_id: &str) -> RepositoryError {
    RepositoryError::NotFound(format!("workflow {}", workflow_id))
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn create_workflow(
        &self,
        workflow: &Workflow,
        worker_ids: &[String],
    ) -> Result<(), RepositoryError> {
        let mut store = self.store.write();
        if store.workflows.contains_key(&workflow.id) {
            return Err(RepositoryError::Database(format!(
                "workflow {} already exists",
                workflow.id
            )));
        }
        store
            .workflows
            .insert(workflow.id.clone(), workflow.clone());
        store
            .contexts
            .insert(workflow.id.clone(), WorkflowContext::new(workflow));
        for worker_id in worker_ids {
            store
                .assignments
                .entry(worker_id.clone())
                .or_default()
                .push(workflow.id.clone());
        }
        Ok(())
    }

    async fn get_workflow(&self, workflow_id: &str) -> Result<Workflow, RepositoryError> {
        self.store
            .read()
            .workflows
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| not_found(workflow_id))
    }

    async fn get_workflow_context(
        &self,
        workflow_id: &str,
    ) -> Result<WorkflowContext, RepositoryError> {
        self.store
            .read()
            .contexts
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| not_found(workflow_id))
    }

    async fn update_workflow_state(&self, context: &WorkflowContext) -> Result<(), RepositoryError> {
        self.store.write().write_state(context)
    }

    async fn insert_workflow_event(
        &self,
        report: &ActionStatusReport,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.store.write().write_event(report, at)
    }

    async fn record_action_status(
        &self,
        context: &WorkflowContext,
        report: &ActionStatusReport,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut store = self.store.write();
        if report.workflow_id != context.workflow_id {
            return Err(RepositoryError::Database(format!(
                "report for workflow {} cannot move the cursor of {}",
                report.workflow_id, context.workflow_id
            )));
        }
        if !store.workflows.contains_key(&report.workflow_id) {
            return Err(not_found(&report.workflow_id));
        }
        store.write_state(context)?;
        store.write_event(report, at)
    }

    async fn get_workflow_actions(&self, workflow_id: &str) -> Result<Vec<Action>, RepositoryError> {
        self.store
            .read()
            .workflows
            .get(workflow_id)
            .map(|w| w.actions.clone())
            .ok_or_else(|| not_found(workflow_id))
    }

    async fn list_workflow_events(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<WorkflowEventRecord>, RepositoryError> {
        Ok(self
            .store
            .read()
            .events
            .iter()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn get_workflows_for_worker(
        &self,
        worker_id: &str,
    ) -> Result<Vec<String>, RepositoryError> {
        Ok(self
            .store
            .read()
            .assignments
            .get(worker_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_workflow_data(
        &self,
        workflow_id: &str,
        version: i32,
    ) -> Result<WorkflowData, RepositoryError> {
        let store = self.store.read();
        let versions = store
            .data
            .get(workflow_id)
            .ok_or_else(|| not_found(workflow_id))?;
        let found = if version == LATEST_VERSION {
            versions.last()
        } else {
            versions.iter().find(|d| d.version == version)
        };
        found.cloned().ok_or_else(|| {
            RepositoryError::NotFound(format!("workflow {} data version {}", workflow_id, version))
        })
    }

    async fn get_workflow_data_version(&self, workflow_id: &str) -> Result<i32, RepositoryError> {
        Ok(self
            .store
            .read()
            .data
            .get(workflow_id)
            .and_then(|versions| versions.last())
            .map(|d| d.version)
            .unwrap_or(0))
    }

    async fn insert_workflow_data(
        &self,
        workflow_id: &str,
        metadata: &[u8],
        data: &[u8],
    ) -> Result<i32, RepositoryError> {
        let mut store = self.store.write();
        if !store.workflows.contains_key(workflow_id) {
            return Err(not_found(workflow_id));
        }
        let versions = store.data.entry(workflow_id.to_string()).or_default();
        let version = versions.last().map(|d| d.version).unwrap_or(0) + 1;
        versions.push(WorkflowData {
            workflow_id: workflow_id.to_string(),
            version,
            metadata: metadata.to_vec(),
            data: data.to_vec(),
        });
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::ActionState;

    fn workflow() -> Workflow {
        Workflow::new(
            "wf-1",
            vec![
                Action {
                    id: "1".to_string(),
                    name: "disk-wipe".to_string(),
                    image: "wipe".to_string(),
                    owner_worker_id: "w1".to_string(),
                    ..Default::default()
                },
                Action {
                    id: "2".to_string(),
                    name: "install".to_string(),
                    image: "install".to_string(),
                    owner_worker_id: "w2".to_string(),
                    ..Default::default()
                },
            ],
        )
    }

    #[tokio::test]
    async fn test_create_and_load() {
        let repo = InMemoryWorkflowRepository::new();
        let wf = workflow();
        repo.create_workflow(&wf, &wf.worker_ids()).await.unwrap();

        assert_eq!(repo.get_workflow("wf-1").await.unwrap(), wf);
        assert_eq!(repo.get_workflow_actions("wf-1").await.unwrap().len(), 2);
        let ctx = repo.get_workflow_context("wf-1").await.unwrap();
        assert_eq!(ctx.current_action_state, ActionState::Pending);
        assert_eq!(ctx.total_number_of_actions, 2);
        assert_eq!(repo.get_workflows_for_worker("w2").await.unwrap(), vec!["wf-1"]);
        assert!(repo.get_workflows_for_worker("w9").await.unwrap().is_empty());

        assert!(repo.create_workflow(&wf, &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_workflow_is_not_found() {
        let repo = InMemoryWorkflowRepository::new();
        assert!(repo.get_workflow_context("nope").await.unwrap_err().is_not_found());
        assert!(repo.get_workflow_actions("nope").await.unwrap_err().is_not_found());
        let ctx = WorkflowContext {
            workflow_id: "nope".to_string(),
            ..Default::default()
        };
        let report = ActionStatusReport {
            workflow_id: "nope".to_string(),
            ..Default::default()
        };
        assert!(repo
            .record_action_status(&ctx, &report, Utc::now())
            .await
            .unwrap_err()
            .is_not_found());
        assert!(repo.list_workflow_events("nope").await.unwrap().is_empty());
        assert!(repo.update_workflow_state(&ctx).await.unwrap_err().is_not_found());
        assert!(repo
            .insert_workflow_event(&report, Utc::now())
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_data_versions() {
        let repo = InMemoryWorkflowRepository::new();
        let wf = workflow();
        repo.create_workflow(&wf, &[]).await.unwrap();

        assert_eq!(repo.get_workflow_data_version("wf-1").await.unwrap(), 0);
        assert!(repo.get_workflow_data("wf-1", 0).await.unwrap_err().is_not_found());

        assert_eq!(repo.insert_workflow_data("wf-1", b"m1", b"d1").await.unwrap(), 1);
        assert_eq!(repo.insert_workflow_data("wf-1", b"m2", b"d2").await.unwrap(), 2);
        assert_eq!(repo.get_workflow_data_version("wf-1").await.unwrap(), 2);

        assert_eq!(repo.get_workflow_data("wf-1", 0).await.unwrap().data, b"d2");
        assert_eq!(repo.get_workflow_data("wf-1", 1).await.unwrap().data, b"d1");
        assert_eq!(repo.get_workflow_metadata("wf-1", 1).await.unwrap(), b"m1");
        assert!(repo.get_workflow_data("wf-1", 7).await.is_err());

        assert!(repo.insert_workflow_data("ghost", b"", b"").await.is_err());
    }

    #[tokio::test]
    async fn test_status_and_history_written_together() {
        let repo = InMemoryWorkflowRepository::new();
        let wf = workflow();
        repo.create_workflow(&wf, &[]).await.unwrap();

        for status in [ActionState::Running, ActionState::Success] {
            let mut ctx = repo.get_workflow_context("wf-1").await.unwrap();
            ctx.current_action_state = status;
            let report = ActionStatusReport {
                workflow_id: "wf-1".to_string(),
                worker_id: "w1".to_string(),
                action_name: "disk-wipe".to_string(),
                action_status: status,
                ..Default::default()
            };
            repo.record_action_status(&ctx, &report, Utc::now()).await.unwrap();
        }

        let events = repo.list_workflow_events("wf-1").await.unwrap();
        let states: Vec<ActionState> = events.iter().map(|e| e.action_status).collect();
        assert_eq!(states, vec![ActionState::Running, ActionState::Success]);
        assert_eq!(
            repo.get_workflow_context("wf-1").await.unwrap().current_action_state,
            ActionState::Success
        );
    }

    #[tokio::test]
    async fn test_rejected_write_changes_nothing() {
        let repo = InMemoryWorkflowRepository::new();
        let wf = workflow();
        repo.create_workflow(&wf, &[]).await.unwrap();

        let mut ctx = repo.get_workflow_context("wf-1").await.unwrap();
        ctx.current_action_state = ActionState::Running;
        let report = ActionStatusReport {
            workflow_id: "wf-other".to_string(),
            action_status: ActionState::Running,
            ..Default::default()
        };
        assert!(repo.record_action_status(&ctx, &report, Utc::now()).await.is_err());

        assert_eq!(
            repo.get_workflow_context("wf-1").await.unwrap().current_action_state,
            ActionState::Pending
        );
        assert!(repo.list_workflow_events("wf-1").await.unwrap().is_empty());
    }
}
