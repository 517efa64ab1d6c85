// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Workflow Domain Model
//!
//! Core entities and value objects for provisioning workflows. A workflow is an
//! ordered list of containerized actions, each bound to the worker that must run it.
//! Execution order is array order; there is no dependency graph.
//!
//! # Architectural Context
//!
//! - **Bounded Context:** Workflow Execution Context
//! - **Aggregate Root:** Workflow
//! - **Mutable State:** WorkflowContext (the progress cursor), owned by the server
//!
//! # Design Principles
//!
//! 1. **Immutability:** Workflow and Action definitions never change once a workflow starts
//! 2. **Single Cursor:** `WorkflowContext` is the only mutable server-side record
//! 3. **Self-Validating:** `Workflow::validate` rejects definitions the agent cannot run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Entities: Action and Workflow
// ============================================================================

/// One containerized step of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Action {
    /// Unique within the workflow
    pub id: String,
    pub name: String,
    /// Grouping label shared by the actions of one task
    pub task_name: String,
    pub image: String,
    /// Container entrypoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Bind specs in `source:target[:mode]` form
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_namespace: Option<String>,
    /// The physical agent that must run this action
    pub owner_worker_id: String,
    /// Zero means no limit
    #[serde(default)]
    pub timeout_seconds: u64,
}

impl Action {
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_seconds))
        }
    }

    /// Environment flattened to `KEY=VALUE` pairs, sorted for stable container configs
    pub fn env_pairs(&self) -> Vec<String> {
        let mut pairs: Vec<String> = self
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        pairs.sort();
        pairs
    }
}

/// Workflow Aggregate Root
///
/// # Invariants
/// - `id` is non-empty
/// - every action has a non-empty `id` and `image`
/// - action ids are unique within the workflow
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub actions: Vec<Action>,
}

impl Workflow {
    pub fn new(id: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            id: id.into(),
            actions,
        }
    }

    /// Check that the workflow can be handed to an agent.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.id.is_empty() {
            return Err(WorkflowError::MissingWorkflowId);
        }
        let mut seen = HashSet::new();
        for (index, action) in self.actions.iter().enumerate() {
            if action.id.is_empty() {
                return Err(WorkflowError::InvalidAction {
                    index,
                    reason: "action id is empty".to_string(),
                });
            }
            if action.image.is_empty() {
                return Err(WorkflowError::InvalidAction {
                    index,
                    reason: format!("action '{}' has no image", action.id),
                });
            }
            // Events name actions by id only
            if !seen.insert(action.id.as_str()) {
                return Err(WorkflowError::InvalidAction {
                    index,
                    reason: format!("duplicate action id '{}'", action.id),
                });
            }
        }
        Ok(())
    }

    pub fn action(&self, action_id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == action_id)
    }

    /// Distinct owners in first-seen order
    pub fn worker_ids(&self) -> Vec<String> {
        let mut workers: Vec<String> = Vec::new();
        for action in &self.actions {
            if !workers.contains(&action.owner_worker_id) {
                workers.push(action.owner_worker_id.clone());
            }
        }
        workers
    }
}

// ============================================================================
// Value Objects: Action State
// ============================================================================

/// Per-action execution state, mirrored as the cursor's `current_action_state`.
///
/// `Pending → Running → {Success, Failed, Timeout}`. `Failed` and `Timeout`
/// end the whole workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionState {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Timeout,
}

impl ActionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionState::Pending => "PENDING",
            ActionState::Running => "RUNNING",
            ActionState::Success => "SUCCESS",
            ActionState::Failed => "FAILED",
            ActionState::Timeout => "TIMEOUT",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ActionState::Failed | ActionState::Timeout)
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionState {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ActionState::Pending),
            "RUNNING" => Ok(ActionState::Running),
            "SUCCESS" => Ok(ActionState::Success),
            "FAILED" => Ok(ActionState::Failed),
            "TIMEOUT" => Ok(ActionState::Timeout),
            other => Err(WorkflowError::UnknownState(other.to_string())),
        }
    }
}

// ============================================================================
// Progress Cursor
// ============================================================================

/// The progress cursor of one workflow.
///
/// Updated transactionally after each accepted status report.
/// `current_action_index` never decreases.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub workflow_id: String,
    pub current_worker: String,
    pub current_task: String,
    /// Empty until the first report is accepted
    pub current_action: String,
    pub current_action_index: usize,
    pub current_action_state: ActionState,
    pub total_number_of_actions: usize,
}

impl WorkflowContext {
    /// Initial cursor: `Pending` at index 0.
    pub fn new(workflow: &Workflow) -> Self {
        Self {
            workflow_id: workflow.id.clone(),
            total_number_of_actions: workflow.actions.len(),
            ..Default::default()
        }
    }
}

/// Status report sent by a worker for the action it is executing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionStatusReport {
    pub workflow_id: String,
    pub worker_id: String,
    pub task_name: String,
    pub action_name: String,
    pub action_status: ActionState,
    /// Execution time in seconds, informational
    #[serde(default)]
    pub seconds: i64,
    #[serde(default)]
    pub message: String,
}

/// Immutable status-history row appended for every accepted report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEventRecord {
    pub workflow_id: String,
    pub worker_id: String,
    pub task_name: String,
    pub action_name: String,
    pub action_status: ActionState,
    pub seconds: i64,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl WorkflowEventRecord {
    pub fn from_report(report: &ActionStatusReport, created_at: DateTime<Utc>) -> Self {
        Self {
            workflow_id: report.workflow_id.clone(),
            worker_id: report.worker_id.clone(),
            task_name: report.task_name.clone(),
            action_name: report.action_name.clone(),
            action_status: report.action_status,
            seconds: report.seconds,
            message: report.message.clone(),
            created_at,
        }
    }
}

/// Ephemeral payload passed between actions of one workflow.
///
/// Opaque to the engine. Versions start at 1 and grow by one per update.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkflowData {
    pub workflow_id: String,
    pub version: i32,
    pub metadata: Vec<u8>,
    pub data: Vec<u8>,
}

// ============================================================================
// Domain Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("workflow id is empty")]
    MissingWorkflowId,

    #[error("invalid action at index {index}: {reason}")]
    InvalidAction { index: usize, reason: String },

    #[error("unknown action state: {0}")]
    UnknownState(String),
}
