// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Agent lifecycle events.
//!
//! Write-only from the agent's point of view: the agent appends, the server
//! derives all state from them.

use serde::{Deserialize, Serialize};

/// Message recorded when an agent refuses a second concurrent workflow.
pub const WORKFLOW_IN_PROGRESS_MESSAGE: &str = "workflow already in progress";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    ActionStarted {
        workflow_id: String,
        action_id: String,
    },
    ActionSucceeded {
        workflow_id: String,
        action_id: String,
    },
    ActionFailed {
        workflow_id: String,
        action_id: String,
        /// Machine-matchable token, `^[a-zA-Z]+$`
        reason: String,
        /// Single-line human text
        message: String,
    },
    WorkflowRejected {
        workflow_id: String,
        message: String,
    },
}

impl AgentEvent {
    pub fn workflow_id(&self) -> &str {
        match self {
            AgentEvent::ActionStarted { workflow_id, .. }
            | AgentEvent::ActionSucceeded { workflow_id, .. }
            | AgentEvent::ActionFailed { workflow_id, .. }
            | AgentEvent::WorkflowRejected { workflow_id, .. } => workflow_id,
        }
    }

    pub fn action_id(&self) -> Option<&str> {
        match self {
            AgentEvent::ActionStarted { action_id, .. }
            | AgentEvent::ActionSucceeded { action_id, .. }
            | AgentEvent::ActionFailed { action_id, .. } => Some(action_id),
            AgentEvent::WorkflowRejected { .. } => None,
        }
    }

    /// Short name used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::ActionStarted { .. } => "action_started",
            AgentEvent::ActionSucceeded { .. } => "action_succeeded",
            AgentEvent::ActionFailed { .. } => "action_failed",
            AgentEvent::WorkflowRejected { .. } => "workflow_rejected",
        }
    }
}
