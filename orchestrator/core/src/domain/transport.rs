// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Transport Contracts
//!
//! Capability traits at the agent ↔ server boundary. The agent is composed from a
//! `Transport` (inbound commands) and a `ContainerRuntime`; the transport also acts
//! as the `EventRecorder` for outbound events.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Ports implemented by `infrastructure::transport` and test fakes

use crate::domain::events::AgentEvent;
use crate::domain::workflow::{Workflow, WorkflowError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Server → agent command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCommand {
    StartWorkflow(Workflow),
    StopWorkflow(String),
}

impl AgentCommand {
    /// Reject payloads that must never reach a handler.
    pub fn validate(&self) -> Result<(), CommandError> {
        match self {
            AgentCommand::StartWorkflow(workflow) => {
                workflow.validate().map_err(CommandError::InvalidWorkflow)
            }
            AgentCommand::StopWorkflow(workflow_id) if workflow_id.is_empty() => {
                Err(CommandError::MissingWorkflowId)
            }
            AgentCommand::StopWorkflow(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("start command carries no workflow")]
    MissingWorkflow,

    #[error("invalid workflow: {0}")]
    InvalidWorkflow(WorkflowError),

    #[error("stop command carries no workflow id")]
    MissingWorkflowId,

    #[error("command carries no payload")]
    Empty,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect to {endpoint}: {message}")]
    Connect { endpoint: String, message: String },

    #[error("Command stream failed: {0}")]
    Stream(String),

    #[error("Failed to publish event after {attempts} attempts: {message}")]
    Publish { attempts: u32, message: String },

    /// An event or command with no wire representation
    #[error("Incompatible message: {0}")]
    Incompatible(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("agent must be started before it can handle workflows")]
    NotStarted,
}

/// Publishes agent events to the server.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record_event(&self, event: AgentEvent) -> Result<(), TransportError>;
}

/// Receives commands dispatched by a `Transport`.
#[async_trait]
pub trait WorkflowHandler: Send + Sync {
    /// Run `workflow`, publishing its events through `recorder`.
    async fn handle_workflow(
        &self,
        ctx: CancellationToken,
        workflow: Workflow,
        recorder: Arc<dyn EventRecorder>,
    ) -> Result<(), HandlerError>;

    /// Cancel the in-flight workflow if its id matches.
    fn cancel_workflow(&self, workflow_id: &str);
}

/// Moves workflows from the server to an agent.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Blocks for the lifetime of the agent, dispatching commands to `handler`.
    async fn start(
        &self,
        ctx: CancellationToken,
        agent_id: &str,
        handler: Arc<dyn WorkflowHandler>,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::Action;

    #[test]
    fn test_command_validation() {
        assert_eq!(
            AgentCommand::StopWorkflow(String::new()).validate(),
            Err(CommandError::MissingWorkflowId)
        );
        assert!(AgentCommand::StopWorkflow("wf".to_string()).validate().is_ok());

        let bad = Workflow::new("wf", vec![Action::default()]);
        assert!(matches!(
            AgentCommand::StartWorkflow(bad).validate(),
            Err(CommandError::InvalidWorkflow(_))
        ));

        let good = Workflow::new(
            "wf",
            vec![Action {
                id: "1".to_string(),
                image: "img".to_string(),
                ..Default::default()
            }],
        );
        assert!(AgentCommand::StartWorkflow(good).validate().is_ok());
    }
}
