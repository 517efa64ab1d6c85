// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Connected agents and their command streams.

use crate::domain::transport::AgentCommand;
use crate::domain::workflow::Workflow;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

const COMMAND_BUFFER: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("agent {0} is not connected")]
    AgentNotConnected(String),
}

#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, mpsc::Sender<AgentCommand>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `agent_id` and return its command stream. A reconnect replaces
    /// the previous stream, which then ends.
    pub fn connect(&self, agent_id: &str) -> mpsc::Receiver<AgentCommand> {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        if self.agents.write().insert(agent_id.to_string(), tx).is_some() {
            info!(agent_id, "Agent reconnected, replacing command stream");
        } else {
            info!(agent_id, "Agent connected");
        }
        rx
    }

    pub fn is_connected(&self, agent_id: &str) -> bool {
        self.agents
            .read()
            .get(agent_id)
            .is_some_and(|tx| !tx.is_closed())
    }

    pub fn connected_agents(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .agents
            .read()
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub async fn start_workflow(
        &self,
        agent_id: &str,
        workflow: Workflow,
    ) -> Result<(), RegistryError> {
        self.send(agent_id, AgentCommand::StartWorkflow(workflow)).await
    }

    pub async fn stop_workflow(&self, agent_id: &str, workflow_id: &str) -> Result<(), RegistryError> {
        self.send(agent_id, AgentCommand::StopWorkflow(workflow_id.to_string()))
            .await
    }

    async fn send(&self, agent_id: &str, command: AgentCommand) -> Result<(), RegistryError> {
        // Clone out of the lock; the send may wait on a full buffer
        let tx = self
            .agents
            .read()
            .get(agent_id)
            .cloned()
            .ok_or_else(|| RegistryError::AgentNotConnected(agent_id.to_string()))?;

        if tx.send(command).await.is_err() {
            self.disconnect_closed(agent_id);
            return Err(RegistryError::AgentNotConnected(agent_id.to_string()));
        }
        debug!(agent_id, "Command queued");
        Ok(())
    }

    fn disconnect_closed(&self, agent_id: &str) {
        let mut agents = self.agents.write();
        if agents.get(agent_id).is_some_and(|tx| tx.is_closed()) {
            agents.remove(agent_id);
            info!(agent_id, "Agent disconnected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commands_reach_connected_agent() {
        let registry = AgentRegistry::new();
        let mut rx = registry.connect("w1");
        assert!(registry.is_connected("w1"));

        registry
            .start_workflow("w1", Workflow::new("wf", vec![]))
            .await
            .unwrap();
        registry.stop_workflow("w1", "wf").await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(AgentCommand::StartWorkflow(Workflow::new("wf", vec![])))
        );
        assert_eq!(
            rx.recv().await,
            Some(AgentCommand::StopWorkflow("wf".to_string()))
        );
    }

    #[tokio::test]
    async fn test_unknown_agent_is_rejected() {
        let registry = AgentRegistry::new();
        assert_eq!(
            registry.stop_workflow("ghost", "wf").await,
            Err(RegistryError::AgentNotConnected("ghost".to_string()))
        );
    }

    #[tokio::test]
    async fn test_dropped_stream_disconnects() {
        let registry = AgentRegistry::new();
        drop(registry.connect("w1"));
        assert!(!registry.is_connected("w1"));
        assert!(registry.stop_workflow("w1", "wf").await.is_err());
        assert!(registry.connected_agents().is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_replaces_stream() {
        let registry = AgentRegistry::new();
        let mut old = registry.connect("w1");
        let mut new = registry.connect("w1");
        assert_eq!(old.recv().await, None);

        registry.stop_workflow("w1", "wf").await.unwrap();
        assert_eq!(new.recv().await, Some(AgentCommand::StopWorkflow("wf".to_string())));
        assert_eq!(registry.connected_agents(), vec!["w1".to_string()]);
    }
}
