// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Hand-written fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use ironworks_core::domain::events::AgentEvent;
use ironworks_core::domain::runtime::{ContainerRuntime, RuntimeError};
use ironworks_core::domain::transport::{EventRecorder, Transport, TransportError, WorkflowHandler};
use ironworks_core::domain::workflow::{Action, Workflow};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// How the fake runtime treats one action id.
#[derive(Clone)]
pub enum Behavior {
    Succeed,
    Fail {
        reason: Option<String>,
        message: String,
    },
    TimeOut,
    /// Block until the notify fires, then succeed
    BlockUntil(Arc<Notify>),
    /// Block until the action's context is cancelled
    BlockUntilCancelled,
}

#[derive(Default)]
pub struct FakeRuntime {
    behaviors: HashMap<String, Behavior>,
    ran: Mutex<Vec<String>>,
    pub entered: Arc<Notify>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, action_id: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(action_id.to_string(), behavior);
        self
    }

    pub fn ran(&self) -> Vec<String> {
        self.ran.lock().clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn run(&self, ctx: CancellationToken, action: &Action) -> Result<(), RuntimeError> {
        self.ran.lock().push(action.id.clone());
        self.entered.notify_one();

        match self.behaviors.get(&action.id).cloned().unwrap_or(Behavior::Succeed) {
            Behavior::Succeed => Ok(()),
            Behavior::Fail { reason, message } => Err(RuntimeError::ActionFailed {
                reason,
                message,
                exit_code: 1,
            }),
            Behavior::TimeOut => Err(RuntimeError::Timeout(Duration::from_secs(1))),
            Behavior::BlockUntil(release) => tokio::select! {
                _ = release.notified() => Ok(()),
                _ = ctx.cancelled() => Err(RuntimeError::Cancelled),
            },
            Behavior::BlockUntilCancelled => {
                ctx.cancelled().await;
                Err(RuntimeError::Cancelled)
            }
        }
    }
}

#[derive(Default)]
pub struct RecordingRecorder {
    events: Mutex<Vec<AgentEvent>>,
}

impl RecordingRecorder {
    pub fn events(&self) -> Vec<AgentEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl EventRecorder for RecordingRecorder {
    async fn record_event(&self, event: AgentEvent) -> Result<(), TransportError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Records every event it is offered but fails to publish action starts.
#[derive(Default)]
pub struct FailingStartRecorder {
    attempted: Mutex<Vec<AgentEvent>>,
}

impl FailingStartRecorder {
    pub fn attempted(&self) -> Vec<AgentEvent> {
        self.attempted.lock().clone()
    }
}

#[async_trait]
impl EventRecorder for FailingStartRecorder {
    async fn record_event(&self, event: AgentEvent) -> Result<(), TransportError> {
        let is_start = matches!(event, AgentEvent::ActionStarted { .. });
        self.attempted.lock().push(event);
        if is_start {
            return Err(TransportError::Publish {
                attempts: 5,
                message: "server unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Transport that signals once the agent has started and then idles until
/// shutdown.
#[derive(Default)]
pub struct IdleTransport {
    pub ready: Arc<Notify>,
}

#[async_trait]
impl Transport for IdleTransport {
    async fn start(
        &self,
        ctx: CancellationToken,
        _agent_id: &str,
        _handler: Arc<dyn WorkflowHandler>,
    ) -> Result<(), TransportError> {
        self.ready.notify_one();
        ctx.cancelled().await;
        Ok(())
    }
}

pub fn action(id: &str, image: &str) -> Action {
    Action {
        id: id.to_string(),
        image: image.to_string(),
        ..Default::default()
    }
}

/// Action with the names and owner the workflow engine needs to track it.
pub fn owned_action(id: &str, name: &str, owner: &str) -> Action {
    Action {
        id: id.to_string(),
        name: name.to_string(),
        task_name: "provision".to_string(),
        image: format!("quay.io/ironworks/{}", name),
        owner_worker_id: owner.to_string(),
        ..Default::default()
    }
}

pub fn workflow(id: &str, actions: Vec<Action>) -> Workflow {
    Workflow::new(id, actions)
}

pub fn started(workflow_id: &str, action_id: &str) -> AgentEvent {
    AgentEvent::ActionStarted {
        workflow_id: workflow_id.to_string(),
        action_id: action_id.to_string(),
    }
}

pub fn succeeded(workflow_id: &str, action_id: &str) -> AgentEvent {
    AgentEvent::ActionSucceeded {
        workflow_id: workflow_id.to_string(),
        action_id: action_id.to_string(),
    }
}

pub fn failed(workflow_id: &str, action_id: &str, reason: &str, message: &str) -> AgentEvent {
    AgentEvent::ActionFailed {
        workflow_id: workflow_id.to_string(),
        action_id: action_id.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
    }
}
