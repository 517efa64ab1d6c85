// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Generated protobuf bindings and their conversions to domain types.

pub mod ironworks {
    pub mod v1 {
        tonic::include_proto!("ironworks.v1");
    }
}

pub use ironworks::v1 as pb;

use crate::domain::events::AgentEvent;
use crate::domain::transport::{AgentCommand, CommandError, TransportError};
use crate::domain::workflow::{
    Action, ActionState, ActionStatusReport, Workflow, WorkflowContext, WorkflowError,
};

impl From<ActionState> for pb::State {
    fn from(state: ActionState) -> Self {
        match state {
            ActionState::Pending => pb::State::Pending,
            ActionState::Running => pb::State::Running,
            ActionState::Success => pb::State::Success,
            ActionState::Failed => pb::State::Failed,
            ActionState::Timeout => pb::State::Timeout,
        }
    }
}

impl From<pb::State> for ActionState {
    fn from(state: pb::State) -> Self {
        match state {
            pb::State::Pending => ActionState::Pending,
            pb::State::Running => ActionState::Running,
            pb::State::Success => ActionState::Success,
            pb::State::Failed => ActionState::Failed,
            pb::State::Timeout => ActionState::Timeout,
        }
    }
}

/// Decode a wire enum value.
pub fn action_state_from_wire(value: i32) -> Result<ActionState, WorkflowError> {
    pb::State::try_from(value)
        .map(ActionState::from)
        .map_err(|_| WorkflowError::UnknownState(value.to_string()))
}

impl From<&Action> for pb::Action {
    fn from(action: &Action) -> Self {
        pb::Action {
            id: action.id.clone(),
            name: action.name.clone(),
            task_name: action.task_name.clone(),
            image: action.image.clone(),
            command: action.command.clone().unwrap_or_default(),
            args: action.args.clone(),
            env: action.env.clone(),
            volumes: action.volumes.clone(),
            network_namespace: action.network_namespace.clone().unwrap_or_default(),
            owner_worker_id: action.owner_worker_id.clone(),
            timeout_seconds: action.timeout_seconds.min(i64::MAX as u64) as i64,
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

impl From<pb::Action> for Action {
    fn from(action: pb::Action) -> Self {
        Action {
            id: action.id,
            name: action.name,
            task_name: action.task_name,
            image: action.image,
            command: non_empty(action.command),
            args: action.args,
            env: action.env,
            volumes: action.volumes,
            network_namespace: non_empty(action.network_namespace),
            owner_worker_id: action.owner_worker_id,
            timeout_seconds: action.timeout_seconds.max(0) as u64,
        }
    }
}

impl From<&Workflow> for pb::Workflow {
    fn from(workflow: &Workflow) -> Self {
        pb::Workflow {
            id: workflow.id.clone(),
            actions: workflow.actions.iter().map(pb::Action::from).collect(),
        }
    }
}

impl From<pb::Workflow> for Workflow {
    fn from(workflow: pb::Workflow) -> Self {
        Workflow {
            id: workflow.id,
            actions: workflow.actions.into_iter().map(Action::from).collect(),
        }
    }
}

impl From<&WorkflowContext> for pb::WorkflowContext {
    fn from(context: &WorkflowContext) -> Self {
        pb::WorkflowContext {
            workflow_id: context.workflow_id.clone(),
            current_worker: context.current_worker.clone(),
            current_task: context.current_task.clone(),
            current_action: context.current_action.clone(),
            current_action_index: context.current_action_index as i64,
            current_action_state: pb::State::from(context.current_action_state) as i32,
            total_number_of_actions: context.total_number_of_actions as i64,
        }
    }
}

impl TryFrom<pb::WorkflowActionStatus> for ActionStatusReport {
    type Error = WorkflowError;

    fn try_from(status: pb::WorkflowActionStatus) -> Result<Self, Self::Error> {
        Ok(ActionStatusReport {
            action_status: action_state_from_wire(status.action_status)?,
            workflow_id: status.workflow_id,
            worker_id: status.worker_id,
            task_name: status.task_name,
            action_name: status.action_name,
            seconds: status.seconds,
            message: status.message,
        })
    }
}

impl From<AgentEvent> for pb::Event {
    fn from(event: AgentEvent) -> Self {
        use pb::event::Event;
        let event = match event {
            AgentEvent::ActionStarted {
                workflow_id,
                action_id,
            } => Event::ActionStarted(pb::ActionStarted {
                workflow_id,
                action_id,
            }),
            AgentEvent::ActionSucceeded {
                workflow_id,
                action_id,
            } => Event::ActionSucceeded(pb::ActionSucceeded {
                workflow_id,
                action_id,
            }),
            AgentEvent::ActionFailed {
                workflow_id,
                action_id,
                reason,
                message,
            } => Event::ActionFailed(pb::ActionFailed {
                workflow_id,
                action_id,
                failure_reason: reason,
                failure_message: message,
            }),
            AgentEvent::WorkflowRejected {
                workflow_id,
                message,
            } => Event::WorkflowRejected(pb::WorkflowRejected {
                workflow_id,
                message,
            }),
        };
        pb::Event { event: Some(event) }
    }
}

impl TryFrom<pb::Event> for AgentEvent {
    type Error = TransportError;

    fn try_from(event: pb::Event) -> Result<Self, Self::Error> {
        use pb::event::Event;
        match event.event {
            Some(Event::ActionStarted(e)) => Ok(AgentEvent::ActionStarted {
                workflow_id: e.workflow_id,
                action_id: e.action_id,
            }),
            Some(Event::ActionSucceeded(e)) => Ok(AgentEvent::ActionSucceeded {
                workflow_id: e.workflow_id,
                action_id: e.action_id,
            }),
            Some(Event::ActionFailed(e)) => Ok(AgentEvent::ActionFailed {
                workflow_id: e.workflow_id,
                action_id: e.action_id,
                reason: e.failure_reason,
                message: e.failure_message,
            }),
            Some(Event::WorkflowRejected(e)) => Ok(AgentEvent::WorkflowRejected {
                workflow_id: e.workflow_id,
                message: e.message,
            }),
            None => Err(TransportError::Incompatible(
                "event carries no payload".to_string(),
            )),
        }
    }
}

impl From<&AgentCommand> for pb::AgentCommand {
    fn from(command: &AgentCommand) -> Self {
        use pb::agent_command::Command;
        let command = match command {
            AgentCommand::StartWorkflow(workflow) => Command::StartWorkflow(pb::StartWorkflow {
                workflow: Some(pb::Workflow::from(workflow)),
            }),
            AgentCommand::StopWorkflow(workflow_id) => Command::StopWorkflow(pb::StopWorkflow {
                workflow_id: workflow_id.clone(),
            }),
        };
        pb::AgentCommand {
            command: Some(command),
        }
    }
}

/// Decodes and validates; malformed commands never reach a handler.
impl TryFrom<pb::AgentCommand> for AgentCommand {
    type Error = CommandError;

    fn try_from(command: pb::AgentCommand) -> Result<Self, Self::Error> {
        use pb::agent_command::Command;
        let command = match command.command {
            Some(Command::StartWorkflow(start)) => AgentCommand::StartWorkflow(
                start
                    .workflow
                    .map(Workflow::from)
                    .ok_or(CommandError::MissingWorkflow)?,
            ),
            Some(Command::StopWorkflow(stop)) => AgentCommand::StopWorkflow(stop.workflow_id),
            None => return Err(CommandError::Empty),
        };
        command.validate()?;
        Ok(command)
    }
}
