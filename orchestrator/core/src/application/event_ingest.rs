// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Agent event ingestion.
//!
//! Translates events published by agents into status reports for the
//! `WorkflowContextService`. The cursor is only ever moved by those reports.

use crate::application::workflow_context::{WorkflowContextError, WorkflowContextService};
use crate::domain::cursor;
use crate::domain::events::AgentEvent;
use crate::domain::runtime::TIMEOUT_REASON;
use crate::domain::workflow::{ActionState, ActionStatusReport, WorkflowContext};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct AgentEventProcessor {
    contexts: Arc<WorkflowContextService>,
    // (workflow_id, action_id) -> time an accepted start event arrived
    started_at: Mutex<HashMap<(String, String), Instant>>,
}

impl AgentEventProcessor {
    pub fn new(contexts: Arc<WorkflowContextService>) -> Self {
        Self {
            contexts,
            started_at: Mutex::new(HashMap::new()),
        }
    }

    /// Apply one event from `agent_id`. Returns the advanced cursor, or `None`
    /// for events that never move it.
    pub async fn process(
        &self,
        agent_id: &str,
        event: AgentEvent,
    ) -> Result<Option<WorkflowContext>, WorkflowContextError> {
        let (workflow_id, action_id, status, message) = match event {
            AgentEvent::WorkflowRejected {
                workflow_id,
                message,
            } => {
                info!(agent_id, workflow_id = %workflow_id, message = %message, "Agent rejected workflow");
                return Ok(None);
            }
            AgentEvent::ActionStarted {
                workflow_id,
                action_id,
            } => (workflow_id, action_id, ActionState::Running, String::new()),
            AgentEvent::ActionSucceeded {
                workflow_id,
                action_id,
            } => (workflow_id, action_id, ActionState::Success, String::new()),
            AgentEvent::ActionFailed {
                workflow_id,
                action_id,
                reason,
                message,
            } => {
                let status = if reason == TIMEOUT_REASON {
                    ActionState::Timeout
                } else {
                    ActionState::Failed
                };
                (workflow_id, action_id, status, format!("{}: {}", reason, message))
            }
        };

        let actions = self.contexts.get_workflow_actions(&workflow_id).await?;
        let action = actions.iter().find(|a| a.id == action_id).ok_or_else(|| {
            WorkflowContextError::InvalidArgument(format!(
                "workflow {} has no action {}",
                workflow_id, action_id
            ))
        })?;

        let key = (workflow_id.clone(), action_id.clone());
        let seconds = if status == ActionState::Running {
            0
        } else {
            self.started_at
                .lock()
                .get(&key)
                .map(|at| at.elapsed().as_secs() as i64)
                .unwrap_or_default()
        };

        let report = ActionStatusReport {
            workflow_id,
            worker_id: agent_id.to_string(),
            task_name: action.task_name.clone(),
            action_name: action.name.clone(),
            action_status: status,
            seconds,
            message,
        };

        match self.contexts.report_action_status(&report).await {
            Ok(context) => {
                self.track_duration(key, status, &context);
                Ok(Some(context))
            }
            Err(e) => {
                warn!(
                    agent_id,
                    workflow_id = %report.workflow_id,
                    action_id = %action_id,
                    status = %status,
                    error = %e,
                    "Agent event not applied"
                );
                Err(e)
            }
        }
    }

    fn track_duration(
        &self,
        key: (String, String),
        status: ActionState,
        context: &WorkflowContext,
    ) {
        let mut started_at = self.started_at.lock();
        if cursor::is_finished(context, context.total_number_of_actions) {
            started_at.retain(|(workflow_id, _), _| *workflow_id != context.workflow_id);
        } else if status == ActionState::Running {
            started_at.insert(key, Instant::now());
        } else {
            started_at.remove(&key);
        }
    }

    #[cfg(test)]
    fn tracked_starts(&self) -> usize {
        self.started_at.lock().len()
    }
}
