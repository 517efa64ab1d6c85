// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Agent Executor
//!
//! Runs at most one workflow at a time, action by action, against a
//! `ContainerRuntime`, and reports every transition through an `EventRecorder`.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Admission control, sequential execution, failure classification
//! - **Collaborators:**
//!   - Domain: `Transport`, `ContainerRuntime`, `EventRecorder`
//!
//! Admission is a semaphore that holds no permit until `start` succeeds and
//! exactly one afterwards. A workflow arriving while the permit is taken is
//! rejected with a `WorkflowRejected` event, never queued.

use crate::domain::events::{AgentEvent, WORKFLOW_IN_PROGRESS_MESSAGE};
use crate::domain::runtime::ContainerRuntime;
use crate::domain::transport::{
    EventRecorder, HandlerError, Transport, TransportError, WorkflowHandler,
};
use crate::domain::workflow::Workflow;
use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Reason recorded when the runtime supplied none.
pub const DEFAULT_REASON: &str = "RuntimeError";

/// Reason recorded when the runtime supplied one that is not a plain word.
pub const INVALID_REASON: &str = "InvalidReason";

static REASON_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-zA-Z]+$").expect("valid regex"));

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent id is required")]
    MissingId,

    #[error("agent {0} has no transport configured")]
    MissingTransport(String),

    #[error("agent {0} has no container runtime configured")]
    MissingRuntime(String),

    #[error("agent {0} is already started")]
    AlreadyStarted(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

struct InFlight {
    workflow_id: String,
    cancel: CancellationToken,
}

pub struct Agent {
    id: String,
    transport: Option<Arc<dyn Transport>>,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    slot: Arc<Semaphore>,
    started: AtomicBool,
    in_flight: Mutex<Option<InFlight>>,
}

impl Agent {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            transport: None,
            runtime: None,
            slot: Arc::new(Semaphore::new(0)),
            started: AtomicBool::new(false),
            in_flight: Mutex::new(None),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Open the slot and hand control to the transport until `ctx` is cancelled
    /// or the transport fails.
    pub async fn start(self: Arc<Self>, ctx: CancellationToken) -> Result<(), AgentError> {
        if self.id.is_empty() {
            return Err(AgentError::MissingId);
        }
        let transport = self
            .transport
            .clone()
            .ok_or_else(|| AgentError::MissingTransport(self.id.clone()))?;
        if self.runtime.is_none() {
            return Err(AgentError::MissingRuntime(self.id.clone()));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(AgentError::AlreadyStarted(self.id.clone()));
        }

        self.slot.add_permits(1);
        info!(agent_id = %self.id, "Agent started");

        let handler: Arc<dyn WorkflowHandler> = self.clone();
        transport.start(ctx, &self.id, handler).await?;
        info!(agent_id = %self.id, "Agent transport stopped");
        Ok(())
    }

    async fn run(
        &self,
        ctx: CancellationToken,
        runtime: &dyn ContainerRuntime,
        workflow: &Workflow,
        recorder: &dyn EventRecorder,
    ) {
        info!(
            agent_id = %self.id,
            workflow_id = %workflow.id,
            actions = workflow.actions.len(),
            "Running workflow"
        );

        for action in &workflow.actions {
            record(
                recorder,
                AgentEvent::ActionStarted {
                    workflow_id: workflow.id.clone(),
                    action_id: action.id.clone(),
                },
            )
            .await;

            let started = Instant::now();
            match runtime.run(ctx.clone(), action).await {
                Ok(()) => {
                    metrics::counter!("ironworks_actions_total", "outcome" => "succeeded")
                        .increment(1);
                    info!(
                        workflow_id = %workflow.id,
                        action_id = %action.id,
                        duration = ?started.elapsed(),
                        "Action succeeded"
                    );
                    record(
                        recorder,
                        AgentEvent::ActionSucceeded {
                            workflow_id: workflow.id.clone(),
                            action_id: action.id.clone(),
                        },
                    )
                    .await;
                }
                Err(err) => {
                    let reason = sanitize_reason(err.reason());
                    let message = escape_message(&err.to_string());
                    metrics::counter!("ironworks_actions_total", "outcome" => "failed")
                        .increment(1);
                    warn!(
                        workflow_id = %workflow.id,
                        action_id = %action.id,
                        reason = %reason,
                        duration = ?started.elapsed(),
                        error = %err,
                        "Action failed, stopping workflow"
                    );
                    record(
                        recorder,
                        AgentEvent::ActionFailed {
                            workflow_id: workflow.id.clone(),
                            action_id: action.id.clone(),
                            reason,
                            message,
                        },
                    )
                    .await;
                    return;
                }
            }
        }

        info!(agent_id = %self.id, workflow_id = %workflow.id, "Workflow finished");
    }
}

#[async_trait]
impl WorkflowHandler for Agent {
    async fn handle_workflow(
        &self,
        ctx: CancellationToken,
        workflow: Workflow,
        recorder: Arc<dyn EventRecorder>,
    ) -> Result<(), HandlerError> {
        let runtime = match (&self.runtime, self.started.load(Ordering::SeqCst)) {
            (Some(runtime), true) => runtime.clone(),
            _ => return Err(HandlerError::NotStarted),
        };

        let Ok(_permit) = self.slot.clone().try_acquire_owned() else {
            metrics::counter!("ironworks_workflows_rejected_total").increment(1);
            warn!(
                agent_id = %self.id,
                workflow_id = %workflow.id,
                "Workflow rejected, another workflow is in progress"
            );
            record(
                recorder.as_ref(),
                AgentEvent::WorkflowRejected {
                    workflow_id: workflow.id.clone(),
                    message: WORKFLOW_IN_PROGRESS_MESSAGE.to_string(),
                },
            )
            .await;
            return Ok(());
        };

        let cancel = ctx.child_token();
        *self.in_flight.lock() = Some(InFlight {
            workflow_id: workflow.id.clone(),
            cancel: cancel.clone(),
        });

        self.run(cancel, runtime.as_ref(), &workflow, recorder.as_ref())
            .await;

        self.in_flight.lock().take();
        Ok(())
    }

    fn cancel_workflow(&self, workflow_id: &str) {
        match self.in_flight.lock().as_ref() {
            Some(in_flight) if in_flight.workflow_id == workflow_id => {
                info!(agent_id = %self.id, workflow_id, "Cancelling workflow");
                in_flight.cancel.cancel();
            }
            _ => debug!(agent_id = %self.id, workflow_id, "No matching workflow in flight"),
        }
    }
}

async fn record(recorder: &dyn EventRecorder, event: AgentEvent) {
    let kind = event.kind();
    let workflow_id = event.workflow_id().to_string();
    if let Err(e) = recorder.record_event(event).await {
        error!(workflow_id = %workflow_id, event = kind, error = %e, "Failed to record event");
    }
}

/// Reason passed through when it is a plain word, replaced otherwise.
pub fn sanitize_reason(reason: Option<&str>) -> String {
    match reason {
        None | Some("") => DEFAULT_REASON.to_string(),
        Some(r) if REASON_PATTERN.is_match(r) => r.to_string(),
        Some(_) => INVALID_REASON.to_string(),
    }
}

/// Failure messages travel as a single line.
pub fn escape_message(message: &str) -> String {
    message.replace('\n', "\\n")
}
