// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

//! gRPC transport for agents.
//!
//! Receives commands over the `StreamCommands` server stream and publishes
//! events with `PublishEvent`. The same value is both the agent's `Transport`
//! and its `EventRecorder`.

use crate::domain::events::AgentEvent;
use crate::domain::retry::RetryPolicy;
use crate::domain::transport::{
    AgentCommand, EventRecorder, Transport, TransportError, WorkflowHandler,
};
use crate::infrastructure::proto::pb;
use crate::infrastructure::proto::pb::agent_service_client::AgentServiceClient;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct GrpcTransport {
    endpoint: String,
    agent_id: String,
    channel: Channel,
    publish_retry: RetryPolicy,
    reconnect: RetryPolicy,
}

impl GrpcTransport {
    /// The channel connects lazily; nothing is dialled until `start` or the
    /// first published event.
    pub fn new(
        endpoint: impl Into<String>,
        agent_id: impl Into<String>,
        publish_retry: RetryPolicy,
    ) -> Result<Self, TransportError> {
        let endpoint = endpoint.into();
        let channel = Endpoint::from_shared(endpoint.clone())
            .map_err(|e| TransportError::Connect {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            })?
            .connect_lazy();

        Ok(Self {
            endpoint,
            agent_id: agent_id.into(),
            channel,
            publish_retry,
            reconnect: RetryPolicy::default(),
        })
    }

    async fn receive(
        &self,
        ctx: &CancellationToken,
        agent_id: &str,
        handler: &Arc<dyn WorkflowHandler>,
    ) -> Result<(), TransportError> {
        let mut client = AgentServiceClient::new(self.channel.clone());
        let request = pb::StreamCommandsRequest {
            agent_id: agent_id.to_string(),
        };
        let mut stream = client
            .stream_commands(request)
            .await
            .map_err(|status| TransportError::Connect {
                endpoint: self.endpoint.clone(),
                message: status.message().to_string(),
            })?
            .into_inner();
        info!(agent_id, endpoint = %self.endpoint, "Command stream open");

        let recorder: Arc<dyn EventRecorder> = Arc::new(self.clone());
        loop {
            tokio::select! {
                _ = ctx.cancelled() => return Ok(()),
                message = stream.message() => match message {
                    Ok(Some(command)) => {
                        dispatch(ctx, command, handler.clone(), recorder.clone());
                    }
                    Ok(None) => {
                        return Err(TransportError::Stream("server closed the command stream".to_string()))
                    }
                    Err(status) => return Err(TransportError::Stream(status.message().to_string())),
                },
            }
        }
    }
}

/// Validate one command and hand it to `handler` without blocking the caller.
///
/// Workflows run on their own task; the returned handle is for tests.
pub fn dispatch(
    ctx: &CancellationToken,
    command: pb::AgentCommand,
    handler: Arc<dyn WorkflowHandler>,
    recorder: Arc<dyn EventRecorder>,
) -> Option<JoinHandle<()>> {
    match AgentCommand::try_from(command) {
        Err(e) => {
            warn!(error = %e, "Dropping malformed command");
            None
        }
        Ok(AgentCommand::StartWorkflow(workflow)) => {
            debug!(workflow_id = %workflow.id, "Start command received");
            let ctx = ctx.clone();
            Some(tokio::spawn(async move {
                let workflow_id = workflow.id.clone();
                if let Err(e) = handler.handle_workflow(ctx, workflow, recorder).await {
                    error!(workflow_id = %workflow_id, error = %e, "Workflow not handled");
                }
            }))
        }
        Ok(AgentCommand::StopWorkflow(workflow_id)) => {
            debug!(workflow_id = %workflow_id, "Stop command received");
            handler.cancel_workflow(&workflow_id);
            None
        }
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    /// Reconnects with backoff until `ctx` is cancelled.
    async fn start(
        &self,
        ctx: CancellationToken,
        agent_id: &str,
        handler: Arc<dyn WorkflowHandler>,
    ) -> Result<(), TransportError> {
        let mut failures: u32 = 0;
        loop {
            match self.receive(&ctx, agent_id, &handler).await {
                Ok(()) => return Ok(()),
                Err(e) if ctx.is_cancelled() => {
                    debug!(error = %e, "Transport stopped during shutdown");
                    return Ok(());
                }
                Err(e) => {
                    let delay = self.reconnect.delay_for(failures);
                    failures = failures.saturating_add(1);
                    warn!(
                        agent_id,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Command stream lost, reconnecting"
                    );
                    tokio::select! {
                        _ = ctx.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

#[async_trait]
impl EventRecorder for GrpcTransport {
    async fn record_event(&self, event: AgentEvent) -> Result<(), TransportError> {
        let kind = event.kind();
        let request = pb::PublishEventRequest {
            agent_id: self.agent_id.clone(),
            event: Some(pb::Event::from(event)),
        };
        let client = AgentServiceClient::new(self.channel.clone());

        self.publish_retry
            .retry("publish_event", || {
                let mut client = client.clone();
                let request = request.clone();
                async move { client.publish_event(request).await }
            })
            .await
            .map_err(|exhausted| TransportError::Publish {
                attempts: exhausted.attempts,
                message: exhausted.error.message().to_string(),
            })?;

        debug!(event = kind, "Event published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transport::HandlerError;
    use crate::domain::workflow::{Action, Workflow};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        started: Mutex<Vec<String>>,
        cancelled: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WorkflowHandler for RecordingHandler {
        async fn handle_workflow(
            &self,
            _ctx: CancellationToken,
            workflow: Workflow,
            _recorder: Arc<dyn EventRecorder>,
        ) -> Result<(), HandlerError> {
            self.started.lock().push(workflow.id);
            Ok(())
        }

        fn cancel_workflow(&self, workflow_id: &str) {
            self.cancelled.lock().push(workflow_id.to_string());
        }
    }

    struct NullRecorder;

    #[async_trait]
    impl EventRecorder for NullRecorder {
        async fn record_event(&self, _event: AgentEvent) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn start_command(workflow: Workflow) -> pb::AgentCommand {
        pb::AgentCommand::from(&AgentCommand::StartWorkflow(workflow))
    }

    #[tokio::test]
    async fn test_dispatch_routes_commands() {
        let handler = Arc::new(RecordingHandler::default());
        let ctx = CancellationToken::new();
        let workflow = Workflow::new(
            "wf-1",
            vec![Action {
                id: "1".to_string(),
                image: "img".to_string(),
                ..Default::default()
            }],
        );

        let task = dispatch(&ctx, start_command(workflow), handler.clone(), Arc::new(NullRecorder));
        task.expect("start spawns a task").await.unwrap();
        assert_eq!(*handler.started.lock(), vec!["wf-1".to_string()]);

        let stop = pb::AgentCommand::from(&AgentCommand::StopWorkflow("wf-1".to_string()));
        assert!(dispatch(&ctx, stop, handler.clone(), Arc::new(NullRecorder)).is_none());
        assert_eq!(*handler.cancelled.lock(), vec!["wf-1".to_string()]);
    }

    #[tokio::test]
    async fn test_dispatch_drops_malformed_commands() {
        let handler = Arc::new(RecordingHandler::default());
        let ctx = CancellationToken::new();

        let nil_action = Workflow::new("wf-2", vec![Action::default()]);
        assert!(dispatch(&ctx, start_command(nil_action), handler.clone(), Arc::new(NullRecorder)).is_none());

        let empty_stop = pb::AgentCommand::from(&AgentCommand::StopWorkflow(String::new()));
        assert!(dispatch(&ctx, empty_stop, handler.clone(), Arc::new(NullRecorder)).is_none());

        assert!(dispatch(&ctx, pb::AgentCommand { command: None }, handler.clone(), Arc::new(NullRecorder)).is_none());

        assert!(handler.started.lock().is_empty());
        assert!(handler.cancelled.lock().is_empty());
    }

    #[tokio::test]
    async fn test_publish_gives_up_after_retries() {
        // Nothing listens on port 1
        let transport =
            GrpcTransport::new("http://127.0.0.1:1", "agent-1", RetryPolicy::immediate(2)).unwrap();
        let err = transport
            .record_event(AgentEvent::ActionStarted {
                workflow_id: "wf".to_string(),
                action_id: "1".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Publish { attempts: 2, .. }));
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        assert!(matches!(
            GrpcTransport::new("not a uri", "agent-1", RetryPolicy::default()),
            Err(TransportError::Connect { .. })
        ));
    }
}
