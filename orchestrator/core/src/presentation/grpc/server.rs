// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

//! gRPC Server Implementation for Ironworks
//! Exposes WorkflowService (cursor, status reports, workflow data) and
//! AgentService (command streams, event ingestion, dispatch)

use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::{Request, Response, Status};

use crate::application::agent_registry::{AgentRegistry, RegistryError};
use crate::application::event_ingest::AgentEventProcessor;
use crate::application::workflow_context::{WorkflowContextError, WorkflowContextService};
use crate::domain::events::AgentEvent;
use crate::domain::workflow::{ActionStatusReport, Workflow};
use crate::infrastructure::proto::pb;
use crate::infrastructure::proto::pb::agent_service_server::{AgentService, AgentServiceServer};
use crate::infrastructure::proto::pb::workflow_service_server::{
    WorkflowService, WorkflowServiceServer,
};

const STREAM_BUFFER: usize = 32;

fn to_status(err: WorkflowContextError) -> Status {
    match err {
        WorkflowContextError::InvalidArgument(msg) => Status::invalid_argument(msg),
        WorkflowContextError::FailedPrecondition(msg) => Status::failed_precondition(msg),
        WorkflowContextError::NotFound(msg) => Status::not_found(msg),
        WorkflowContextError::Aborted(msg) => Status::aborted(msg),
    }
}

fn registry_status(err: RegistryError) -> Status {
    match err {
        RegistryError::AgentNotConnected(_) => Status::failed_precondition(err.to_string()),
    }
}

/// Implementation of both Ironworks gRPC services
#[derive(Clone)]
pub struct WorkflowGrpcService {
    contexts: Arc<WorkflowContextService>,
    events: Arc<AgentEventProcessor>,
    agents: Arc<AgentRegistry>,
}

impl WorkflowGrpcService {
    pub fn new(contexts: Arc<WorkflowContextService>, agents: Arc<AgentRegistry>) -> Self {
        Self {
            events: Arc::new(AgentEventProcessor::new(contexts.clone())),
            contexts,
            agents,
        }
    }

    pub fn into_servers(self) -> (WorkflowServiceServer<Self>, AgentServiceServer<Self>) {
        (
            WorkflowServiceServer::new(self.clone()),
            AgentServiceServer::new(self),
        )
    }
}

#[tonic::async_trait]
impl WorkflowService for WorkflowGrpcService {
    type GetWorkflowContextsStream = ReceiverStream<Result<pb::WorkflowContext, Status>>;

    async fn create_workflow(
        &self,
        request: Request<pb::CreateWorkflowRequest>,
    ) -> Result<Response<pb::WorkflowContext>, Status> {
        let workflow = request
            .into_inner()
            .workflow
            .map(Workflow::from)
            .ok_or_else(|| Status::invalid_argument("workflow is required"))?;

        let context = self
            .contexts
            .create_workflow(workflow)
            .await
            .map_err(to_status)?;
        Ok(Response::new(pb::WorkflowContext::from(&context)))
    }

    /// Streams the contexts for which the worker holds the turn
    async fn get_workflow_contexts(
        &self,
        request: Request<pb::WorkflowContextRequest>,
    ) -> Result<Response<Self::GetWorkflowContextsStream>, Status> {
        let worker_id = request.into_inner().worker_id;
        let contexts = self
            .contexts
            .get_workflow_contexts(&worker_id)
            .await
            .map_err(to_status)?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(async move {
            for context in &contexts {
                if tx.send(Ok(pb::WorkflowContext::from(context))).await.is_err() {
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn get_workflow_actions(
        &self,
        request: Request<pb::WorkflowActionsRequest>,
    ) -> Result<Response<pb::WorkflowActionList>, Status> {
        let actions = self
            .contexts
            .get_workflow_actions(&request.into_inner().workflow_id)
            .await
            .map_err(to_status)?;
        Ok(Response::new(pb::WorkflowActionList {
            actions: actions.iter().map(pb::Action::from).collect(),
        }))
    }

    async fn report_action_status(
        &self,
        request: Request<pb::WorkflowActionStatus>,
    ) -> Result<Response<pb::Empty>, Status> {
        let report = ActionStatusReport::try_from(request.into_inner())
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        self.contexts
            .report_action_status(&report)
            .await
            .map_err(to_status)?;
        Ok(Response::new(pb::Empty {}))
    }

    async fn get_workflow_data(
        &self,
        request: Request<pb::GetWorkflowDataRequest>,
    ) -> Result<Response<pb::GetWorkflowDataResponse>, Status> {
        let req = request.into_inner();
        let data = self
            .contexts
            .get_workflow_data(&req.workflow_id, req.version)
            .await
            .map_err(to_status)?;
        Ok(Response::new(pb::GetWorkflowDataResponse {
            data: data.data,
            version: data.version,
        }))
    }

    async fn get_workflow_metadata(
        &self,
        request: Request<pb::GetWorkflowDataRequest>,
    ) -> Result<Response<pb::GetWorkflowDataResponse>, Status> {
        let req = request.into_inner();
        let metadata = self
            .contexts
            .get_workflow_metadata(&req.workflow_id, req.version)
            .await
            .map_err(to_status)?;
        Ok(Response::new(pb::GetWorkflowDataResponse {
            data: metadata,
            version: req.version,
        }))
    }

    async fn get_workflow_data_version(
        &self,
        request: Request<pb::GetWorkflowDataRequest>,
    ) -> Result<Response<pb::GetWorkflowDataResponse>, Status> {
        let version = self
            .contexts
            .get_workflow_data_version(&request.into_inner().workflow_id)
            .await
            .map_err(to_status)?;
        Ok(Response::new(pb::GetWorkflowDataResponse {
            data: Vec::new(),
            version,
        }))
    }

    async fn update_workflow_data(
        &self,
        request: Request<pb::UpdateWorkflowDataRequest>,
    ) -> Result<Response<pb::UpdateWorkflowDataResponse>, Status> {
        let req = request.into_inner();
        let version = self
            .contexts
            .update_workflow_data(&req.workflow_id, &req.metadata, &req.data)
            .await
            .map_err(to_status)?;
        Ok(Response::new(pb::UpdateWorkflowDataResponse { version }))
    }
}

#[tonic::async_trait]
impl AgentService for WorkflowGrpcService {
    type StreamCommandsStream = ReceiverStream<Result<pb::AgentCommand, Status>>;

    async fn dispatch_workflow(
        &self,
        request: Request<pb::DispatchWorkflowRequest>,
    ) -> Result<Response<pb::Empty>, Status> {
        let req = request.into_inner();
        let workflow = self
            .contexts
            .get_workflow(&req.workflow_id)
            .await
            .map_err(to_status)?;
        self.agents
            .start_workflow(&req.agent_id, workflow)
            .await
            .map_err(registry_status)?;
        Ok(Response::new(pb::Empty {}))
    }

    async fn cancel_workflow(
        &self,
        request: Request<pb::CancelWorkflowRequest>,
    ) -> Result<Response<pb::Empty>, Status> {
        let req = request.into_inner();
        if req.workflow_id.is_empty() {
            return Err(Status::invalid_argument("workflow_id is required"));
        }
        self.agents
            .stop_workflow(&req.agent_id, &req.workflow_id)
            .await
            .map_err(registry_status)?;
        Ok(Response::new(pb::Empty {}))
    }

    /// Opens the agent's command stream; it ends when the agent reconnects
    async fn stream_commands(
        &self,
        request: Request<pb::StreamCommandsRequest>,
    ) -> Result<Response<Self::StreamCommandsStream>, Status> {
        let agent_id = request.into_inner().agent_id;
        if agent_id.is_empty() {
            return Err(Status::invalid_argument("agent_id is required"));
        }

        let mut commands = self.agents.connect(&agent_id);
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => {
                        tracing::info!(agent_id = %agent_id, "Agent command stream closed by client");
                        break;
                    }
                    command = commands.recv() => match command {
                        Some(command) => {
                            if tx.send(Ok(pb::AgentCommand::from(&command))).await.is_err() {
                                break;
                            }
                        }
                        // Replaced by a newer connection
                        None => break,
                    },
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    /// Only storage failures are returned as errors; rejected reports are
    /// logged and acknowledged so agents do not retry them.
    async fn publish_event(
        &self,
        request: Request<pb::PublishEventRequest>,
    ) -> Result<Response<pb::PublishEventResponse>, Status> {
        let req = request.into_inner();
        if req.agent_id.is_empty() {
            return Err(Status::invalid_argument("agent_id is required"));
        }
        let event = req
            .event
            .ok_or_else(|| Status::invalid_argument("event is required"))?;
        let event =
            AgentEvent::try_from(event).map_err(|e| Status::invalid_argument(e.to_string()))?;

        match self.events.process(&req.agent_id, event).await {
            Ok(_) => Ok(Response::new(pb::PublishEventResponse {})),
            Err(WorkflowContextError::Aborted(msg)) => Err(Status::aborted(msg)),
            Err(_) => Ok(Response::new(pb::PublishEventResponse {})),
        }
    }
}

/// Start the gRPC server on `addr` until `shutdown` resolves
pub async fn start_grpc_server(
    addr: std::net::SocketAddr,
    service: WorkflowGrpcService,
    shutdown: impl Future<Output = ()>,
) -> Result<(), tonic::transport::Error> {
    let (workflows, agents) = service.into_servers();

    tracing::info!("Starting Ironworks gRPC server on {}", addr);

    tonic::transport::Server::builder()
        .add_service(workflows)
        .add_service(agents)
        .serve_with_shutdown(addr, shutdown)
        .await
}

/// Serve on an already bound listener
pub async fn serve_with_listener(
    listener: TcpListener,
    service: WorkflowGrpcService,
    shutdown: impl Future<Output = ()>,
) -> Result<(), tonic::transport::Error> {
    let (workflows, agents) = service.into_servers();

    tonic::transport::Server::builder()
        .add_service(workflows)
        .add_service(agents)
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
}
