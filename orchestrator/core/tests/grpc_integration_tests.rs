// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end tests over a real gRPC listener
//!
//! A server backed by the in-memory repository is bound to an ephemeral port.
//! An agent with the gRPC transport and a fake runtime connects to it, receives
//! a dispatched workflow and reports progress back through `PublishEvent`.

mod common;

use common::*;
use ironworks_core::application::agent::Agent;
use ironworks_core::application::agent_registry::AgentRegistry;
use ironworks_core::application::workflow_context::WorkflowContextService;
use ironworks_core::domain::repository::WorkflowRepository;
use ironworks_core::domain::retry::RetryPolicy;
use ironworks_core::domain::workflow::{ActionState, Workflow};
use ironworks_core::infrastructure::proto::pb;
use ironworks_core::infrastructure::proto::pb::agent_service_client::AgentServiceClient;
use ironworks_core::infrastructure::proto::pb::workflow_service_client::WorkflowServiceClient;
use ironworks_core::infrastructure::repositories::InMemoryWorkflowRepository;
use ironworks_core::infrastructure::transport::GrpcTransport;
use ironworks_core::presentation::grpc::{serve_with_listener, WorkflowGrpcService};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tonic::Code;

struct TestServer {
    endpoint: String,
    repo: InMemoryWorkflowRepository,
    registry: Arc<AgentRegistry>,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), tonic::transport::Error>>,
}

impl TestServer {
    async fn start() -> Self {
        let repo = InMemoryWorkflowRepository::new();
        let contexts = Arc::new(WorkflowContextService::new(Arc::new(repo.clone())));
        let registry = Arc::new(AgentRegistry::new());
        let service = WorkflowGrpcService::new(contexts, registry.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let task = tokio::spawn(serve_with_listener(listener, service, async move {
            signal.cancelled().await
        }));

        Self {
            endpoint,
            repo,
            registry,
            shutdown,
            task,
        }
    }

    async fn workflows(&self) -> WorkflowServiceClient<Channel> {
        WorkflowServiceClient::connect(self.endpoint.clone())
            .await
            .unwrap()
    }

    async fn agents(&self) -> AgentServiceClient<Channel> {
        AgentServiceClient::connect(self.endpoint.clone()).await.unwrap()
    }

    async fn stop(self) {
        self.shutdown.cancel();
        tokio_test::assert_ok!(self.task.await.unwrap());
    }
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {}", what);
}

fn two_step_workflow(owner: &str) -> Workflow {
    workflow(
        "wf-1",
        vec![
            owned_action("1", "disk-wipe", owner),
            owned_action("2", "install-os", owner),
        ],
    )
}

async fn create(server: &TestServer, wf: &Workflow) -> pb::WorkflowContext {
    server
        .workflows()
        .await
        .create_workflow(pb::CreateWorkflowRequest {
            workflow: Some(pb::Workflow::from(wf)),
        })
        .await
        .unwrap()
        .into_inner()
}

async fn contexts_for(server: &TestServer, worker_id: &str) -> Vec<pb::WorkflowContext> {
    let mut stream = server
        .workflows()
        .await
        .get_workflow_contexts(pb::WorkflowContextRequest {
            worker_id: worker_id.to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    let mut contexts = Vec::new();
    while let Some(context) = stream.message().await.unwrap() {
        contexts.push(context);
    }
    contexts
}

#[tokio::test]
async fn test_dispatched_workflow_runs_to_completion() {
    let server = TestServer::start().await;
    let created = create(&server, &two_step_workflow("agent-1")).await;
    assert_eq!(created.current_action_state, pb::State::Pending as i32);
    assert_eq!(created.total_number_of_actions, 2);

    let runtime = Arc::new(FakeRuntime::new());
    let transport =
        GrpcTransport::new(server.endpoint.clone(), "agent-1", RetryPolicy::immediate(3)).unwrap();
    let agent = Arc::new(
        Agent::new("agent-1")
            .with_transport(Arc::new(transport))
            .with_runtime(runtime.clone()),
    );
    let ctx = CancellationToken::new();
    let agent_task = tokio::spawn(agent.start(ctx.clone()));

    let registry = server.registry.clone();
    eventually("agent to connect", || {
        let registry = registry.clone();
        async move { registry.is_connected("agent-1") }
    })
    .await;

    server
        .agents()
        .await
        .dispatch_workflow(pb::DispatchWorkflowRequest {
            agent_id: "agent-1".to_string(),
            workflow_id: "wf-1".to_string(),
        })
        .await
        .unwrap();

    let repo = server.repo.clone();
    eventually("workflow to finish", || {
        let repo = repo.clone();
        async move {
            let ctx = repo.get_workflow_context("wf-1").await.unwrap();
            ctx.current_action_index == 1 && ctx.current_action_state == ActionState::Success
        }
    })
    .await;

    assert_eq!(runtime.ran(), vec!["1", "2"]);
    let history: Vec<(String, ActionState)> = server
        .repo
        .list_workflow_events("wf-1")
        .await
        .unwrap()
        .into_iter()
        .map(|e| (e.action_name, e.action_status))
        .collect();
    assert_eq!(
        history,
        vec![
            ("disk-wipe".to_string(), ActionState::Running),
            ("disk-wipe".to_string(), ActionState::Success),
            ("install-os".to_string(), ActionState::Running),
            ("install-os".to_string(), ActionState::Success),
        ]
    );
    assert!(contexts_for(&server, "agent-1").await.is_empty());

    ctx.cancel();
    tokio_test::assert_ok!(agent_task.await.unwrap());
    server.stop().await;
}

#[tokio::test]
async fn test_workflow_service_status_codes() {
    let server = TestServer::start().await;
    create(&server, &two_step_workflow("w1")).await;
    let mut client = server.workflows().await;

    let pending = contexts_for(&server, "w1").await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].workflow_id, "wf-1");
    assert!(contexts_for(&server, "w2").await.is_empty());

    let status = client
        .get_workflow_contexts(pb::WorkflowContextRequest {
            worker_id: String::new(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let report = |action_name: &str, state: pb::State| pb::WorkflowActionStatus {
        workflow_id: "wf-1".to_string(),
        task_name: "provision".to_string(),
        action_name: action_name.to_string(),
        action_status: state as i32,
        seconds: 0,
        message: String::new(),
        worker_id: "w1".to_string(),
    };

    let status = client
        .report_action_status(report("install-os", pb::State::Running))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let mut unknown_state = report("disk-wipe", pb::State::Running);
    unknown_state.action_status = 42;
    let status = client.report_action_status(unknown_state).await.unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let mut ghost = report("disk-wipe", pb::State::Running);
    ghost.workflow_id = "ghost".to_string();
    let status = client.report_action_status(ghost).await.unwrap_err();
    assert_eq!(status.code(), Code::NotFound);

    client
        .report_action_status(report("disk-wipe", pb::State::Failed))
        .await
        .unwrap();
    let status = client
        .report_action_status(report("install-os", pb::State::Running))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::FailedPrecondition);

    let actions = client
        .get_workflow_actions(pb::WorkflowActionsRequest {
            workflow_id: "wf-1".to_string(),
        })
        .await
        .unwrap()
        .into_inner()
        .actions;
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[1].name, "install-os");

    server.stop().await;
}

#[tokio::test]
async fn test_workflow_data_over_grpc() {
    let server = TestServer::start().await;
    create(&server, &two_step_workflow("w1")).await;
    let mut client = server.workflows().await;
    let request = |version: i32| pb::GetWorkflowDataRequest {
        workflow_id: "wf-1".to_string(),
        version,
    };

    let empty = client.get_workflow_data(request(0)).await.unwrap().into_inner();
    assert_eq!(empty.version, 0);
    assert!(empty.data.is_empty());

    let version = client
        .update_workflow_data(pb::UpdateWorkflowDataRequest {
            workflow_id: "wf-1".to_string(),
            metadata: b"{\"disks\":1}".to_vec(),
            data: b"ipxe-script".to_vec(),
        })
        .await
        .unwrap()
        .into_inner()
        .version;
    assert_eq!(version, 1);

    let latest = client.get_workflow_data(request(0)).await.unwrap().into_inner();
    assert_eq!((latest.version, latest.data), (1, b"ipxe-script".to_vec()));

    let metadata = client.get_workflow_metadata(request(1)).await.unwrap().into_inner();
    assert_eq!(metadata.data, b"{\"disks\":1}".to_vec());

    let current = client
        .get_workflow_data_version(request(0))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(current.version, 1);

    server.stop().await;
}

#[tokio::test]
async fn test_dispatch_requires_connected_agent() {
    let server = TestServer::start().await;
    create(&server, &two_step_workflow("agent-1")).await;
    let mut agents = server.agents().await;

    let status = agents
        .dispatch_workflow(pb::DispatchWorkflowRequest {
            agent_id: "agent-1".to_string(),
            workflow_id: "wf-1".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::FailedPrecondition);

    let status = agents
        .dispatch_workflow(pb::DispatchWorkflowRequest {
            agent_id: "agent-1".to_string(),
            workflow_id: "ghost".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);

    let status = agents
        .publish_event(pb::PublishEventRequest {
            agent_id: "agent-1".to_string(),
            event: Some(pb::Event { event: None }),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    server.stop().await;
}
