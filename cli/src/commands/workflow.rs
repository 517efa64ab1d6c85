// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Workflow management commands
//!
//! Commands: create, dispatch, cancel, actions, contexts

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tonic::transport::Channel;

use ironworks_core::domain::node_config::NodeConfigManifest;
use ironworks_core::domain::workflow::{ActionState, Workflow};
use ironworks_core::infrastructure::proto::pb;
use ironworks_core::infrastructure::proto::pb::agent_service_client::AgentServiceClient;
use ironworks_core::infrastructure::proto::pb::workflow_service_client::WorkflowServiceClient;
use ironworks_core::infrastructure::proto::action_state_from_wire;

#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Register a workflow from a YAML file
    Create {
        /// Path to workflow YAML file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Server endpoint (default: spec.transport.server_endpoint)
        #[arg(long, value_name = "URL")]
        server: Option<String>,
    },

    /// Send a registered workflow to a connected agent
    Dispatch {
        #[arg(value_name = "WORKFLOW_ID")]
        workflow_id: String,

        /// Agent that runs the workflow
        #[arg(long, value_name = "AGENT_ID")]
        agent: String,

        #[arg(long, value_name = "URL")]
        server: Option<String>,
    },

    /// Ask an agent to stop a running workflow
    Cancel {
        #[arg(value_name = "WORKFLOW_ID")]
        workflow_id: String,

        #[arg(long, value_name = "AGENT_ID")]
        agent: String,

        #[arg(long, value_name = "URL")]
        server: Option<String>,
    },

    /// List the actions of a workflow
    Actions {
        #[arg(value_name = "WORKFLOW_ID")]
        workflow_id: String,

        #[arg(long, value_name = "URL")]
        server: Option<String>,
    },

    /// Show the workflows for which a worker holds the turn
    Contexts {
        /// Worker id
        #[arg(long, value_name = "WORKER_ID")]
        worker: String,

        #[arg(long, value_name = "URL")]
        server: Option<String>,
    },
}

pub async fn handle_command(command: WorkflowCommand, config: &NodeConfigManifest) -> Result<()> {
    let default_server = &config.spec.transport.server_endpoint;
    let endpoint = |server: Option<String>| server.unwrap_or_else(|| default_server.clone());

    match command {
        WorkflowCommand::Create { file, server } => create(&file, &endpoint(server)).await,
        WorkflowCommand::Dispatch {
            workflow_id,
            agent,
            server,
        } => dispatch(&workflow_id, &agent, &endpoint(server)).await,
        WorkflowCommand::Cancel {
            workflow_id,
            agent,
            server,
        } => cancel(&workflow_id, &agent, &endpoint(server)).await,
        WorkflowCommand::Actions {
            workflow_id,
            server,
        } => actions(&workflow_id, &endpoint(server)).await,
        WorkflowCommand::Contexts { worker, server } => contexts(&worker, &endpoint(server)).await,
    }
}

/// Parse and validate a workflow definition.
pub fn load_workflow(path: &Path) -> Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read workflow file {:?}", path))?;
    let workflow: Workflow = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse workflow file {:?}", path))?;
    workflow.validate().context("Invalid workflow")?;
    Ok(workflow)
}

async fn workflow_client(endpoint: &str) -> Result<WorkflowServiceClient<Channel>> {
    WorkflowServiceClient::connect(endpoint.to_string())
        .await
        .with_context(|| format!("Failed to connect to {}", endpoint))
}

async fn agent_client(endpoint: &str) -> Result<AgentServiceClient<Channel>> {
    AgentServiceClient::connect(endpoint.to_string())
        .await
        .with_context(|| format!("Failed to connect to {}", endpoint))
}

async fn create(file: &Path, endpoint: &str) -> Result<()> {
    let workflow = load_workflow(file)?;
    let context = workflow_client(endpoint)
        .await?
        .create_workflow(pb::CreateWorkflowRequest {
            workflow: Some(pb::Workflow::from(&workflow)),
        })
        .await
        .context("Failed to create workflow")?
        .into_inner();

    println!(
        "{}",
        format!(
            "✓ Workflow {} created ({} actions)",
            context.workflow_id, context.total_number_of_actions
        )
        .green()
    );
    Ok(())
}

async fn dispatch(workflow_id: &str, agent_id: &str, endpoint: &str) -> Result<()> {
    agent_client(endpoint)
        .await?
        .dispatch_workflow(pb::DispatchWorkflowRequest {
            agent_id: agent_id.to_string(),
            workflow_id: workflow_id.to_string(),
        })
        .await
        .context("Failed to dispatch workflow")?;

    println!(
        "{}",
        format!("✓ Workflow {} dispatched to {}", workflow_id, agent_id).green()
    );
    Ok(())
}

async fn cancel(workflow_id: &str, agent_id: &str, endpoint: &str) -> Result<()> {
    agent_client(endpoint)
        .await?
        .cancel_workflow(pb::CancelWorkflowRequest {
            agent_id: agent_id.to_string(),
            workflow_id: workflow_id.to_string(),
        })
        .await
        .context("Failed to cancel workflow")?;

    println!(
        "{}",
        format!("✓ Stop sent to {} for workflow {}", agent_id, workflow_id).green()
    );
    Ok(())
}

async fn actions(workflow_id: &str, endpoint: &str) -> Result<()> {
    let actions = workflow_client(endpoint)
        .await?
        .get_workflow_actions(pb::WorkflowActionsRequest {
            workflow_id: workflow_id.to_string(),
        })
        .await
        .context("Failed to fetch workflow actions")?
        .into_inner()
        .actions;

    if actions.is_empty() {
        println!("{}", "Workflow has no actions".yellow());
        return Ok(());
    }

    println!("{:<4} {:<20} {:<20} {:<16} {}", "#", "TASK", "ACTION", "WORKER", "IMAGE");
    for (index, action) in actions.iter().enumerate() {
        println!(
            "{:<4} {:<20} {:<20} {:<16} {}",
            index,
            action.task_name,
            action.name.bold(),
            action.owner_worker_id,
            action.image
        );
    }
    Ok(())
}

async fn contexts(worker_id: &str, endpoint: &str) -> Result<()> {
    let mut stream = workflow_client(endpoint)
        .await?
        .get_workflow_contexts(pb::WorkflowContextRequest {
            worker_id: worker_id.to_string(),
        })
        .await
        .context("Failed to fetch workflow contexts")?
        .into_inner();

    let mut found = 0;
    while let Some(context) = stream.message().await.context("Context stream failed")? {
        if found == 0 {
            println!("{:<38} {:<6} {:<20} {}", "WORKFLOW", "INDEX", "ACTION", "STATE");
        }
        found += 1;
        let state = action_state_from_wire(context.current_action_state)
            .map(|s| s.to_string())
            .unwrap_or_else(|_| ActionState::Pending.to_string());
        println!(
            "{:<38} {:<6} {:<20} {}",
            context.workflow_id,
            format!("{}/{}", context.current_action_index, context.total_number_of_actions),
            context.current_action,
            state
        );
    }

    if found == 0 {
        println!("{}", format!("No workflows waiting on {}", worker_id).yellow());
    }
    Ok(())
}
