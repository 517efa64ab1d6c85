// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `ironworks agent` - run a provisioning agent on this machine

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::sync::Arc;
use tracing::info;

use ironworks_core::application::agent::Agent;
use ironworks_core::domain::node_config::NodeConfigManifest;
use ironworks_core::infrastructure::runtime::DockerRuntime;
use ironworks_core::infrastructure::transport::GrpcTransport;

use crate::signal::cancel_on_shutdown;

#[derive(Args)]
pub struct AgentArgs {
    /// Agent id reported to the server (default: spec.node.id)
    #[arg(long, value_name = "ID")]
    pub id: Option<String>,

    /// Workflow server endpoint (default: spec.transport.server_endpoint)
    #[arg(long, value_name = "URL")]
    pub server: Option<String>,
}

pub async fn run(args: AgentArgs, config: NodeConfigManifest) -> Result<()> {
    config.validate().context("Configuration validation failed")?;
    let spec = config.spec;

    let agent_id = args.id.unwrap_or(spec.node.id);
    let endpoint = args.server.unwrap_or(spec.transport.server_endpoint.clone());

    let runtime = DockerRuntime::new(&spec.runtime).context("Failed to create Docker runtime")?;
    runtime
        .healthcheck()
        .await
        .context("Docker daemon is not reachable")?;

    let transport = GrpcTransport::new(
        endpoint.clone(),
        agent_id.clone(),
        spec.transport.publish_retry_policy(),
    )
    .with_context(|| format!("Invalid server endpoint {}", endpoint))?;

    let agent = Arc::new(
        Agent::new(agent_id.clone())
            .with_transport(Arc::new(transport))
            .with_runtime(Arc::new(runtime)),
    );

    println!(
        "{}",
        format!("Agent {} connecting to {}", agent_id, endpoint).green()
    );
    info!(agent_id = %agent_id, endpoint = %endpoint, "Starting agent");

    agent
        .start(cancel_on_shutdown())
        .await
        .context("Agent stopped with an error")?;

    info!("Agent shut down");
    Ok(())
}
