// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `ironworks server` - run the workflow engine
//!
//! Storage is Postgres when `spec.server.database_url` resolves to a URL and
//! in-memory otherwise.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use ironworks_core::application::agent_registry::AgentRegistry;
use ironworks_core::application::workflow_context::WorkflowContextService;
use ironworks_core::domain::node_config::NodeConfigManifest;
use ironworks_core::domain::repository::WorkflowRepository;
use ironworks_core::infrastructure::db::Database;
use ironworks_core::infrastructure::repositories::{
    InMemoryWorkflowRepository, PostgresWorkflowRepository,
};
use ironworks_core::presentation::grpc::{start_grpc_server, WorkflowGrpcService};

use crate::signal::shutdown_signal;

#[derive(Args)]
pub struct ServerArgs {
    /// gRPC listen port (default: spec.server.grpc_port)
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Skip applying pending migrations at startup
    #[arg(long)]
    pub no_migrate: bool,
}

pub async fn run(args: ServerArgs, config: NodeConfigManifest) -> Result<()> {
    config.validate().context("Configuration validation failed")?;
    let server = &config.spec.server;

    let repository = build_repository(&config, !args.no_migrate).await?;
    let contexts = Arc::new(WorkflowContextService::new(repository));
    let registry = Arc::new(AgentRegistry::new());
    let service = WorkflowGrpcService::new(contexts, registry);

    let port = args.port.unwrap_or(server.grpc_port);
    let addr: SocketAddr = format!("{}:{}", server.bind_address, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", server.bind_address, port))?;

    println!("{}", format!("Workflow server listening on {}", addr).green());
    start_grpc_server(addr, service, shutdown_signal())
        .await
        .context("gRPC server failed")?;

    info!("Server shut down");
    Ok(())
}

async fn build_repository(
    config: &NodeConfigManifest,
    migrate: bool,
) -> Result<Arc<dyn WorkflowRepository>> {
    let Some(url) = config.spec.server.resolved_database_url()? else {
        warn!("No database configured, workflows are kept in memory and lost on restart");
        return Ok(Arc::new(InMemoryWorkflowRepository::new()));
    };

    let database = Database::new(&url)
        .await
        .context("Failed to connect to database")?;
    if migrate {
        database.migrate().await.context("Failed to apply migrations")?;
    }
    info!("Using PostgreSQL workflow repository");
    Ok(Arc::new(PostgresWorkflowRepository::new_with_pool(
        database.get_pool().clone(),
    )))
}
