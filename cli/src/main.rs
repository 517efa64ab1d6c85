// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Ironworks CLI
//!
//! The `ironworks` binary runs both halves of the system:
//!
//! - `ironworks server` - workflow engine and agent command fan-out over gRPC
//! - `ironworks agent` - provisioning agent that executes workflow actions in Docker
//! - `ironworks workflow create|dispatch|cancel|actions|contexts` - operator client
//! - `ironworks config show|validate|generate` - configuration management
//! - `ironworks migrate` - apply database migrations

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use ironworks_cli::commands::{self, AgentArgs, ConfigCommand, MigrateCommand, ServerArgs, WorkflowCommand};
use ironworks_core::domain::node_config::NodeConfigManifest;

/// Ironworks - bare-metal provisioning workflows
#[derive(Parser)]
#[command(name = "ironworks")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "IRONWORKS_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true, env = "IRONWORKS_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the workflow server
    #[command(name = "server")]
    Server(ServerArgs),

    /// Run a provisioning agent
    #[command(name = "agent")]
    Agent(AgentArgs),

    /// Workflow management against a running server
    #[command(name = "workflow")]
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Apply database migrations
    #[command(name = "migrate")]
    Migrate {
        #[command(flatten)]
        command: MigrateCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        // No command provided - show help
        eprintln!("{}", "No command specified. Use --help for usage.".yellow());
        std::process::exit(1);
    };

    match command {
        // Config commands inspect the file themselves, so they must not fail on it here
        Commands::Config { command } => {
            init_logging(cli.log_level.as_deref().unwrap_or("warn"), "text")?;
            commands::config::handle_command(command, cli.config).await
        }
        Commands::Server(args) => {
            let config = load_config(cli.config, cli.log_level.as_deref())?;
            init_metrics(&config)?;
            commands::server::run(args, config).await
        }
        Commands::Agent(args) => {
            let config = load_config(cli.config, cli.log_level.as_deref())?;
            init_metrics(&config)?;
            commands::agent::run(args, config).await
        }
        Commands::Workflow { command } => {
            let config = load_config(cli.config, cli.log_level.as_deref())?;
            commands::workflow::handle_command(command, &config).await
        }
        Commands::Migrate { command } => {
            let config = load_config(cli.config, cli.log_level.as_deref())?;
            commands::migrate::execute(command, &config).await
        }
    }
}

/// Load the node config and install logging as it describes
fn load_config(path: Option<PathBuf>, log_level: Option<&str>) -> Result<NodeConfigManifest> {
    let config = NodeConfigManifest::load_or_default(path).context("Failed to load configuration")?;
    let logging = config
        .spec
        .observability
        .as_ref()
        .and_then(|o| o.logging.clone())
        .unwrap_or_default();
    init_logging(log_level.unwrap_or(&logging.level), &logging.format)?;
    Ok(config)
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

/// Install the Prometheus exporter when enabled in the config
fn init_metrics(config: &NodeConfigManifest) -> Result<()> {
    let Some(metrics) = config.spec.observability.as_ref().and_then(|o| o.metrics.as_ref()) else {
        return Ok(());
    };
    if !metrics.enabled {
        return Ok(());
    }

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], metrics.port))
        .install()
        .context("Failed to install Prometheus exporter")?;
    tracing::info!("Prometheus metrics exposed on port {}", metrics.port);
    Ok(())
}
