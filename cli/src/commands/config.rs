// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use ironworks_core::domain::node_config::NodeConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file populated with defaults
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./ironworks-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(&output, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = NodeConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. IRONWORKS_CONFIG_PATH: {}",
            std::env::var("IRONWORKS_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./ironworks-config.yaml");
        println!("  4. ~/.ironworks/config.yaml");
        println!("  5. /etc/ironworks/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Node Identity:".bold());
    println!("  ID: {}", spec.node.id);
    println!();

    println!("{}", "Runtime:".bold());
    println!(
        "  Docker socket: {}",
        spec.runtime.docker_socket_path.as_deref().unwrap_or("(auto-detect)")
    );
    println!("  Image pull attempts: {}", spec.runtime.pull_max_attempts);
    println!("  Stop timeout: {}s", spec.runtime.stop_timeout_seconds);
    println!();

    println!("{}", "Transport:".bold());
    println!("  Server endpoint: {}", spec.transport.server_endpoint);
    println!("  Publish attempts: {}", spec.transport.publish_max_attempts);
    println!();

    println!("{}", "Server:".bold());
    println!(
        "  Listen: {}:{}",
        spec.server.bind_address, spec.server.grpc_port
    );
    println!(
        "  Storage: {}",
        if spec.server.database_url.is_some() {
            "postgres"
        } else {
            "in-memory"
        }
    );
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = NodeConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            output.display()
        );
    }

    NodeConfigManifest::default()
        .to_yaml_file(output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generated_config_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ironworks-config.yaml");

        generate(&path, false).await.unwrap();
        validate(Some(path.clone())).await.unwrap();

        // Refuses to clobber without --force
        assert!(generate(&path, false).await.is_err());
        generate(&path, true).await.unwrap();
    }
}
