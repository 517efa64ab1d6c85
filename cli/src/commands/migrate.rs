// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Database Migrate Command
//!
//! Implements `ironworks migrate`, which applies the embedded schema
//! migrations to the configured PostgreSQL database.
//!
//! # Architecture
//!
//! - **Layer:** CLI/Presentation
//! - **Purpose:** Database schema migration management
//! - **Integration:** CLI → `Database` (SQLx Migrator) → PostgreSQL
//!
//! # Usage
//!
//! ```bash
//! # Apply all pending migrations
//! ironworks migrate
//!
//! # Preview migrations without applying
//! ironworks migrate --dry-run
//! ```
//!
//! The database URL comes from `spec.server.database_url` or
//! `IRONWORKS_DATABASE_URL`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use ironworks_core::domain::node_config::NodeConfigManifest;
use ironworks_core::infrastructure::db::Database;

#[derive(Args)]
pub struct MigrateCommand {
    /// Perform a dry run without applying changes
    #[arg(long)]
    dry_run: bool,
}

pub async fn execute(cmd: MigrateCommand, config: &NodeConfigManifest) -> Result<()> {
    println!("{}", "Ironworks Migrate".bold().green());

    let database_url = config
        .spec
        .server
        .resolved_database_url()?
        .context("No database configured. Set spec.server.database_url or IRONWORKS_DATABASE_URL.")?;

    println!("Connecting to database...");
    let database = Database::new(&database_url).await?;

    let pending = database.pending_migrations().await?;
    if pending.is_empty() {
        println!("{}", "✓ Database is up to date.".green());
        return Ok(());
    }

    println!("{} pending migration(s):", pending.len());
    for migration in &pending {
        println!(" - {} {}", migration.version, migration.description);
    }

    if cmd.dry_run {
        println!("Skipping application due to --dry-run");
        return Ok(());
    }

    println!("Applying pending migrations...");
    database.migrate().await?;
    println!("{}", "✓ Database updated successfully.".green());

    Ok(())
}
