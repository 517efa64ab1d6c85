// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Ironworks CLI

pub mod agent;
pub mod config;
pub mod migrate;
pub mod server;
pub mod workflow;

pub use self::agent::AgentArgs;
pub use self::config::ConfigCommand;
pub use self::migrate::MigrateCommand;
pub use self::server::ServerArgs;
pub use self::workflow::WorkflowCommand;
