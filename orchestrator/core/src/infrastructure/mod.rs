// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod db;
pub mod failure_files;
pub mod proto;
pub mod repositories;
pub mod runtime;
pub mod transport;

pub use db::Database;
pub use repositories::{InMemoryWorkflowRepository, PostgresWorkflowRepository};
pub use runtime::DockerRuntime;
pub use transport::GrpcTransport;
