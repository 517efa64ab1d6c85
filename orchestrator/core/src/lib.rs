// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Ironworks Core
//!
//! Workflow coordination engine and agent executor for bare-metal
//! provisioning. Workflows are ordered lists of container actions; agents run
//! them one at a time and the workflow engine tracks which worker holds the
//! turn.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, application services, Docker/Postgres/gRPC adapters

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
