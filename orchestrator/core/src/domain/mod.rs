// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Workflow data model, cursor rules and the collaborator contracts the
//! application layer is written against.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and traits, no I/O

pub mod cursor;
pub mod events;
pub mod node_config;
pub mod repository;
pub mod retry;
pub mod runtime;
pub mod transport;
pub mod workflow;
