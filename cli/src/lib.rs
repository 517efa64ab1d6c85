// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Ironworks CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Command handlers behind the `ironworks` binary

pub mod commands;
pub mod signal;
