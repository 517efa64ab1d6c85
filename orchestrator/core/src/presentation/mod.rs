// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`ironworks-core`)
//!
//! gRPC surface that translates external requests into application service
//! calls. No business logic lives here.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`grpc`] | gRPC (Tonic) | `WorkflowService` for workers and operators, `AgentService` for agent command streams |

pub mod grpc;
