// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod server;

pub use server::{serve_with_listener, start_grpc_server, WorkflowGrpcService};
