// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod agent;
pub mod agent_registry;
pub mod event_ingest;
pub mod workflow_context;

pub use agent::{Agent, AgentError};
pub use agent_registry::{AgentRegistry, RegistryError};
pub use event_ingest::AgentEventProcessor;
pub use workflow_context::{WorkflowContextError, WorkflowContextService};
