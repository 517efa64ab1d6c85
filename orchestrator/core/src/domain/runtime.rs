// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::workflow::Action;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Path inside the action's filesystem where it may write a short failure reason.
pub const FAILURE_REASON_PATH: &str = "/ironworks/failure-reason";

/// Path inside the action's filesystem where it may write a free-form failure message.
pub const FAILURE_MESSAGE_PATH: &str = "/ironworks/failure-message";

/// Reason exposed by a runtime when an action exceeds its timeout.
pub const TIMEOUT_REASON: &str = "Timeout";

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to pull image {image}: {message}")]
    ImagePull { image: String, message: String },

    #[error("Container engine error: {0}")]
    Engine(String),

    /// The action ran and exited non-zero.
    #[error("{message}")]
    ActionFailed {
        reason: Option<String>,
        message: String,
        exit_code: i64,
    },

    #[error("Action timed out after {0:?}")]
    Timeout(Duration),

    #[error("Action cancelled")]
    Cancelled,
}

impl RuntimeError {
    /// Failure reason reported by the action, if any.
    ///
    /// This is the only view of the failure side channel the executor sees.
    pub fn reason(&self) -> Option<&str> {
        match self {
            RuntimeError::ActionFailed { reason, .. } => reason.as_deref(),
            RuntimeError::Timeout(_) => Some(TIMEOUT_REASON),
            _ => None,
        }
    }
}

/// Executes one action as an isolated process group.
///
/// Implemented by the Docker runtime and by test fakes; the agent only ever
/// depends on this trait.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Run `action` to completion.
    ///
    /// Cancelling `ctx` must stop the action and return `RuntimeError::Cancelled`.
    async fn run(&self, ctx: CancellationToken, action: &Action) -> Result<(), RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_exposure() {
        let err = RuntimeError::ActionFailed {
            reason: Some("DiskNotFound".to_string()),
            message: "no disk".to_string(),
            exit_code: 1,
        };
        assert_eq!(err.reason(), Some("DiskNotFound"));
        assert_eq!(err.to_string(), "no disk");

        let err = RuntimeError::ActionFailed {
            reason: None,
            message: "boom".to_string(),
            exit_code: 2,
        };
        assert_eq!(err.reason(), None);

        assert_eq!(RuntimeError::Timeout(Duration::from_secs(3)).reason(), Some("Timeout"));
        assert_eq!(RuntimeError::Cancelled.reason(), None);
        assert_eq!(RuntimeError::Engine("x".to_string()).reason(), None);
    }
}
