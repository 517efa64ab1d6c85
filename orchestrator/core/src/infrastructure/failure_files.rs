// Copyright (c) 2026 Ironworks Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Failure-reason side channel.
//!
//! Each action gets two host files bind-mounted at fixed paths. An action that
//! exits non-zero may write a short reason and a free-form message into them.
//! They are read after exit only; the exit code decides whether the action
//! failed.

use crate::domain::runtime::{RuntimeError, FAILURE_MESSAGE_PATH, FAILURE_REASON_PATH};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

pub struct FailureFiles {
    // Removed on drop
    _dir: TempDir,
    reason_path: PathBuf,
    message_path: PathBuf,
}

impl FailureFiles {
    /// Create empty reason and message files in a fresh private directory
    /// under `parent`, or under the system temp directory.
    pub fn create(parent: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("ironworks-action-");
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };

        let reason_path = dir.path().join("failure-reason");
        let message_path = dir.path().join("failure-message");
        for path in [&reason_path, &message_path] {
            fs::write(path, b"")?;
            // Actions may run as any user inside the container
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(path, fs::Permissions::from_mode(0o666))?;
            }
        }

        Ok(Self {
            _dir: dir,
            reason_path,
            message_path,
        })
    }

    /// Bind specs mounting the files at their fixed container paths.
    pub fn binds(&self) -> Vec<String> {
        vec![
            format!("{}:{}", self.reason_path.display(), FAILURE_REASON_PATH),
            format!("{}:{}", self.message_path.display(), FAILURE_MESSAGE_PATH),
        ]
    }

    pub fn reason(&self) -> Option<String> {
        read_trimmed(&self.reason_path)
    }

    pub fn message(&self) -> Option<String> {
        read_trimmed(&self.message_path)
    }

    /// Error for an action that exited with `exit_code`.
    pub fn to_error(&self, exit_code: i64) -> RuntimeError {
        RuntimeError::ActionFailed {
            reason: self.reason(),
            message: self
                .message()
                .unwrap_or_else(|| format!("action exited with status {}", exit_code)),
            exit_code,
        }
    }
}

/// Contents without trailing newlines; missing or empty means absent.
fn read_trimmed(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let trimmed = contents.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Failure file unreadable");
            None
        }
    }
}
