// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Capsule error taxonomy
//!
//! Every fallible capsule operation reports one of these variants. The
//! lifecycle relies on the distinction: provisioning failures are rolled back
//! and re-raised, teardown failures are surfaced by `down()` and only logged
//! by `destroy()`.

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::instance::DirectoryError;

#[derive(Debug, Error)]
pub enum CapsuleError {
    /// Missing or unwritable root, missing runtime template, invalid identity
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Link or copy failure while materializing the capsule tree
    #[error("Provisioning failed at {}: {message}", path.display())]
    Provisioning { path: PathBuf, message: String },

    /// Runtime config file could not be written
    #[error("Unable to persist {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The capsule tree could not be removed
    #[error("Unable to remove capsule path {}: {source}", path.display())]
    Os {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Refused to delete a path outside the capsule root
    #[error("Refusing to remove {}: {reason}", path.display())]
    DestructiveGuard { path: PathBuf, reason: String },

    /// Operation invoked out of order
    #[error("Logic error: {0}")]
    Logic(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Instance directory error: {0}")]
    Directory(String),

    /// The console command could not be spawned or its output not read
    #[error("Command execution failed: {0}")]
    Command(String),
}

impl CapsuleError {
    pub fn provisioning(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Provisioning {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True for the failures `down()` must surface (disk or correctness risk)
    pub fn is_teardown_failure(&self) -> bool {
        matches!(self, Self::Os { .. } | Self::DestructiveGuard { .. })
    }
}

impl From<DirectoryError> for CapsuleError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound(id) => CapsuleError::InstanceNotFound(id),
            other => CapsuleError::Directory(other.to_string()),
        }
    }
}
