// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Instance records and the collaborator contracts that resolve them
//!
//! The engine never owns instance data. It asks an [`InstanceDirectory`] for
//! the record behind an id and a [`StorageLocator`] for the instance's
//! persistent storage path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::capsule::InstanceIdentity;

/// Resolved instance record, as returned by the instance directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub cluster_id: String,
    /// Database driver; the configured default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_driver: Option<String>,
    pub db_host: String,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub db_port: u16,
}

impl InstanceRecord {
    pub fn identity(&self) -> InstanceIdentity {
        InstanceIdentity::new(self.instance_id.clone(), self.cluster_id.clone())
    }

    /// Direct database connection for this instance
    pub fn credentials(&self, default_driver: &str) -> DatabaseCredentials {
        DatabaseCredentials {
            driver: self
                .db_driver
                .clone()
                .unwrap_or_else(|| default_driver.to_string()),
            host: self.db_host.clone(),
            database: self.db_name.clone(),
            username: self.db_user.clone(),
            password: self.db_password.clone(),
            port: self.db_port,
        }
    }
}

/// The six connection values forced into every capsule's `.env`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseCredentials {
    pub driver: String,
    pub host: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub port: u16,
}

impl DatabaseCredentials {
    /// Override pairs in their canonical order
    pub fn to_overrides(&self) -> Vec<(&'static str, String)> {
        vec![
            ("DB_DRIVER", self.driver.clone()),
            ("DB_HOST", self.host.clone()),
            ("DB_DATABASE", self.database.clone()),
            ("DB_USERNAME", self.username.clone()),
            ("DB_PASSWORD", self.password.clone()),
            ("DB_PORT", self.port.to_string()),
        ]
    }
}

/// Either an instance id to look up, or an already-resolved record
#[derive(Debug, Clone)]
pub enum InstanceRef {
    Id(String),
    Record(InstanceRecord),
}

impl InstanceRef {
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Record(record) => &record.instance_id,
        }
    }
}

impl From<&str> for InstanceRef {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl From<String> for InstanceRef {
    fn from(id: String) -> Self {
        Self::Id(id)
    }
}

impl From<InstanceRecord> for InstanceRef {
    fn from(record: InstanceRecord) -> Self {
        Self::Record(record)
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("{0}")]
    NotFound(String),

    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed instance record: {0}")]
    Malformed(String),
}

/// Lookup of instance records by id (external collaborator)
#[async_trait]
pub trait InstanceDirectory: Send + Sync {
    /// Resolve an id or pass a resolved record through
    async fn find(&self, instance: &InstanceRef) -> Result<InstanceRecord, DirectoryError>;
}

/// Maps an instance to its persistent, non-sandboxed storage path
pub trait StorageLocator: Send + Sync {
    fn path_for(&self, instance: &InstanceRecord) -> PathBuf;
}
