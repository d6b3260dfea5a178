// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::path::PathBuf;

// ============================================================================
// Value Objects
// ============================================================================

/// Identity of the tenant instance a capsule is built for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceIdentity {
    pub instance_id: String,
    pub cluster_id: String,
}

impl InstanceIdentity {
    pub fn new(instance_id: impl Into<String>, cluster_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            cluster_id: cluster_id.into(),
        }
    }
}

impl std::fmt::Display for InstanceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.cluster_id, self.instance_id)
    }
}

/// How a [`CapsuleId`] is derived from an [`InstanceIdentity`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashPolicy {
    /// `sha1("<cluster_id>.<instance_id>")` as lowercase hex
    Sha1,
    /// The instance id itself
    Raw,
}

impl Default for HashPolicy {
    fn default() -> Self {
        Self::Sha1
    }
}

/// Deterministic capsule identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CapsuleId(String);

impl CapsuleId {
    pub fn derive(identity: &InstanceIdentity, policy: HashPolicy) -> Self {
        match policy {
            HashPolicy::Sha1 => {
                let mut hasher = Sha1::new();
                hasher.update(identity.cluster_id.as_bytes());
                hasher.update(b".");
                hasher.update(identity.instance_id.as_bytes());
                Self(hex::encode(hasher.finalize()))
            }
            HashPolicy::Raw => Self(identity.instance_id.clone()),
        }
    }

    /// Wrap an id computed elsewhere (e.g. read back from an event stream)
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CapsuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a capsule handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapsuleState {
    Unprovisioned,
    Up,
    Down,
}

impl CapsuleState {
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Up)
    }
}

/// Concrete paths a provisioning strategy works with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapsuleLayout {
    /// Shared application tree (read-mostly, common to all instances)
    pub install_path: PathBuf,
    /// The instance's persistent storage, outside every capsule
    pub storage_path: PathBuf,
    /// The capsule being materialized
    pub capsule_path: PathBuf,
}

impl CapsuleLayout {
    /// Runtime config template inside the shared tree
    pub fn template_path(&self) -> PathBuf {
        self.install_path.join(".env")
    }

    /// Materialized runtime config inside the capsule
    pub fn env_path(&self) -> PathBuf {
        self.capsule_path.join(".env")
    }
}
