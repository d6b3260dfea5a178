// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provisioning Strategy Trait
//!
//! Abstraction over how a capsule's file tree is materialized. Two
//! implementations live in `crate::infrastructure::provisioning`:
//!
//! | Strategy | Cost | Consistency |
//! |----------|------|-------------|
//! | `LinkStrategy` | O(entries), shares code across capsules | sees shared-tree mutations |
//! | `CopyStrategy` | O(tree), disk-heavy | isolated from shared-tree mutations |
//!
//! The strategy is chosen once, at engine construction.

use serde::{Deserialize, Serialize};

use crate::domain::capsule::CapsuleLayout;
use crate::domain::error::CapsuleError;

/// Entry name that always resolves into the instance's own storage
pub const STORAGE_ENTRY: &str = "storage";

/// Ordered directory entries a link-based capsule exposes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSpec {
    entries: Vec<String>,
}

impl LinkSpec {
    /// Build a spec from configured names. Duplicates are dropped (first wins)
    /// and `storage` is appended when missing.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entries: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !entries.contains(&name) {
                entries.push(name);
            }
        }
        if !entries.iter().any(|e| e == STORAGE_ENTRY) {
            entries.push(STORAGE_ENTRY.to_string());
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LinkSpec {
    fn default() -> Self {
        Self::new(default_link_names())
    }
}

pub fn default_link_names() -> Vec<String> {
    ["app", "bootstrap", "config", "database", "public", "resources", "vendor", STORAGE_ENTRY]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Which strategy a configuration selects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Link,
    Copy,
}

impl StrategyKind {
    pub fn from_use_symlinks(use_symlinks: bool) -> Self {
        if use_symlinks {
            Self::Link
        } else {
            Self::Copy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Copy => "copy",
        }
    }
}

/// Materializes a capsule tree
///
/// Implementations must be idempotent on a correctly provisioned capsule and
/// must leave `capsule_path/storage` resolving to `storage_path`. They do not
/// clean up after themselves on failure; the lifecycle destroys the whole
/// capsule path instead.
pub trait ProvisioningStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn materialize(&self, layout: &CapsuleLayout) -> Result<(), CapsuleError>;
}
