// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provisioning Infrastructure Module
//!
//! Concrete implementations of the `ProvisioningStrategy` trait, the storage
//! blueprint preparation shared by both, and the factory that picks one from
//! configuration.

pub mod copy;
pub mod link;

pub use copy::CopyStrategy;
pub use link::LinkStrategy;

use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::domain::capsule_config::CapsuleSettings;
use crate::domain::error::CapsuleError;
use crate::domain::provisioning::{ProvisioningStrategy, StrategyKind};

/// Factory function to create the provisioning strategy from configuration
pub fn create_provisioning_strategy(settings: &CapsuleSettings) -> Arc<dyn ProvisioningStrategy> {
    match settings.strategy_kind() {
        StrategyKind::Link => Arc::new(LinkStrategy::new(settings.link_spec())),
        StrategyKind::Copy => Arc::new(CopyStrategy::new()),
    }
}

/// Create the instance storage path and every blueprint segment beneath it
pub fn prepare_storage(storage_path: &Path, blueprint: &[String]) -> Result<(), CapsuleError> {
    std::fs::create_dir_all(storage_path).map_err(|e| {
        CapsuleError::provisioning(storage_path, format!("Failed to create storage path: {}", e))
    })?;

    for segment in blueprint {
        let dir = storage_path.join(segment);
        std::fs::create_dir_all(&dir).map_err(|e| {
            CapsuleError::provisioning(&dir, format!("Failed to create storage blueprint directory: {}", e))
        })?;
        debug!("Storage blueprint directory ready: {}", dir.display());
    }

    Ok(())
}

/// Create a directory symlink
#[cfg(unix)]
pub(crate) fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub(crate) fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

/// Recreate a link verbatim, whatever it points at
#[cfg(unix)]
pub(crate) fn symlink_any(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub(crate) fn symlink_any(target: &Path, link: &Path) -> std::io::Result<()> {
    let resolved = link.parent().map(|p| p.join(target)).unwrap_or_else(|| target.to_path_buf());
    if resolved.is_dir() {
        std::os::windows::fs::symlink_dir(target, link)
    } else {
        std::os::windows::fs::symlink_file(target, link)
    }
}
