// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Copy Provisioning Strategy
//!
//! Materializes a capsule as a full physical copy of the shared install
//! tree. Only `storage` is a link, into the instance's own storage.
//!
//! **Tradeoffs:**
//! - Disk usage and provisioning time grow with the application tree
//! - Capsules are immune to concurrent mutation of the shared tree
//!
//! Partial copies are not rolled back here; the lifecycle removes the whole
//! capsule path when materialization fails.

use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

use super::{symlink_any, symlink_dir};
use crate::domain::capsule::CapsuleLayout;
use crate::domain::error::CapsuleError;
use crate::domain::provisioning::{ProvisioningStrategy, StrategyKind, STORAGE_ENTRY};

const BOOTSTRAP_DIR: &str = "bootstrap";
const BOOTSTRAP_CACHE_DIR: &str = "cache";

#[derive(Debug, Default)]
pub struct CopyStrategy;

impl CopyStrategy {
    pub fn new() -> Self {
        Self
    }

    /// Copy everything except the top-level `storage` directory.
    /// Symlinks inside the tree are recreated, never followed.
    fn copy_tree(source: &Path, dest: &Path) -> Result<u64, CapsuleError> {
        let mut copied = 0u64;

        let walker = WalkDir::new(source)
            .follow_links(false)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !(e.depth() == 1 && e.file_name() == STORAGE_ENTRY));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(source).to_path_buf();
                CapsuleError::provisioning(path, format!("Failed to walk install tree: {}", e))
            })?;

            let relative = entry.path().strip_prefix(source).map_err(|e| {
                CapsuleError::provisioning(entry.path(), format!("Entry outside install tree: {}", e))
            })?;
            let target = dest.join(relative);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                // A link here (e.g. from a link-built capsule) would be descended into
                if is_symlink(&target) {
                    remove_entry(&target)?;
                }
                std::fs::create_dir_all(&target).map_err(|e| {
                    CapsuleError::provisioning(&target, format!("Failed to create directory: {}", e))
                })?;
            } else if file_type.is_symlink() {
                let link_target = std::fs::read_link(entry.path()).map_err(|e| {
                    CapsuleError::provisioning(entry.path(), format!("Failed to read link: {}", e))
                })?;
                remove_entry(&target)?;
                symlink_any(&link_target, &target).map_err(|e| {
                    CapsuleError::provisioning(&target, format!("Failed to recreate link: {}", e))
                })?;
            } else {
                // A leftover link at the destination would be written through
                if is_symlink(&target) {
                    remove_entry(&target)?;
                }
                std::fs::copy(entry.path(), &target).map_err(|e| {
                    CapsuleError::provisioning(entry.path(), format!("Failed to copy file: {}", e))
                })?;
                copied += 1;
            }
        }

        Ok(copied)
    }

    /// Delete whatever sits at `capsule/storage`, then link it to the instance storage
    fn link_storage(layout: &CapsuleLayout) -> Result<(), CapsuleError> {
        let link = layout.capsule_path.join(STORAGE_ENTRY);
        remove_entry(&link)?;

        symlink_dir(&layout.storage_path, &link).map_err(|e| {
            CapsuleError::provisioning(
                &layout.storage_path,
                format!("Error symlinking storage target: {}", e),
            )
        })
    }

    /// Seed a writable `bootstrap/cache` with the loose files of the shared
    /// `bootstrap` directory, so compiled artifacts regenerate per capsule.
    fn populate_bootstrap_cache(layout: &CapsuleLayout) -> Result<usize, CapsuleError> {
        let source = layout.install_path.join(BOOTSTRAP_DIR);
        if !source.is_dir() {
            debug!("No shared bootstrap directory at {}", source.display());
            return Ok(0);
        }

        let cache = layout.capsule_path.join(BOOTSTRAP_DIR).join(BOOTSTRAP_CACHE_DIR);
        std::fs::create_dir_all(&cache).map_err(|e| {
            CapsuleError::provisioning(&cache, format!("Failed to create bootstrap cache: {}", e))
        })?;

        let entries = std::fs::read_dir(&source).map_err(|e| {
            CapsuleError::provisioning(&source, format!("Failed to list bootstrap directory: {}", e))
        })?;

        let mut seeded = 0;
        for entry in entries {
            let entry = entry.map_err(|e| {
                CapsuleError::provisioning(&source, format!("Failed to read bootstrap entry: {}", e))
            })?;

            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();
            if path.is_dir() {
                continue;
            }

            let dest = cache.join(&name);
            if is_symlink(&dest) {
                remove_entry(&dest)?;
            }
            std::fs::copy(&path, &dest).map_err(|e| {
                CapsuleError::provisioning(&path, format!("Failed to seed bootstrap cache: {}", e))
            })?;
            seeded += 1;
        }

        Ok(seeded)
    }
}

impl ProvisioningStrategy for CopyStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Copy
    }

    fn materialize(&self, layout: &CapsuleLayout) -> Result<(), CapsuleError> {
        let copied = Self::copy_tree(&layout.install_path, &layout.capsule_path)?;
        Self::link_storage(layout)?;
        let seeded = Self::populate_bootstrap_cache(layout)?;

        debug!(
            "Copied {} files into {} ({} bootstrap cache files)",
            copied,
            layout.capsule_path.display(),
            seeded
        );
        Ok(())
    }
}

fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// Remove a file, link or directory if present. Links are never followed.
fn remove_entry(path: &Path) -> Result<(), CapsuleError> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(CapsuleError::provisioning(path, format!("Failed to inspect entry: {}", e)))
        }
    };

    let result = if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    result.map_err(|e| CapsuleError::provisioning(path, format!("Failed to remove entry: {}", e)))
}
