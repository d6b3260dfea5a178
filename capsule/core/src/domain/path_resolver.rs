// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Path Resolver Domain Service
//!
//! Derives the capsule id and capsule path from an instance identity, and
//! owns the destructive guard consulted before a capsule tree is removed.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** `root[/cluster_id]/capsule_id` resolution and removal guard

use std::path::{Component, Path, PathBuf};

use crate::domain::capsule::{CapsuleId, HashPolicy, InstanceIdentity};
use crate::domain::error::CapsuleError;

/// Longest accepted single path segment (NAME_MAX on common filesystems)
const MAX_SEGMENT_LEN: usize = 255;

/// Resolves capsule paths under a fixed root
///
/// # Guarantees
/// - Same identity and policy always yield the same path
/// - Identity parts are joined only after passing [`validate_segment`], so a
///   capsule path always sits strictly below the root
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    policy: HashPolicy,
    partition_by_cluster: bool,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>, policy: HashPolicy, partition_by_cluster: bool) -> Self {
        Self {
            root: root.into(),
            policy,
            partition_by_cluster,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> HashPolicy {
        self.policy
    }

    pub fn capsule_id(&self, identity: &InstanceIdentity) -> CapsuleId {
        CapsuleId::derive(identity, self.policy)
    }

    /// Compute the capsule path for an identity. Pure; touches no filesystem.
    ///
    /// # Examples
    /// ```
    /// use capsule_core::domain::capsule::{HashPolicy, InstanceIdentity};
    /// use capsule_core::domain::path_resolver::PathResolver;
    /// use std::path::PathBuf;
    ///
    /// let resolver = PathResolver::new("/data/capsules", HashPolicy::Raw, true);
    /// let path = resolver.resolve(&InstanceIdentity::new("i1", "c1")).unwrap();
    /// assert_eq!(path, PathBuf::from("/data/capsules/c1/i1"));
    /// ```
    pub fn resolve(&self, identity: &InstanceIdentity) -> Result<PathBuf, CapsuleError> {
        let id = self.capsule_id(identity);
        validate_segment(id.as_str())?;

        let mut path = self.root.clone();
        if self.partition_by_cluster {
            validate_segment(&identity.cluster_id)?;
            path.push(&identity.cluster_id);
        }
        path.push(id.as_str());
        Ok(path)
    }

    /// Create any missing segments of `path`
    pub fn ensure(path: &Path) -> Result<(), CapsuleError> {
        std::fs::create_dir_all(path).map_err(|e| {
            CapsuleError::Configuration(format!(
                "Cannot create, or write to, capsule path \"{}\": {}",
                path.display(),
                e
            ))
        })
    }

    /// Create the root if needed and verify it is writable
    pub fn ensure_writable_root(&self) -> Result<(), CapsuleError> {
        Self::ensure(&self.root)?;

        let probe = self.root.join(".capsule-root-probe");
        std::fs::write(&probe, b"probe").map_err(|e| {
            CapsuleError::Configuration(format!(
                "Cannot create, or write to, capsule.root-path \"{}\": {}",
                self.root.display(),
                e
            ))
        })?;
        match std::fs::remove_file(&probe) {
            Ok(()) => Ok(()),
            // Another handle probing concurrently already removed it
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CapsuleError::Configuration(format!(
                "Failed to clean up root probe {}: {}",
                probe.display(),
                e
            ))),
        }
    }

    /// Refuse removal of anything that is not strictly inside the root
    pub fn guard_removal(&self, path: &Path) -> Result<(), CapsuleError> {
        let refuse = |reason: &str| {
            tracing::warn!(path = %path.display(), reason, "Destructive guard tripped");
            Err(CapsuleError::DestructiveGuard {
                path: path.to_path_buf(),
                reason: reason.to_string(),
            })
        };

        if path.as_os_str().is_empty() {
            return refuse("empty path");
        }
        if path.components().any(|c| c == Component::ParentDir) {
            return refuse("path contains '..'");
        }

        let normalized = normalize(path);
        if normalized.parent().is_none() {
            return refuse("filesystem root");
        }

        let root = normalize(&self.root);
        if normalized == root {
            return refuse("path is the capsule root");
        }
        if !normalized.starts_with(&root) {
            return refuse("path is outside the capsule root");
        }

        Ok(())
    }
}

/// Validate that `segment` is usable as exactly one path component
pub fn validate_segment(segment: &str) -> Result<(), CapsuleError> {
    let invalid = |why: &str| {
        Err(CapsuleError::Configuration(format!(
            "Invalid capsule path segment {:?}: {}",
            segment, why
        )))
    };

    if segment.is_empty() {
        return invalid("empty");
    }
    if segment.len() > MAX_SEGMENT_LEN {
        return invalid("too long");
    }
    if segment == "." || segment == ".." {
        tracing::warn!(segment = %segment, "Path traversal attempt in capsule identity");
        return invalid("relative component");
    }
    if segment.contains('/') || segment.contains('\\') {
        tracing::warn!(segment = %segment, "Path separator in capsule identity");
        return invalid("contains a path separator");
    }
    if segment.contains('\0') {
        return invalid("contains a null byte");
    }
    Ok(())
}

/// Drop `.` components and trailing separators without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    normalized
}
