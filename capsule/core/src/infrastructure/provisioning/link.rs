// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Link Provisioning Strategy
//!
//! Builds a capsule as a farm of symbolic links into the shared install
//! tree, with `storage` pointing at the instance's own storage.
//!
//! **Tradeoffs:**
//! - Constant cost per entry, no disk usage beyond the links
//! - Capsules observe any mutation of the shared tree immediately

use std::path::{Path, PathBuf};
use tracing::{debug, error};

use super::symlink_dir;
use crate::domain::capsule::CapsuleLayout;
use crate::domain::error::CapsuleError;
use crate::domain::provisioning::{LinkSpec, ProvisioningStrategy, StrategyKind, STORAGE_ENTRY};

pub struct LinkStrategy {
    link_spec: LinkSpec,
}

impl LinkStrategy {
    pub fn new(link_spec: LinkSpec) -> Self {
        Self { link_spec }
    }

    pub fn link_spec(&self) -> &LinkSpec {
        &self.link_spec
    }

    fn target_for(entry: &str, layout: &CapsuleLayout) -> PathBuf {
        if entry == STORAGE_ENTRY {
            layout.storage_path.clone()
        } else {
            layout.install_path.join(entry)
        }
    }

    /// Ok(true) when a correct link is already in place
    fn existing_link_matches(link: &Path, target: &Path) -> Result<bool, CapsuleError> {
        let metadata = match std::fs::symlink_metadata(link) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(CapsuleError::provisioning(
                    link,
                    format!("Failed to inspect existing entry: {}", e),
                ))
            }
        };

        if !metadata.file_type().is_symlink() {
            return Err(CapsuleError::provisioning(
                link,
                "Entry exists and is not a link; tear the capsule down to recreate it",
            ));
        }

        let current = std::fs::read_link(link).map_err(|e| {
            CapsuleError::provisioning(link, format!("Failed to read existing link: {}", e))
        })?;

        if current != target {
            return Err(CapsuleError::provisioning(
                link,
                format!(
                    "Existing link points at \"{}\" instead of \"{}\"; tear the capsule down to recreate it",
                    current.display(),
                    target.display()
                ),
            ));
        }

        Ok(true)
    }
}

impl ProvisioningStrategy for LinkStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Link
    }

    fn materialize(&self, layout: &CapsuleLayout) -> Result<(), CapsuleError> {
        for entry in self.link_spec.entries() {
            let target = Self::target_for(entry, layout);
            let link = layout.capsule_path.join(entry);

            if Self::existing_link_matches(&link, &target)? {
                debug!("Link {} already points at {}", link.display(), target.display());
                continue;
            }

            if !target.exists() {
                error!("Error symlinking target \"{}\": target does not exist", target.display());
                return Err(CapsuleError::provisioning(
                    &target,
                    format!("Error symlinking target for entry '{}': target does not exist", entry),
                ));
            }

            symlink_dir(&target, &link).map_err(|e| {
                error!("Error symlinking target \"{}\": {}", target.display(), e);
                CapsuleError::provisioning(
                    &target,
                    format!("Error symlinking target for entry '{}': {}", entry, e),
                )
            })?;

            debug!("Linked {} -> {}", link.display(), target.display());
        }

        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        layout: CapsuleLayout,
    }

    fn fixture(install_dirs: &[&str]) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let install_path = temp_dir.path().join("install");
        for dir in install_dirs {
            std::fs::create_dir_all(install_path.join(dir)).unwrap();
        }
        let storage_path = temp_dir.path().join("storage").join("i1");
        std::fs::create_dir_all(&storage_path).unwrap();
        let capsule_path = temp_dir.path().join("capsules").join("abc");
        std::fs::create_dir_all(&capsule_path).unwrap();

        Fixture {
            layout: CapsuleLayout {
                install_path,
                storage_path,
                capsule_path,
            },
            _temp_dir: temp_dir,
        }
    }

    #[test]
    fn test_links_entries_and_storage() {
        let fx = fixture(&["app", "vendor"]);
        let strategy = LinkStrategy::new(LinkSpec::new(["app", "vendor"]));

        strategy.materialize(&fx.layout).unwrap();

        let capsule = &fx.layout.capsule_path;
        assert_eq!(std::fs::read_link(capsule.join("app")).unwrap(), fx.layout.install_path.join("app"));
        assert_eq!(std::fs::read_link(capsule.join("vendor")).unwrap(), fx.layout.install_path.join("vendor"));
        assert_eq!(std::fs::read_link(capsule.join("storage")).unwrap(), fx.layout.storage_path);
    }

    #[test]
    fn test_second_materialize_is_noop() {
        let fx = fixture(&["app"]);
        let strategy = LinkStrategy::new(LinkSpec::new(["app"]));

        strategy.materialize(&fx.layout).unwrap();
        strategy.materialize(&fx.layout).unwrap();

        assert_eq!(
            std::fs::read_link(fx.layout.capsule_path.join("app")).unwrap(),
            fx.layout.install_path.join("app")
        );
    }

    #[test]
    fn test_link_pointing_elsewhere_is_an_error() {
        let fx = fixture(&["app", "other"]);
        symlink_dir(&fx.layout.install_path.join("other"), &fx.layout.capsule_path.join("app")).unwrap();

        let strategy = LinkStrategy::new(LinkSpec::new(["app"]));
        let err = strategy.materialize(&fx.layout).unwrap_err();
        assert!(matches!(err, CapsuleError::Provisioning { .. }));
        assert!(err.to_string().contains("instead of"));
    }

    #[test]
    fn test_plain_directory_in_place_is_an_error() {
        let fx = fixture(&["app"]);
        std::fs::create_dir(fx.layout.capsule_path.join("app")).unwrap();

        let strategy = LinkStrategy::new(LinkSpec::new(["app"]));
        assert!(strategy.materialize(&fx.layout).is_err());
    }

    #[test]
    fn test_missing_target_names_the_target_and_stops() {
        let fx = fixture(&["app"]);
        let strategy = LinkStrategy::new(LinkSpec::new(["app", "config", "vendor"]));

        let err = strategy.materialize(&fx.layout).unwrap_err();
        match err {
            CapsuleError::Provisioning { path, .. } => {
                assert_eq!(path, fx.layout.install_path.join("config"));
            }
            other => panic!("unexpected error: {other}"),
        }

        // Entries after the failing one were never attempted
        assert!(std::fs::symlink_metadata(fx.layout.capsule_path.join("app")).is_ok());
        assert!(std::fs::symlink_metadata(fx.layout.capsule_path.join("vendor")).is_err());
    }
}
