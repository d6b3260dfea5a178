// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Per-capsule runtime config (`.env`) materialization
//!
//! Reads the shared template, forces the instance's database connection into
//! it and writes the result into the capsule. Everything the engine does not
//! override is carried over untouched.

use std::path::Path;
use tracing::debug;

use crate::domain::environment::RuntimeEnvironment;
use crate::domain::error::CapsuleError;
use crate::domain::instance::DatabaseCredentials;

#[derive(Debug, Default, Clone, Copy)]
pub struct EnvironmentWriter;

impl EnvironmentWriter {
    pub fn new() -> Self {
        Self
    }

    /// Render `template_path` with `overrides` applied and write it to `dest_path`
    pub fn write<K, V>(
        &self,
        template_path: &Path,
        dest_path: &Path,
        overrides: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), CapsuleError>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let template = std::fs::read_to_string(template_path).map_err(|e| {
            CapsuleError::Configuration(format!(
                "Runtime template {} could not be read: {}",
                template_path.display(),
                e
            ))
        })?;

        let mut environment = RuntimeEnvironment::parse(&template);
        environment.apply(overrides);

        // A link left at the destination would write into the shared tree
        if let Ok(metadata) = std::fs::symlink_metadata(dest_path) {
            if metadata.file_type().is_symlink() {
                std::fs::remove_file(dest_path).map_err(|source| CapsuleError::Persistence {
                    path: dest_path.to_path_buf(),
                    source,
                })?;
            }
        }

        std::fs::write(dest_path, environment.render()).map_err(|source| {
            CapsuleError::Persistence {
                path: dest_path.to_path_buf(),
                source,
            }
        })?;

        debug!("Runtime environment written to {}", dest_path.display());
        Ok(())
    }

    /// Write the template with the instance's six DB_* connection values forced
    pub fn write_credentials(
        &self,
        template_path: &Path,
        dest_path: &Path,
        credentials: &DatabaseCredentials,
    ) -> Result<(), CapsuleError> {
        self.write(template_path, dest_path, credentials.to_overrides())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEMPLATE: &str = "\
# Launchpad runtime
APP_NAME=Launchpad
APP_KEY=\"base64:abc=\"

DB_HOST=template-host
DB_DATABASE=template_db
export CACHE_DRIVER=file
";

    fn credentials() -> DatabaseCredentials {
        DatabaseCredentials {
            driver: "mysql".to_string(),
            host: "10.0.0.5".to_string(),
            database: "i1_db".to_string(),
            username: "i1_user".to_string(),
            password: "p@ss word".to_string(),
            port: 3306,
        }
    }

    fn setup() -> (TempDir, std::path::PathBuf, std::path::PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let template = temp_dir.path().join("template.env");
        std::fs::write(&template, TEMPLATE).unwrap();
        let dest = temp_dir.path().join(".env");
        (temp_dir, template, dest)
    }

    #[test]
    fn test_forces_db_keys_and_keeps_the_rest() {
        let (_temp_dir, template, dest) = setup();

        EnvironmentWriter::new()
            .write_credentials(&template, &dest, &credentials())
            .unwrap();

        let written = std::fs::read_to_string(&dest).unwrap();
        let env = RuntimeEnvironment::parse(&written);
        assert_eq!(env.get("DB_HOST"), Some("10.0.0.5"));
        assert_eq!(env.get("DB_DATABASE"), Some("i1_db"));
        assert_eq!(env.get("DB_USERNAME"), Some("i1_user"));
        assert_eq!(env.get("DB_PASSWORD"), Some("p@ss word"));
        assert_eq!(env.get("DB_PORT"), Some("3306"));
        assert_eq!(env.get("DB_DRIVER"), Some("mysql"));
        assert_eq!(env.get("APP_NAME"), Some("Launchpad"));

        assert!(written.starts_with("# Launchpad runtime\n"));
        assert!(written.contains("APP_KEY=\"base64:abc=\"\n"));
        assert!(written.contains("export CACHE_DRIVER=file\n"));
        assert!(!written.contains("template-host"));
    }

    #[test]
    fn test_missing_keys_appended_in_canonical_order() {
        let (_temp_dir, template, dest) = setup();

        EnvironmentWriter::new()
            .write_credentials(&template, &dest, &credentials())
            .unwrap();

        let written = std::fs::read_to_string(&dest).unwrap();
        let env = RuntimeEnvironment::parse(&written);
        let keys = env.keys();
        let appended: Vec<&str> = keys.iter().rev().take(4).rev().copied().collect();
        assert_eq!(appended, vec!["DB_DRIVER", "DB_USERNAME", "DB_PASSWORD", "DB_PORT"]);
    }

    #[test]
    fn test_repeated_writes_are_identical() {
        let (_temp_dir, template, dest) = setup();
        let writer = EnvironmentWriter::new();

        writer.write_credentials(&template, &dest, &credentials()).unwrap();
        let first = std::fs::read(&dest).unwrap();
        writer.write_credentials(&template, &dest, &credentials()).unwrap();
        let second = std::fs::read(&dest).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_template_is_configuration_error() {
        let (temp_dir, _template, dest) = setup();
        let missing = temp_dir.path().join("nope.env");

        let err = EnvironmentWriter::new()
            .write_credentials(&missing, &dest, &credentials())
            .unwrap_err();
        assert!(matches!(err, CapsuleError::Configuration(_)));
    }

    #[test]
    fn test_unwritable_destination_is_persistence_error() {
        let (temp_dir, template, _dest) = setup();
        let dest = temp_dir.path().join("no-such-dir").join(".env");

        let err = EnvironmentWriter::new()
            .write_credentials(&template, &dest, &credentials())
            .unwrap_err();
        assert!(matches!(err, CapsuleError::Persistence { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_linked_destination_is_replaced_not_written_through() {
        let (_temp_dir, template, dest) = setup();
        std::os::unix::fs::symlink(&template, &dest).unwrap();

        EnvironmentWriter::new()
            .write_credentials(&template, &dest, &credentials())
            .unwrap();

        assert_eq!(std::fs::read_to_string(&template).unwrap(), TEMPLATE);
        assert!(!std::fs::symlink_metadata(&dest).unwrap().file_type().is_symlink());
    }
}
