// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Capsule Lifecycle
//!
//! The [`Capsule`] handle owns one instance's capsule tree between `up()` and
//! `down()`.
//!
//! # State Machine
//!
//! ```text
//! Unprovisioned ──up()──▶ Up ──down(false)──▶ Down ──up()──▶ Up
//!                          └──up()──▶ Up (idempotent re-provision)
//! ```
//!
//! # Guarantees
//!
//! - `up()` is all-or-nothing: on failure the partial tree is purged and the
//!   original error is returned
//! - `down()` surfaces removal failures; `destroy()` only logs them
//! - Removal never follows links, so shared and storage trees survive
//! - A self-destructing handle tears its capsule down when dropped

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::application::locks::CapsuleLocks;
use crate::domain::capsule::{CapsuleId, CapsuleLayout, CapsuleState, InstanceIdentity};
use crate::domain::command::{CommandArgs, CommandContext, CommandOutput, CommandRunner};
use crate::domain::error::CapsuleError;
use crate::domain::events::CapsuleEvent;
use crate::domain::instance::InstanceRecord;
use crate::domain::path_resolver::PathResolver;
use crate::domain::provisioning::ProvisioningStrategy;
use crate::infrastructure::environment_writer::EnvironmentWriter;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::provisioning::prepare_storage;

/// Collaborators shared by every capsule handle of one engine
#[derive(Clone)]
pub struct CapsuleEngine {
    pub resolver: PathResolver,
    pub install_path: PathBuf,
    pub blueprint: Vec<String>,
    pub default_driver: String,
    pub strategy: Arc<dyn ProvisioningStrategy>,
    pub runner: Arc<dyn CommandRunner>,
    pub writer: EnvironmentWriter,
    pub locks: CapsuleLocks,
    pub event_bus: EventBus,
}

/// Handle to one instance's capsule
pub struct Capsule {
    record: InstanceRecord,
    identity: InstanceIdentity,
    id: CapsuleId,
    storage_path: PathBuf,
    engine: CapsuleEngine,
    capsule_path: Option<PathBuf>,
    state: CapsuleState,
    self_destruct: bool,
    last_output: Option<CommandOutput>,
}

impl Capsule {
    pub fn new(
        record: InstanceRecord,
        storage_path: PathBuf,
        engine: CapsuleEngine,
        self_destruct: bool,
    ) -> Self {
        let identity = record.identity();
        let id = engine.resolver.capsule_id(&identity);
        debug!("Capsule handle {} created for {}", id, identity);

        Self {
            record,
            identity,
            id,
            storage_path,
            engine,
            capsule_path: None,
            state: CapsuleState::Unprovisioned,
            self_destruct,
            last_output: None,
        }
    }

    pub fn id(&self) -> &CapsuleId {
        &self.id
    }

    pub fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }

    pub fn record(&self) -> &InstanceRecord {
        &self.record
    }

    /// Set while a capsule tree may exist on disk
    pub fn capsule_path(&self) -> Option<&Path> {
        self.capsule_path.as_deref()
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    pub fn state(&self) -> CapsuleState {
        self.state
    }

    pub fn self_destruct(&self) -> bool {
        self.self_destruct
    }

    /// Output of the most recent `call()`
    pub fn last_output(&self) -> Option<&CommandOutput> {
        self.last_output.as_ref()
    }

    /// Provision the capsule, or re-provision an existing one in place
    pub fn up(&mut self) -> Result<(), CapsuleError> {
        let result = {
            let lock = self.engine.locks.lock_for(&self.id);
            let _guard = lock.lock();
            self.up_locked()
        };
        if result.is_err() {
            self.engine.locks.prune();
        }
        result
    }

    fn up_locked(&mut self) -> Result<(), CapsuleError> {
        match self.provision() {
            Ok(layout) => {
                self.state = CapsuleState::Up;
                info!(
                    "Capsule {} up at {} ({})",
                    self.id,
                    layout.capsule_path.display(),
                    self.engine.strategy.kind().as_str()
                );
                self.engine.event_bus.publish_capsule_event(CapsuleEvent::CapsuleProvisioned {
                    capsule_id: self.id.clone(),
                    identity: self.identity.clone(),
                    capsule_path: layout.capsule_path.display().to_string(),
                    strategy: self.engine.strategy.kind(),
                    provisioned_at: Utc::now(),
                });
                Ok(())
            }
            Err(e) => {
                error!("Failed to provision capsule {} for {}: {}", self.id, self.identity, e);
                self.engine.event_bus.publish_capsule_event(
                    CapsuleEvent::CapsuleProvisioningFailed {
                        capsule_id: self.id.clone(),
                        identity: self.identity.clone(),
                        reason: e.to_string(),
                        failed_at: Utc::now(),
                    },
                );
                self.destroy_locked();
                Err(e)
            }
        }
    }

    fn provision(&mut self) -> Result<CapsuleLayout, CapsuleError> {
        let capsule_path = self.engine.resolver.resolve(&self.identity)?;

        // Recorded before anything is created so a rollback can find it
        self.capsule_path = Some(capsule_path.clone());
        PathResolver::ensure(&capsule_path)?;

        let layout = CapsuleLayout {
            install_path: self.engine.install_path.clone(),
            storage_path: self.storage_path.clone(),
            capsule_path,
        };

        let template = layout.template_path();
        if !template.is_file() {
            return Err(CapsuleError::Configuration(format!(
                "Runtime template not found at {}",
                template.display()
            )));
        }

        prepare_storage(&layout.storage_path, &self.engine.blueprint)?;
        self.engine.strategy.materialize(&layout)?;

        let credentials = self.record.credentials(&self.engine.default_driver);
        self.engine
            .writer
            .write_credentials(&template, &layout.env_path(), &credentials)?;

        Ok(layout)
    }

    /// Remove the capsule tree unless `keep` is set
    pub fn down(&mut self, keep: bool) -> Result<(), CapsuleError> {
        if keep {
            debug!("Keeping capsule {} on down", self.id);
            return Ok(());
        }
        if self.capsule_path.is_none() {
            return Ok(());
        }

        let result = {
            let lock = self.engine.locks.lock_for(&self.id);
            let _guard = lock.lock();
            self.teardown()
        };
        // Entries for capsules nobody is touching would otherwise accumulate
        self.engine.locks.prune();
        result
    }

    /// `down(false)`, logging instead of returning failures
    pub fn destroy(&mut self) {
        if let Err(e) = self.down(false) {
            warn!("Failed to destroy capsule {}: {}", self.id, e);
        }
    }

    fn destroy_locked(&mut self) {
        if let Err(e) = self.teardown() {
            warn!("Failed to roll back capsule {}: {}", self.id, e);
        }
    }

    /// Caller holds the capsule lock
    fn teardown(&mut self) -> Result<(), CapsuleError> {
        let Some(path) = self.capsule_path.clone() else {
            return Ok(());
        };

        if let Err(e) = self.remove_tree(&path) {
            self.engine.event_bus.publish_capsule_event(CapsuleEvent::CapsuleTeardownFailed {
                capsule_id: self.id.clone(),
                capsule_path: path.display().to_string(),
                reason: e.to_string(),
                failed_at: Utc::now(),
            });
            return Err(e);
        }

        self.capsule_path = None;
        self.state = CapsuleState::Down;
        info!("Capsule {} down, removed {}", self.id, path.display());
        self.engine.event_bus.publish_capsule_event(CapsuleEvent::CapsuleTornDown {
            capsule_id: self.id.clone(),
            capsule_path: path.display().to_string(),
            torn_down_at: Utc::now(),
        });
        Ok(())
    }

    fn remove_tree(&self, path: &Path) -> Result<(), CapsuleError> {
        self.engine.resolver.guard_removal(path)?;

        match std::fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Capsule path {} already gone", path.display());
                Ok(())
            }
            Err(source) => Err(CapsuleError::Os {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Run a console command inside the capsule
    ///
    /// Requires a successful `up()`. A non-zero exit code is returned as
    /// data; only spawn and I/O failures are errors.
    pub async fn call(
        &mut self,
        command: &str,
        args: &CommandArgs,
    ) -> Result<CommandOutput, CapsuleError> {
        let working_dir = match (&self.capsule_path, self.state.is_up()) {
            (Some(path), true) => path.clone(),
            _ => {
                return Err(CapsuleError::Logic(format!(
                    "Capsule {} must be up before running '{}'",
                    self.id, command
                )))
            }
        };

        let context = CommandContext {
            capsule_id: self.id.clone(),
            working_dir,
        };

        let started = Instant::now();
        let output = self.engine.runner.run(&context, command, args).await?;
        let elapsed = started.elapsed();

        info!(
            capsule_id = %self.id,
            exit_code = output.exit_code,
            "Command '{}' finished in {:?}",
            command,
            elapsed
        );
        self.engine.event_bus.publish_capsule_event(CapsuleEvent::CommandExecuted {
            capsule_id: self.id.clone(),
            command: command.to_string(),
            exit_code: output.exit_code,
            duration_ms: elapsed.as_millis() as u64,
            executed_at: Utc::now(),
        });

        self.last_output = Some(output.clone());
        Ok(output)
    }
}

impl Drop for Capsule {
    fn drop(&mut self) {
        if self.self_destruct {
            self.destroy();
        }
    }
}

impl std::fmt::Debug for Capsule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capsule")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("capsule_path", &self.capsule_path)
            .field("state", &self.state)
            .field("self_destruct", &self.self_destruct)
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::capsule::HashPolicy;
    use crate::domain::provisioning::LinkSpec;
    use crate::infrastructure::provisioning::LinkStrategy;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct EchoRunner;

    #[async_trait]
    impl CommandRunner for EchoRunner {
        async fn run(
            &self,
            context: &CommandContext,
            command: &str,
            _args: &CommandArgs,
        ) -> Result<CommandOutput, CapsuleError> {
            Ok(CommandOutput {
                exit_code: 0,
                stdout: format!("{} in {}\n", command, context.working_dir.display()),
                stderr: String::new(),
            })
        }
    }

    struct Fixture {
        temp_dir: TempDir,
        engine: CapsuleEngine,
    }

    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let install_path = temp_dir.path().join("install");
        std::fs::create_dir_all(install_path.join("app")).unwrap();
        std::fs::write(install_path.join(".env"), "APP_NAME=Launchpad\n").unwrap();

        let engine = CapsuleEngine {
            resolver: PathResolver::new(temp_dir.path().join("capsules"), HashPolicy::Raw, true),
            install_path,
            blueprint: vec!["logs".to_string()],
            default_driver: "mysql".to_string(),
            strategy: Arc::new(LinkStrategy::new(LinkSpec::new(["app"]))),
            runner: Arc::new(EchoRunner),
            writer: EnvironmentWriter::new(),
            locks: CapsuleLocks::new(),
            event_bus: EventBus::new(32),
        };
        Fixture { temp_dir, engine }
    }

    fn record() -> InstanceRecord {
        InstanceRecord {
            instance_id: "i1".to_string(),
            cluster_id: "c1".to_string(),
            db_driver: None,
            db_host: "db.internal".to_string(),
            db_name: "i1_db".to_string(),
            db_user: "i1".to_string(),
            db_password: "pw".to_string(),
            db_port: 3306,
        }
    }

    fn capsule(fx: &Fixture, self_destruct: bool) -> Capsule {
        let storage = fx.temp_dir.path().join("storage").join("c1").join("i1");
        Capsule::new(record(), storage, fx.engine.clone(), self_destruct)
    }

    #[test]
    fn test_up_then_down() {
        let fx = fixture();
        let mut capsule = capsule(&fx, false);
        assert_eq!(capsule.state(), CapsuleState::Unprovisioned);

        capsule.up().unwrap();
        let path = capsule.capsule_path().unwrap().to_path_buf();
        assert_eq!(path, fx.temp_dir.path().join("capsules").join("c1").join("i1"));
        assert!(path.join(".env").is_file());
        assert_eq!(capsule.state(), CapsuleState::Up);

        capsule.down(false).unwrap();
        assert!(!path.exists());
        assert_eq!(capsule.state(), CapsuleState::Down);
        assert!(capsule.capsule_path().is_none());

        capsule.down(false).unwrap();
    }

    #[test]
    fn test_down_keep_leaves_tree() {
        let fx = fixture();
        let mut capsule = capsule(&fx, false);
        capsule.up().unwrap();

        capsule.down(true).unwrap();
        assert!(capsule.capsule_path().unwrap().exists());
        assert_eq!(capsule.state(), CapsuleState::Up);
    }

    #[test]
    fn test_missing_template_rolls_back() {
        let fx = fixture();
        std::fs::remove_file(fx.engine.install_path.join(".env")).unwrap();
        let mut capsule = capsule(&fx, false);

        let err = capsule.up().unwrap_err();
        assert!(matches!(err, CapsuleError::Configuration(_)));
        assert!(capsule.capsule_path().is_none());
        assert!(!fx.temp_dir.path().join("capsules").join("c1").join("i1").exists());
    }

    #[tokio::test]
    async fn test_call_requires_up() {
        let fx = fixture();
        let mut capsule = capsule(&fx, false);

        let err = capsule.call("migrate", &CommandArgs::new()).await.unwrap_err();
        assert!(matches!(err, CapsuleError::Logic(_)));
        assert!(capsule.last_output().is_none());
    }

    #[tokio::test]
    async fn test_call_records_last_output_and_publishes() {
        let fx = fixture();
        let mut receiver = fx.engine.event_bus.subscribe();
        let mut capsule = capsule(&fx, false);
        capsule.up().unwrap();

        let output = capsule.call("migrate", &CommandArgs::new().flag("--seed")).await.unwrap();
        assert!(output.stdout.starts_with("migrate in "));
        assert_eq!(capsule.last_output(), Some(&output));

        assert!(matches!(receiver.recv().await.unwrap(), CapsuleEvent::CapsuleProvisioned { .. }));
        match receiver.recv().await.unwrap() {
            CapsuleEvent::CommandExecuted { command, exit_code, .. } => {
                assert_eq!(command, "migrate");
                assert_eq!(exit_code, 0);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_drop_self_destructs() {
        let fx = fixture();
        let path = {
            let mut capsule = capsule(&fx, true);
            capsule.up().unwrap();
            capsule.capsule_path().unwrap().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_lock_entries_released_after_down_and_failed_up() {
        let fx = fixture();
        let mut capsule = capsule(&fx, false);

        capsule.up().unwrap();
        assert_eq!(fx.engine.locks.len(), 1);
        capsule.down(false).unwrap();
        assert!(fx.engine.locks.is_empty());

        std::fs::remove_file(fx.engine.install_path.join(".env")).unwrap();
        assert!(capsule.up().is_err());
        assert!(fx.engine.locks.is_empty());
    }

    #[test]
    fn test_down_refused_outside_root_keeps_tree() {
        let fx = fixture();
        let mut receiver = fx.engine.event_bus.subscribe();
        let mut capsule = capsule(&fx, false);
        capsule.up().unwrap();
        let path = capsule.capsule_path().unwrap().to_path_buf();

        // Root changed under a live handle: its tree is no longer below it
        capsule.engine.resolver =
            PathResolver::new(fx.temp_dir.path().join("elsewhere"), HashPolicy::Raw, true);

        let err = capsule.down(false).unwrap_err();
        assert!(matches!(err, CapsuleError::DestructiveGuard { .. }));
        assert!(path.join(".env").is_file());
        assert_eq!(capsule.capsule_path(), Some(path.as_path()));
        assert_eq!(capsule.state(), CapsuleState::Up);

        assert!(matches!(receiver.try_recv().unwrap(), CapsuleEvent::CapsuleProvisioned { .. }));
        match receiver.try_recv().unwrap() {
            CapsuleEvent::CapsuleTeardownFailed { capsule_path, .. } => {
                assert_eq!(capsule_path, path.display().to_string());
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // destroy() swallows the same failure
        capsule.destroy();
        assert!(path.exists());
    }

    #[test]
    fn test_remove_failure_surfaces_as_os_error() {
        let fx = fixture();
        let mut capsule = capsule(&fx, false);
        capsule.up().unwrap();
        let path = capsule.capsule_path().unwrap().to_path_buf();

        // Something replaced the tree with a plain file
        std::fs::remove_dir_all(&path).unwrap();
        std::fs::write(&path, b"not a capsule").unwrap();

        let err = capsule.down(false).unwrap_err();
        match err {
            CapsuleError::Os { path: failed, .. } => assert_eq!(failed, path),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(path.is_file());
        assert_eq!(capsule.state(), CapsuleState::Up);
        assert!(fx.engine.locks.is_empty());
    }

    #[test]
    fn test_drop_swallows_teardown_failure() {
        let fx = fixture();
        let path = {
            let mut capsule = capsule(&fx, true);
            capsule.up().unwrap();
            capsule.engine.resolver =
                PathResolver::new(fx.temp_dir.path().join("elsewhere"), HashPolicy::Raw, true);
            capsule.capsule_path().unwrap().to_path_buf()
        };
        assert!(path.join(".env").is_file());
    }

    #[test]
    fn test_drop_without_self_destruct_keeps_tree() {
        let fx = fixture();
        let path = {
            let mut capsule = capsule(&fx, false);
            capsule.up().unwrap();
            capsule.capsule_path().unwrap().to_path_buf()
        };
        assert!(path.join(".env").is_file());
    }
}
