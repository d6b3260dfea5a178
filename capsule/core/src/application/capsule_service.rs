// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Capsule Service
//!
//! Application entry point for hosts: resolves an instance through the
//! [`InstanceDirectory`] and hands back a [`Capsule`] handle.
//!
//! # Operations
//!
//! - `capsule(instance, self_destruct)`: construct only
//! - `make(instance)`: construct and `up()`; the handle self-destructs
//! - `unmake(instance)`: construct, attempt `up()`, always destroy

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::lifecycle::{Capsule, CapsuleEngine};
use crate::application::locks::CapsuleLocks;
use crate::domain::capsule_config::CapsuleSettings;
use crate::domain::command::CommandRunner;
use crate::domain::error::CapsuleError;
use crate::domain::instance::{InstanceDirectory, InstanceRef, StorageLocator};
use crate::domain::provisioning::ProvisioningStrategy;
use crate::infrastructure::command_runner::ShellCommandRunner;
use crate::infrastructure::directory::RootedStorageLocator;
use crate::infrastructure::environment_writer::EnvironmentWriter;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::provisioning::create_provisioning_strategy;

#[async_trait]
pub trait CapsuleService: Send + Sync {
    /// Resolve the instance and build a handle without touching its tree
    ///
    /// # Errors
    ///
    /// - `InstanceNotFound` / `Directory` when the lookup fails
    /// - `Configuration` when the capsule root is missing or unwritable
    async fn capsule(&self, instance: InstanceRef, self_destruct: bool) -> Result<Capsule, CapsuleError>;

    /// Build a self-destructing handle and bring it up
    async fn make(&self, instance: InstanceRef) -> Result<Capsule, CapsuleError>;

    /// Remove whatever capsule the instance may have left behind
    async fn unmake(&self, instance: InstanceRef) -> Result<(), CapsuleError>;
}

/// Standard implementation of CapsuleService
pub struct StandardCapsuleService {
    directory: Arc<dyn InstanceDirectory>,
    storage_locator: Arc<dyn StorageLocator>,
    engine: CapsuleEngine,
}

impl StandardCapsuleService {
    pub fn new(
        settings: &CapsuleSettings,
        directory: Arc<dyn InstanceDirectory>,
        storage_locator: Arc<dyn StorageLocator>,
        event_bus: EventBus,
    ) -> Self {
        let engine = CapsuleEngine {
            resolver: settings.path_resolver(),
            install_path: settings.capsule.instance.install_path.clone(),
            blueprint: settings.capsule.storage.blueprint.clone(),
            default_driver: settings.capsule.database_driver.clone(),
            strategy: create_provisioning_strategy(settings),
            runner: Arc::new(ShellCommandRunner::new(settings.capsule.console_command.clone())),
            writer: EnvironmentWriter::new(),
            locks: CapsuleLocks::new(),
            event_bus,
        };

        info!(
            "Capsule service ready: root={}, strategy={}",
            settings.capsule.root_path.display(),
            engine.strategy.kind().as_str()
        );

        Self {
            directory,
            storage_locator,
            engine,
        }
    }

    /// Storage under `provisioning.storage-root` and a private event bus
    pub fn from_settings(settings: &CapsuleSettings, directory: Arc<dyn InstanceDirectory>) -> Self {
        let storage_locator = Arc::new(RootedStorageLocator::new(
            settings.provisioning.storage_root.clone(),
        ));
        Self::new(settings, directory, storage_locator, EventBus::with_default_capacity())
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.engine.runner = runner;
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn ProvisioningStrategy>) -> Self {
        self.engine.strategy = strategy;
        self
    }

    /// Share a lock registry with another service on the same capsule root
    pub fn with_locks(mut self, locks: CapsuleLocks) -> Self {
        self.engine.locks = locks;
        self
    }

    pub fn locks(&self) -> &CapsuleLocks {
        &self.engine.locks
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.engine.event_bus
    }
}

#[async_trait]
impl CapsuleService for StandardCapsuleService {
    async fn capsule(&self, instance: InstanceRef, self_destruct: bool) -> Result<Capsule, CapsuleError> {
        let record = self.directory.find(&instance).await?;
        self.engine.resolver.ensure_writable_root()?;

        let storage_path = self.storage_locator.path_for(&record);
        Ok(Capsule::new(record, storage_path, self.engine.clone(), self_destruct))
    }

    async fn make(&self, instance: InstanceRef) -> Result<Capsule, CapsuleError> {
        let mut capsule = self.capsule(instance, true).await?;
        capsule.up()?;
        Ok(capsule)
    }

    async fn unmake(&self, instance: InstanceRef) -> Result<(), CapsuleError> {
        let mut capsule = self.capsule(instance, false).await?;

        if let Err(e) = capsule.up() {
            warn!("Capsule {} could not be brought up before removal: {}", capsule.id(), e);
        }
        capsule.destroy();
        Ok(())
    }
}
