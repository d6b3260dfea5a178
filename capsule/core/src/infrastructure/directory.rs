// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Bundled collaborator implementations
//!
//! Hosts normally back [`InstanceDirectory`] with their own instance
//! registry. The in-memory directory serves development setups and tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::instance::{
    DirectoryError, InstanceDirectory, InstanceRecord, InstanceRef, StorageLocator,
};

#[derive(Clone, Default)]
pub struct InMemoryInstanceDirectory {
    records: Arc<RwLock<HashMap<String, InstanceRecord>>>,
}

impl InMemoryInstanceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = InstanceRecord>) -> Self {
        let directory = Self::new();
        for record in records {
            directory.insert(record);
        }
        directory
    }

    /// Insert or replace a record, keyed by instance id
    pub fn insert(&self, record: InstanceRecord) {
        self.records.write().insert(record.instance_id.clone(), record);
    }

    pub fn remove(&self, instance_id: &str) -> Option<InstanceRecord> {
        self.records.write().remove(instance_id)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl InstanceDirectory for InMemoryInstanceDirectory {
    async fn find(&self, instance: &InstanceRef) -> Result<InstanceRecord, DirectoryError> {
        match instance {
            InstanceRef::Record(record) => Ok(record.clone()),
            InstanceRef::Id(id) => self
                .records
                .read()
                .get(id)
                .cloned()
                .ok_or_else(|| DirectoryError::NotFound(id.clone())),
        }
    }
}

/// `<storage_root>/<cluster_id>/<instance_id>`
#[derive(Debug, Clone)]
pub struct RootedStorageLocator {
    storage_root: PathBuf,
}

impl RootedStorageLocator {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
        }
    }

    pub fn storage_root(&self) -> &std::path::Path {
        &self.storage_root
    }
}

impl StorageLocator for RootedStorageLocator {
    fn path_for(&self, instance: &InstanceRecord) -> PathBuf {
        self.storage_root
            .join(&instance.cluster_id)
            .join(&instance.instance_id)
    }
}
