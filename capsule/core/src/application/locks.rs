// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Keyed lock registry
//!
//! One mutex per [`CapsuleId`]. `up`, `down` and `destroy` on the same id
//! serialize on it; different ids never contend. The registry is cheap to
//! clone and every clone shares the same set of locks. Entries are pruned
//! once a capsule is torn down and no handle holds its mutex.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::domain::capsule::CapsuleId;

#[derive(Clone, Default)]
pub struct CapsuleLocks {
    locks: Arc<DashMap<CapsuleId, Arc<Mutex<()>>>>,
}

impl CapsuleLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex for `id`, created on first use
    ///
    /// Callers lock the returned mutex themselves and hold the guard only for
    /// the duration of a synchronous filesystem operation.
    pub fn lock_for(&self, id: &CapsuleId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop entries nobody is holding
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_id_shares_one_mutex() {
        let locks = CapsuleLocks::new();
        let id = CapsuleId::from_raw("abc");

        let a = locks.lock_for(&id);
        let b = locks.clone().lock_for(&id);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(locks.len(), 1);

        let _guard = a.lock();
        assert!(b.try_lock().is_none());
    }

    #[test]
    fn test_different_ids_do_not_contend() {
        let locks = CapsuleLocks::new();
        let a = locks.lock_for(&CapsuleId::from_raw("a"));
        let b = locks.lock_for(&CapsuleId::from_raw("b"));

        let _guard = a.lock();
        assert!(b.try_lock().is_some());
    }

    #[test]
    fn test_prune_keeps_held_entries() {
        let locks = CapsuleLocks::new();
        let held = locks.lock_for(&CapsuleId::from_raw("held"));
        drop(locks.lock_for(&CapsuleId::from_raw("idle")));

        locks.prune();
        assert_eq!(locks.len(), 1);
        drop(held);

        locks.prune();
        assert!(locks.is_empty());
    }
}
