//! Lock Inventory
//!
//! In-process instrumentation of namespace locks. The admin layer only
//! reads it through [`LockInventory`]; acquiring and releasing locks is the
//! business of the storage layer that owns them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of lock held on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockType {
    Read,
    Write,
}

/// Whether the lock is held or still waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockStatus {
    Running,
    Blocked,
}

/// One lock on `(namespace, path)` as reported by a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    pub namespace: String,
    pub path: String,
    pub lock_type: LockType,
    pub status: LockStatus,
    /// Operation that took (or is waiting for) the lock
    pub operation_id: String,
    /// Call site that requested the lock
    pub source: String,
    /// When the lock was requested
    pub since: DateTime<Utc>,
    /// How long the lock has been held or waited for
    pub elapsed: Duration,
}

/// Local lock query owned by the lock subsystem
pub trait LockInventory: Send + Sync {
    /// Locks in `namespace` whose path starts with `prefix`, held at least `min_age`.
    /// An empty namespace matches every namespace.
    fn list_locks(&self, namespace: &str, prefix: &str, min_age: Duration) -> Vec<LockRecord>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NsParam {
    namespace: String,
    path: String,
}

#[derive(Debug, Clone)]
struct HeldLock {
    operation_id: String,
    lock_type: LockType,
    status: LockStatus,
    source: String,
    since: DateTime<Utc>,
}

/// In-memory lock instrumentation
#[derive(Debug, Default)]
pub struct LockRegistry {
    next_id: AtomicU64,
    entries: RwLock<HashMap<NsParam, Vec<HeldLock>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a granted lock, returning its operation id
    pub fn acquire(&self, namespace: &str, path: &str, lock_type: LockType, source: &str) -> String {
        self.register(namespace, path, lock_type, LockStatus::Running, source, Utc::now())
    }

    /// Record a lock request that is waiting behind another holder
    pub fn block(&self, namespace: &str, path: &str, lock_type: LockType, source: &str) -> String {
        self.register(namespace, path, lock_type, LockStatus::Blocked, source, Utc::now())
    }

    /// Record a lock with an explicit request time
    pub fn register(
        &self,
        namespace: &str,
        path: &str,
        lock_type: LockType,
        status: LockStatus,
        source: &str,
        since: DateTime<Utc>,
    ) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let operation_id = format!("op-{id}");

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry(NsParam {
                namespace: namespace.to_string(),
                path: path.to_string(),
            })
            .or_default()
            .push(HeldLock {
                operation_id: operation_id.clone(),
                lock_type,
                status,
                source: source.to_string(),
                since,
            });

        operation_id
    }

    /// Mark a blocked request as granted
    pub fn grant(&self, namespace: &str, path: &str, operation_id: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let key = NsParam {
            namespace: namespace.to_string(),
            path: path.to_string(),
        };
        match entries
            .get_mut(&key)
            .and_then(|locks| locks.iter_mut().find(|l| l.operation_id == operation_id))
        {
            Some(lock) => {
                lock.status = LockStatus::Running;
                true
            }
            None => false,
        }
    }

    /// Drop a lock; returns false if it was not held
    pub fn release(&self, namespace: &str, path: &str, operation_id: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let key = NsParam {
            namespace: namespace.to_string(),
            path: path.to_string(),
        };

        let Some(locks) = entries.get_mut(&key) else {
            return false;
        };
        let before = locks.len();
        locks.retain(|l| l.operation_id != operation_id);
        let removed = locks.len() != before;
        if locks.is_empty() {
            entries.remove(&key);
        }
        removed
    }

    /// Number of locks currently tracked
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LockInventory for LockRegistry {
    fn list_locks(&self, namespace: &str, prefix: &str, min_age: Duration) -> Vec<LockRecord> {
        let now = Utc::now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        let mut records = Vec::new();
        for (param, locks) in entries.iter() {
            if !namespace.is_empty() && param.namespace != namespace {
                continue;
            }
            if !param.path.starts_with(prefix) {
                continue;
            }

            for lock in locks {
                let elapsed = (now - lock.since).to_std().unwrap_or_default();
                if elapsed < min_age {
                    continue;
                }
                records.push(LockRecord {
                    namespace: param.namespace.clone(),
                    path: param.path.clone(),
                    lock_type: lock.lock_type,
                    status: lock.status,
                    operation_id: lock.operation_id.clone(),
                    source: lock.source.clone(),
                    since: lock.since,
                    elapsed,
                });
            }
        }
        records
    }
}
