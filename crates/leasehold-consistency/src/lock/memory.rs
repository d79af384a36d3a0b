//! In-memory lock store
//!
//! Shares state between every clone of the store, so independent
//! coordinators in one process contend exactly as they would on a database.
//! Each transaction buffers its writes until commit; row write locks are
//! taken by `find_for_update` and by every write and held until the
//! transaction ends. Reads always see committed data.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use leasehold_common::StoreError;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

use super::model::LockRecord;
use super::store::{Isolation, LockStore, LockTransaction};

/// In-memory lock store with row-level write locks
#[derive(Clone, Default)]
pub struct MemoryLockStore {
    rows: Arc<DashMap<String, LockRecord>>,
    row_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    injected_failures: Arc<AtomicU32>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to `begin` fail with `StoreError::Unavailable`.
    pub fn inject_failures(&self, count: u32) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Committed state of a record
    pub fn peek(&self, name: &str) -> Option<LockRecord> {
        self.rows.get(name).map(|r| r.value().clone())
    }

    /// Number of lock records
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn take_injected_failure(&self) -> bool {
        self.injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn begin(&self, isolation: Isolation) -> Result<Box<dyn LockTransaction>, StoreError> {
        if self.take_injected_failure() {
            return Err(StoreError::Unavailable(
                "injected memory store failure".to_string(),
            ));
        }

        trace!(?isolation, "Memory transaction started");
        Ok(Box::new(MemoryTransaction {
            rows: self.rows.clone(),
            row_locks: self.row_locks.clone(),
            held: HashMap::new(),
            pending: HashMap::new(),
        }))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

struct MemoryTransaction {
    rows: Arc<DashMap<String, LockRecord>>,
    row_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    held: HashMap<String, OwnedMutexGuard<()>>,
    pending: HashMap<String, LockRecord>,
}

impl MemoryTransaction {
    async fn lock_row(&mut self, name: &str) {
        if self.held.contains_key(name) {
            return;
        }

        let row_lock = self
            .row_locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let guard = row_lock.lock_owned().await;
        self.held.insert(name.to_string(), guard);
    }

    fn read(&self, name: &str) -> Option<LockRecord> {
        self.pending
            .get(name)
            .cloned()
            .or_else(|| self.rows.get(name).map(|r| r.value().clone()))
    }
}

#[async_trait]
impl LockTransaction for MemoryTransaction {
    async fn find(&mut self, name: &str) -> Result<Option<LockRecord>, StoreError> {
        Ok(self.read(name))
    }

    async fn find_for_update(&mut self, name: &str) -> Result<Option<LockRecord>, StoreError> {
        self.lock_row(name).await;
        Ok(self.read(name))
    }

    async fn insert_if_absent(&mut self, record: &LockRecord) -> Result<bool, StoreError> {
        self.lock_row(&record.name).await;
        if self.read(&record.name).is_some() {
            return Ok(false);
        }

        self.pending.insert(record.name.clone(), record.clone());
        Ok(true)
    }

    async fn update(
        &mut self,
        record: &LockRecord,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        self.lock_row(&record.name).await;
        match self.read(&record.name) {
            Some(current) if current.version == expected_version => {
                self.pending.insert(record.name.clone(), record.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            rows,
            held,
            pending,
            ..
        } = *self;

        for (name, record) in pending {
            rows.insert(name, record);
        }

        // Row locks are released only after every write is visible
        drop(held);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
