//! Persistent store abstraction for lock records
//!
//! A store hands out transactions; all reads and writes of a lock record go
//! through one. Backends must provide:
//! - READ COMMITTED transactions, plus a READ UNCOMMITTED mode for bootstrap
//! - a row-level pessimistic write lock obtainable mid-transaction
//! - version-guarded updates (compare-and-set on `LockRecord::version`)
//!
//! Dropping a transaction without committing it rolls it back.

use async_trait::async_trait;
use leasehold_common::StoreError;

use super::model::LockRecord;

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    ReadUncommitted,
    ReadCommitted,
}

/// A shared persistent store of lock records
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Start a transaction at the given isolation level
    async fn begin(&self, isolation: Isolation) -> Result<Box<dyn LockTransaction>, StoreError>;

    /// Short backend label used in logs
    fn backend(&self) -> &'static str;
}

/// An open transaction against a `LockStore`
#[async_trait]
pub trait LockTransaction: Send {
    /// Read a record without locking it
    async fn find(&mut self, name: &str) -> Result<Option<LockRecord>, StoreError>;

    /// Read a record and hold its row write lock until commit or rollback
    async fn find_for_update(&mut self, name: &str) -> Result<Option<LockRecord>, StoreError>;

    /// Insert `record` unless a record with the same name exists.
    ///
    /// Returns `true` if the row was inserted.
    async fn insert_if_absent(&mut self, record: &LockRecord) -> Result<bool, StoreError>;

    /// Overwrite the stored record if its version still equals `expected_version`.
    ///
    /// Returns `true` if the row was updated.
    async fn update(
        &mut self,
        record: &LockRecord,
        expected_version: i64,
    ) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
