//! Lock Coordinator
//!
//! Transactional state transitions on lock records:
//! - get-or-create bootstrap (READ UNCOMMITTED)
//! - acquire with an optimistic read and a pessimistic re-read on contention
//! - ownership validation, unlock, and maintenance toggles (READ COMMITTED)
//!
//! Every write is guarded by the record version, so two contenders that both
//! observe a free lock cannot both win.

use std::sync::Arc;
use std::time::Duration;

use leasehold_common::{LockError, Result, StoreError};
use tracing::{Span, debug, info, warn};

use super::identity::{HostIdentity, LockClaim, OwnerIdentity};
use super::model::LockRecord;
use super::store::{Isolation, LockStore, LockTransaction};

/// Coordinates lock state through a shared `LockStore`
pub struct LockCoordinator {
    store: Arc<dyn LockStore>,
    host: HostIdentity,
    span: Span,
}

impl LockCoordinator {
    /// Create a coordinator; log events are emitted as children of `span`.
    pub fn new(store: Arc<dyn LockStore>, host: HostIdentity, span: Span) -> Self {
        Self { store, host, span }
    }

    /// Create a coordinator for this machine with a default logging span.
    pub fn for_local_host(store: Arc<dyn LockStore>) -> Self {
        let host = HostIdentity::discover();
        let span = tracing::info_span!(
            "lock_coordinator",
            backend = store.backend(),
            host = %host.hostname
        );
        Self::new(store, host, span)
    }

    pub fn host(&self) -> &HostIdentity {
        &self.host
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Identity of the calling execution context
    pub fn current_identity(&self) -> OwnerIdentity {
        OwnerIdentity::current(&self.host)
    }

    /// Claim `name` on behalf of the calling execution context
    pub fn claim(&self, name: &str) -> LockClaim {
        LockClaim::current(name, &self.host)
    }

    /// Read the record for `name`, creating it in the cleared state if absent.
    pub async fn get_or_create(&self, name: &str) -> Result<LockRecord> {
        let mut tx = self.store.begin(Isolation::ReadUncommitted).await?;

        if let Some(record) = tx.find(name).await? {
            tx.commit().await?;
            return Ok(record);
        }

        let created = tx.insert_if_absent(&LockRecord::new(name)).await?;
        let record = tx
            .find(name)
            .await?
            .ok_or_else(|| LockError::NotFound(name.to_string()))?;
        tx.commit().await?;

        if created {
            info!(parent: &self.span, lock = %name, "Created lock record");
        }
        Ok(record)
    }

    /// Read the record for `name` without creating it.
    pub async fn get(&self, name: &str) -> Result<Option<LockRecord>> {
        let mut tx = self.store.begin(Isolation::ReadCommitted).await?;
        let record = tx.find(name).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Make one attempt to grant `claim` a lease of `lease`.
    ///
    /// Returns `Ok(false)` when another claimant holds the lease. Fails with
    /// `MaintenanceActive` when the lock is in maintenance, whether or not
    /// its lease has run out.
    pub async fn acquire_lock(&self, claim: &LockClaim, lease: Duration) -> Result<bool> {
        let name = claim.name.as_str();
        let mut tx = self.store.begin(Isolation::ReadCommitted).await?;

        let mut record = tx
            .find(name)
            .await?
            .ok_or_else(|| LockError::NotFound(name.to_string()))?;

        if record.is_maintenance() {
            return Err(LockError::MaintenanceActive(name.to_string()));
        }

        if record.is_effectively_held() {
            // Re-read under the row lock to close the window between the
            // optimistic check and the write.
            record = tx
                .find_for_update(name)
                .await?
                .ok_or_else(|| LockError::NotFound(name.to_string()))?;

            if record.is_maintenance() {
                return Err(LockError::MaintenanceActive(name.to_string()));
            }

            if record.is_effectively_held() {
                debug!(
                    parent: &self.span,
                    lock = %name,
                    holder = %record,
                    "Unable to acquire lock as it is locked by another process or thread"
                );
                metrics::counter!("leasehold_lock_contended_total", "lock" => name.to_string())
                    .increment(1);
                tx.rollback().await?;
                return Ok(false);
            }
        }

        record.apply_claim(claim, lease);
        if !Self::write(tx.as_mut(), &mut record).await? {
            debug!(
                parent: &self.span,
                lock = %name,
                "Lost acquisition race to a concurrent writer"
            );
            metrics::counter!("leasehold_lock_contended_total", "lock" => name.to_string())
                .increment(1);
            tx.rollback().await?;
            return Ok(false);
        }
        tx.commit().await?;

        info!(
            parent: &self.span,
            lock = %name,
            owner = %claim.owner,
            fence_token = record.fence_token,
            lease_ms = lease.as_millis() as u64,
            "Lock acquired"
        );
        metrics::counter!("leasehold_lock_acquired_total", "lock" => name.to_string()).increment(1);
        Ok(true)
    }

    /// Check that the calling execution context may act on `name`.
    pub async fn validate(&self, name: &str) -> Result<LockRecord> {
        let identity = self.current_identity();
        self.validate_as(name, &identity).await
    }

    /// Check that `identity` may act on `name`.
    ///
    /// Fails with `InvalidOwnership` if the lease is in force and held by
    /// someone else. A record that is not held passes.
    pub async fn validate_as(&self, name: &str, identity: &OwnerIdentity) -> Result<LockRecord> {
        let mut tx = self.store.begin(Isolation::ReadCommitted).await?;
        let record = self.check_ownership(tx.as_mut(), name, identity).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Release the lease held by the calling execution context.
    pub async fn unlock(&self, name: &str) -> Result<()> {
        let identity = self.current_identity();
        self.unlock_as(name, &identity).await
    }

    pub async fn unlock_as(&self, name: &str, identity: &OwnerIdentity) -> Result<()> {
        let mut tx = self.store.begin(Isolation::ReadCommitted).await?;
        let mut record = self.check_ownership(tx.as_mut(), name, identity).await?;

        record.clear();
        Self::write_or_conflict(tx.as_mut(), &mut record).await?;
        tx.commit().await?;

        info!(parent: &self.span, lock = %name, owner = %identity, "Lock released");
        Ok(())
    }

    /// Alias of [`unlock`](Self::unlock).
    pub async fn release(&self, name: &str) -> Result<()> {
        self.unlock(name).await
    }

    /// Put the lock held by the calling execution context into maintenance.
    ///
    /// The lease is left as is, so the lock keeps looking held to others.
    pub async fn enter_maintenance(&self, name: &str) -> Result<()> {
        let identity = self.current_identity();
        self.enter_maintenance_as(name, &identity).await
    }

    pub async fn enter_maintenance_as(&self, name: &str, identity: &OwnerIdentity) -> Result<()> {
        let mut tx = self.store.begin(Isolation::ReadCommitted).await?;
        let mut record = self.check_ownership(tx.as_mut(), name, identity).await?;

        record.enable_maintenance();
        Self::write_or_conflict(tx.as_mut(), &mut record).await?;
        tx.commit().await?;

        warn!(
            parent: &self.span,
            lock = %name,
            owner = %identity,
            expires_at = %record.expires_at_time(),
            "Lock entered maintenance mode"
        );
        Ok(())
    }

    /// Leave maintenance and clear the lock. No ownership check is made.
    pub async fn exit_maintenance(&self, name: &str) -> Result<()> {
        let mut tx = self.store.begin(Isolation::ReadCommitted).await?;
        let mut record = tx
            .find(name)
            .await?
            .ok_or_else(|| LockError::NotFound(name.to_string()))?;

        if !record.is_effectively_held() && !record.is_maintenance() {
            return Err(LockError::NotInMaintenance(name.to_string()));
        }

        record.clear();
        Self::write_or_conflict(tx.as_mut(), &mut record).await?;
        tx.commit().await?;

        info!(parent: &self.span, lock = %name, "Lock left maintenance mode");
        Ok(())
    }

    /// Enter (`true`) or exit (`false`) maintenance.
    pub async fn set_maintenance(&self, name: &str, enabled: bool) -> Result<()> {
        if enabled {
            self.enter_maintenance(name).await
        } else {
            self.exit_maintenance(name).await
        }
    }

    async fn check_ownership(
        &self,
        tx: &mut dyn LockTransaction,
        name: &str,
        identity: &OwnerIdentity,
    ) -> Result<LockRecord> {
        let record = tx
            .find(name)
            .await?
            .ok_or_else(|| LockError::NotFound(name.to_string()))?;

        if !record.same_owner(identity) && record.is_effectively_held() {
            debug!(parent: &self.span, lock = %name, caller = %identity, holder = %record, "Ownership check failed");
            return Err(LockError::InvalidOwnership {
                expected: format!("DistributedLock(name={name}, {identity})"),
                actual: record.to_string(),
            });
        }
        Ok(record)
    }

    /// Persist `record` guarded by its current version, bumping the version.
    async fn write(tx: &mut dyn LockTransaction, record: &mut LockRecord) -> Result<bool> {
        let expected = record.version;
        record.version = expected + 1;
        Ok(tx.update(record, expected).await?)
    }

    async fn write_or_conflict(tx: &mut dyn LockTransaction, record: &mut LockRecord) -> Result<()> {
        if Self::write(tx, record).await? {
            Ok(())
        } else {
            Err(StoreError::Conflict(format!(
                "lock '{}' was modified concurrently",
                record.name
            ))
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::MemoryLockStore;

    fn coordinator(store: &MemoryLockStore, host: &str) -> LockCoordinator {
        LockCoordinator::new(
            Arc::new(store.clone()),
            HostIdentity::new(host, "10.0.0.1"),
            Span::none(),
        )
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = MemoryLockStore::new();
        let coord = coordinator(&store, "node-a");

        let first = coord.get_or_create("orders").await.unwrap();
        let second = coord.get_or_create("orders").await.unwrap();

        assert_eq!(first, second);
        assert!(!first.locked);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_claim_carries_current_identity() {
        let store = MemoryLockStore::new();
        let coord = coordinator(&store, "node-a");

        let claim = coord.claim("orders");
        assert_eq!(claim.name, "orders");
        assert_eq!(claim.owner, coord.current_identity());
        assert_eq!(claim.owner.hostname, "node-a");
    }

    #[tokio::test]
    async fn test_acquire_unknown_lock_fails() {
        let store = MemoryLockStore::new();
        let coord = coordinator(&store, "node-a");

        let result = coord.acquire_lock(&coord.claim("ghost"), Duration::from_secs(5)).await;
        assert!(matches!(result, Err(LockError::NotFound(name)) if name == "ghost"));
    }

    #[tokio::test]
    async fn test_acquire_free_then_contended() {
        let store = MemoryLockStore::new();
        let a = coordinator(&store, "node-a");
        let b = coordinator(&store, "node-b");
        a.get_or_create("orders").await.unwrap();

        assert!(a.acquire_lock(&a.claim("orders"), Duration::from_secs(30)).await.unwrap());
        assert!(!b.acquire_lock(&b.claim("orders"), Duration::from_secs(30)).await.unwrap());

        let record = store.peek("orders").unwrap();
        assert_eq!(record.hostname, "node-a");
        assert_eq!(record.fence_token, 1);
        assert_eq!(record.version, 1);
    }

    #[tokio::test]
    async fn test_expired_lease_is_acquirable_without_unlock() {
        let store = MemoryLockStore::new();
        let a = coordinator(&store, "node-a");
        let b = coordinator(&store, "node-b");
        a.get_or_create("orders").await.unwrap();

        assert!(a.acquire_lock(&a.claim("orders"), Duration::from_millis(50)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(b.acquire_lock(&b.claim("orders"), Duration::from_secs(30)).await.unwrap());
        assert_eq!(store.peek("orders").unwrap().hostname, "node-b");
        assert_eq!(store.peek("orders").unwrap().fence_token, 2);
    }

    #[tokio::test]
    async fn test_validate_detects_foreign_holder() {
        let store = MemoryLockStore::new();
        let a = coordinator(&store, "node-a");
        let b = coordinator(&store, "node-b");
        a.get_or_create("orders").await.unwrap();

        a.acquire_lock(&a.claim("orders"), Duration::from_secs(30)).await.unwrap();

        assert!(a.validate("orders").await.is_ok());
        assert!(matches!(
            b.validate("orders").await,
            Err(LockError::InvalidOwnership { .. })
        ));
    }

    #[tokio::test]
    async fn test_validate_passes_when_not_held() {
        let store = MemoryLockStore::new();
        let a = coordinator(&store, "node-a");
        a.get_or_create("orders").await.unwrap();

        let record = a.validate("orders").await.unwrap();
        assert!(!record.locked);
    }

    #[tokio::test]
    async fn test_validate_unknown_lock() {
        let store = MemoryLockStore::new();
        let a = coordinator(&store, "node-a");
        assert!(matches!(
            a.validate("ghost").await,
            Err(LockError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unlock_clears_record() {
        let store = MemoryLockStore::new();
        let a = coordinator(&store, "node-a");
        a.get_or_create("orders").await.unwrap();
        a.acquire_lock(&a.claim("orders"), Duration::from_secs(30)).await.unwrap();

        a.unlock("orders").await.unwrap();

        let record = store.peek("orders").unwrap();
        assert!(!record.locked);
        assert_eq!(record.thread_id, -1);
        assert!(record.hostname.is_empty());
        assert_eq!(record.version, 2);
    }

    #[tokio::test]
    async fn test_unlock_by_other_owner_fails() {
        let store = MemoryLockStore::new();
        let a = coordinator(&store, "node-a");
        let b = coordinator(&store, "node-b");
        a.get_or_create("orders").await.unwrap();
        a.acquire_lock(&a.claim("orders"), Duration::from_secs(30)).await.unwrap();

        assert!(matches!(
            b.release("orders").await,
            Err(LockError::InvalidOwnership { .. })
        ));
        assert!(store.peek("orders").unwrap().locked);
    }

    #[tokio::test]
    async fn test_maintenance_blocks_other_claimants_even_after_expiry() {
        let store = MemoryLockStore::new();
        let a = coordinator(&store, "node-a");
        let b = coordinator(&store, "node-b");
        a.get_or_create("orders").await.unwrap();

        a.acquire_lock(&a.claim("orders"), Duration::from_millis(50)).await.unwrap();
        a.enter_maintenance("orders").await.unwrap();

        assert!(matches!(
            b.acquire_lock(&b.claim("orders"), Duration::from_secs(1)).await,
            Err(LockError::MaintenanceActive(_))
        ));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(matches!(
            b.acquire_lock(&b.claim("orders"), Duration::from_secs(1)).await,
            Err(LockError::MaintenanceActive(_))
        ));

        b.exit_maintenance("orders").await.unwrap();
        assert!(b.acquire_lock(&b.claim("orders"), Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_enter_maintenance_requires_ownership() {
        let store = MemoryLockStore::new();
        let a = coordinator(&store, "node-a");
        let b = coordinator(&store, "node-b");
        a.get_or_create("orders").await.unwrap();
        a.acquire_lock(&a.claim("orders"), Duration::from_secs(30)).await.unwrap();

        assert!(matches!(
            b.set_maintenance("orders", true).await,
            Err(LockError::InvalidOwnership { .. })
        ));
        assert!(!store.peek("orders").unwrap().maintenance);
    }

    #[tokio::test]
    async fn test_enter_maintenance_keeps_lease() {
        let store = MemoryLockStore::new();
        let a = coordinator(&store, "node-a");
        a.get_or_create("orders").await.unwrap();
        a.acquire_lock(&a.claim("orders"), Duration::from_secs(30)).await.unwrap();
        let before = store.peek("orders").unwrap();

        a.enter_maintenance("orders").await.unwrap();

        let after = store.peek("orders").unwrap();
        assert!(after.maintenance);
        assert!(after.is_effectively_held());
        assert_eq!(after.expires_at, before.expires_at);
        assert_eq!(after.owner(), before.owner());
    }

    #[tokio::test]
    async fn test_exit_maintenance_on_free_lock_fails() {
        let store = MemoryLockStore::new();
        let a = coordinator(&store, "node-a");
        a.get_or_create("orders").await.unwrap();

        assert!(matches!(
            a.set_maintenance("orders", false).await,
            Err(LockError::NotInMaintenance(_))
        ));
    }

    #[tokio::test]
    async fn test_exit_maintenance_clears_held_lock() {
        let store = MemoryLockStore::new();
        let a = coordinator(&store, "node-a");
        a.get_or_create("orders").await.unwrap();
        a.acquire_lock(&a.claim("orders"), Duration::from_secs(30)).await.unwrap();

        a.exit_maintenance("orders").await.unwrap();
        assert!(!store.peek("orders").unwrap().locked);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_store_error() {
        let store = MemoryLockStore::new();
        let a = coordinator(&store, "node-a");
        a.get_or_create("orders").await.unwrap();

        store.inject_failures(1);
        assert!(matches!(
            a.acquire_lock(&a.claim("orders"), Duration::from_secs(1)).await,
            Err(LockError::Store(StoreError::Unavailable(_)))
        ));
    }
}
