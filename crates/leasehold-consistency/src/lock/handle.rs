//! Client handle for a single named lock
//!
//! Wraps the coordinator with the caller-facing acquisition loop: poll
//! every `lock_check_interval` until the lease is granted or the deadline
//! passes, spending `lock_retries` on transient failures.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use leasehold_common::{LockError, LockSettings, Result};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::coordinator::LockCoordinator;
use super::identity::LockClaim;
use super::model::LockRecord;

#[derive(Default)]
struct InterruptState {
    pending: AtomicBool,
    notify: Notify,
}

/// Wakes a `LockHandle` that is sleeping between acquisition attempts.
#[derive(Clone)]
pub struct WaitInterrupter {
    state: Arc<InterruptState>,
}

impl WaitInterrupter {
    /// Abort the current (or next) wait with `LockError::InterruptedWait`.
    pub fn interrupt(&self) {
        self.state.pending.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }
}

/// Handle to one named distributed lock
pub struct LockHandle {
    name: String,
    coordinator: Arc<LockCoordinator>,
    lock_check_interval: Duration,
    lock_retries: u32,
    interrupt: Arc<InterruptState>,
}

impl LockHandle {
    /// Create a handle, making sure the lock record exists.
    pub async fn new(
        name: impl Into<String>,
        coordinator: Arc<LockCoordinator>,
        lock_check_interval: Duration,
        lock_retries: u32,
    ) -> Result<Self> {
        let name = name.into();
        coordinator.get_or_create(&name).await?;

        Ok(Self {
            name,
            coordinator,
            lock_check_interval,
            lock_retries,
            interrupt: Arc::new(InterruptState::default()),
        })
    }

    /// Create a handle using the polling policy from `settings`.
    pub async fn from_settings(
        name: impl Into<String>,
        coordinator: Arc<LockCoordinator>,
        settings: &LockSettings,
    ) -> Result<Self> {
        Self::new(name, coordinator, settings.check_interval, settings.retries).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lock_check_interval(&self) -> Duration {
        self.lock_check_interval
    }

    pub fn lock_retries(&self) -> u32 {
        self.lock_retries
    }

    pub fn coordinator(&self) -> &Arc<LockCoordinator> {
        &self.coordinator
    }

    pub fn interrupter(&self) -> WaitInterrupter {
        WaitInterrupter {
            state: self.interrupt.clone(),
        }
    }

    /// Current persisted record, created if absent
    pub async fn get_lock(&self) -> Result<LockRecord> {
        self.coordinator.get_or_create(&self.name).await
    }

    /// Acquire the lock for `lease`, waiting at most `timeout`.
    ///
    /// Contention does not consume retries; store failures do. The deadline
    /// bounds waiting on contention, while store failures end the call only
    /// once the retry budget is spent.
    pub async fn lock(&self, timeout: Duration, lease: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let claim = self.coordinator.claim(&self.name);
        let span = self.coordinator.span();
        let mut attempts_left = self.lock_retries;

        loop {
            match self.coordinator.acquire_lock(&claim, lease).await {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    if Instant::now() >= deadline {
                        return Err(self.timed_out(&claim));
                    }
                    debug!(
                        parent: span,
                        lock = %self.name,
                        interval_ms = self.lock_check_interval.as_millis() as u64,
                        "Lock is held elsewhere, waiting"
                    );
                    self.wait().await?;
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempts_left == 0 {
                        error!(
                            parent: span,
                            lock = %self.name,
                            error = %e,
                            "Unable to acquire lock, retries exhausted"
                        );
                        return Err(LockError::UpdateFailed {
                            claim: claim.to_string(),
                            source: Box::new(e),
                        });
                    }
                    attempts_left -= 1;
                    warn!(
                        parent: span,
                        lock = %self.name,
                        error = %e,
                        attempts_left,
                        "Lock acquisition failed, retrying"
                    );
                    metrics::counter!("leasehold_lock_retry_total", "lock" => self.name.clone())
                        .increment(1);
                }
            }
        }
    }

    /// Check that the calling execution context may act on this lock.
    pub async fn validate(&self) -> Result<LockRecord> {
        self.coordinator.validate(&self.name).await
    }

    pub async fn unlock(&self) -> Result<()> {
        self.coordinator.unlock(&self.name).await
    }

    /// Lock for `hours` and `minutes`, then put the lock into maintenance.
    pub async fn enter_maintenance_window(
        &self,
        timeout: Duration,
        hours: u64,
        minutes: u64,
    ) -> Result<()> {
        let lease = Duration::from_secs(hours * 3600 + minutes * 60);
        self.lock(timeout, lease).await?;
        self.coordinator.enter_maintenance(&self.name).await
    }

    pub async fn exit_maintenance_window(&self) -> Result<()> {
        self.coordinator.exit_maintenance(&self.name).await
    }

    async fn wait(&self) -> Result<()> {
        let notified = self.interrupt.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.interrupt.pending.swap(false, Ordering::SeqCst) {
            return Err(LockError::InterruptedWait(self.name.clone()));
        }

        tokio::select! {
            _ = tokio::time::sleep(self.lock_check_interval) => Ok(()),
            _ = &mut notified => {
                self.interrupt.pending.store(false, Ordering::SeqCst);
                Err(LockError::InterruptedWait(self.name.clone()))
            }
        }
    }

    fn timed_out(&self, claim: &LockClaim) -> LockError {
        warn!(
            parent: self.coordinator.span(),
            lock = %self.name,
            claim = %claim,
            "Timed out waiting for lock"
        );
        metrics::counter!("leasehold_lock_timeout_total", "lock" => self.name.clone()).increment(1);
        LockError::TimedOut(self.name.clone())
    }
}
