//! Error types for Leasehold
//!
//! This module defines:
//! - `StoreError`: failures reported by a lock store backend
//! - `LockError`: every way a lock operation can fail

/// Failure reported by a persistent lock store.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Lock operation error kinds
#[derive(thiserror::Error, Debug)]
pub enum LockError {
    #[error("lock '{0}' was not found")]
    NotFound(String),

    #[error("timed out waiting for lock '{0}'")]
    TimedOut(String),

    #[error("lock '{0}' is in maintenance mode so it cannot be locked")]
    MaintenanceActive(String),

    #[error("expected locked state: {expected}, actual state: {actual}")]
    InvalidOwnership { expected: String, actual: String },

    #[error("failed to acquire lock: {claim}")]
    UpdateFailed {
        claim: String,
        #[source]
        source: Box<LockError>,
    },

    #[error("wait for lock '{0}' was interrupted")]
    InterruptedWait(String),

    #[error("lock '{0}' is not in maintenance mode")]
    NotInMaintenance(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LockError {
    /// Whether the acquisition retry loop may try again after this error.
    ///
    /// Maintenance blocks and interrupted waits are deliberate and end the
    /// loop immediately; everything else counts against the retry budget.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            LockError::MaintenanceActive(_)
                | LockError::InterruptedWait(_)
                | LockError::TimedOut(_)
                | LockError::UpdateFailed { .. }
        )
    }

    /// Name of the lock this error refers to, when it carries one.
    pub fn lock_name(&self) -> Option<&str> {
        match self {
            LockError::NotFound(name)
            | LockError::TimedOut(name)
            | LockError::MaintenanceActive(name)
            | LockError::InterruptedWait(name)
            | LockError::NotInMaintenance(name) => Some(name),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maintenance_is_not_retryable() {
        assert!(!LockError::MaintenanceActive("a".to_string()).is_retryable());
        assert!(!LockError::InterruptedWait("a".to_string()).is_retryable());
    }

    #[test]
    fn test_store_errors_are_retryable() {
        let err: LockError = StoreError::Unavailable("pool closed".to_string()).into();
        assert!(err.is_retryable());
        assert!(LockError::NotFound("a".to_string()).is_retryable());
    }

    #[test]
    fn test_update_failed_keeps_source() {
        let err = LockError::UpdateFailed {
            claim: "LockClaim(name=orders)".to_string(),
            source: Box::new(StoreError::Database("deadlock".to_string()).into()),
        };
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("database error: deadlock"));
        assert_eq!(err.to_string(), "failed to acquire lock: LockClaim(name=orders)");
    }

    #[test]
    fn test_lock_name() {
        assert_eq!(
            LockError::TimedOut("orders".to_string()).lock_name(),
            Some("orders")
        );
        assert_eq!(
            LockError::Store(StoreError::Conflict("x".to_string())).lock_name(),
            None
        );
    }
}
