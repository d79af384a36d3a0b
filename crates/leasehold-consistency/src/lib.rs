//! Leasehold Consistency - lease-based distributed locking
//!
//! This crate provides:
//! - The persisted lock record and its state transitions
//! - The `LockStore` abstraction over a transactional shared store
//! - An in-process store backend
//! - `LockCoordinator`, the race-safe acquire/validate/release protocol
//! - `LockHandle`, the retrying client facade used by application code

pub mod lock;

// Re-export lock types
pub use lock::{
    HostIdentity, Isolation, LockClaim, LockCoordinator, LockHandle, LockRecord, LockStore,
    LockTransaction, MemoryLockStore, OwnerIdentity, WaitInterrupter,
};
