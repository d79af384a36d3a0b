//! Leasehold Common - shared types and utilities
//!
//! This crate provides:
//! - Lock error kinds (`LockError`, `StoreError`)
//! - Host identity discovery and clock helpers
//! - Configuration loading (`Configuration`, `LockSettings`)
//! - Logging bootstrap

pub mod config;
pub mod error;
pub mod logging;
pub mod utils;

// Re-export commonly used types
pub use crate::config::{Configuration, LockSettings};
pub use error::{LockError, Result, StoreError};
pub use utils::{current_timestamp, format_timestamp, local_hostname, local_ip, to_datetime};
