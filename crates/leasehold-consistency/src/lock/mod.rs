//! Distributed Lock Implementation
//!
//! This module provides:
//! - Lock record data model and ownership identity
//! - Store and transaction traits
//! - In-memory store with row-level locking
//! - Lock coordinator (acquire/validate/unlock/maintenance)
//! - Lock handle with bounded retry and timeout

mod coordinator;
mod handle;
mod identity;
mod memory;
mod model;
mod store;

pub use coordinator::*;
pub use handle::*;
pub use identity::*;
pub use memory::*;
pub use model::*;
pub use store::*;
