//! Leasehold Persistence - Database entities and SQL lock store
//!
//! This crate provides:
//! - SeaORM entity definition for the `distributed_lock` table
//! - `SqlLockStore`, a `LockStore` over MySQL/PostgreSQL
//! - Database connection setup from configuration

pub mod entity;
pub mod sql;

// Re-export sea-orm for convenience
pub use sea_orm;

pub use sql::{SqlLockStore, database_connection};
