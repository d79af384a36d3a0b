//! Configuration management for Leasehold
//!
//! Settings are read from an optional YAML/TOML file and from environment
//! variables prefixed with `LEASEHOLD_`, where `__` separates nesting levels
//! (`LEASEHOLD_LOCK__RETRIES=5` sets `lock.retries`).

use std::path::Path;
use std::time::Duration;

use ::config::{Config, Environment, File};

pub const ENV_PREFIX: &str = "LEASEHOLD";

pub const LOCK_CHECK_INTERVAL_MS: &str = "lock.check_interval_ms";
pub const LOCK_RETRIES: &str = "lock.retries";
pub const LOCK_DEFAULT_TIMEOUT_SECONDS: &str = "lock.default_timeout_seconds";
pub const LOCK_DEFAULT_LEASE_SECONDS: &str = "lock.default_lease_seconds";

pub const DB_URL: &str = "db.url";
pub const DB_MAX_CONNECTIONS: &str = "db.pool.max_connections";
pub const DB_MIN_CONNECTIONS: &str = "db.pool.min_connections";
pub const DB_CONNECT_TIMEOUT_SECONDS: &str = "db.pool.connect_timeout_seconds";
pub const DB_SQLX_LOGGING: &str = "db.pool.sqlx_logging";

pub const LOG_LEVEL: &str = "log.level";

pub const DEFAULT_LOCK_CHECK_INTERVAL_MS: u64 = 500;
pub const DEFAULT_LOCK_RETRIES: u32 = 3;
pub const DEFAULT_LOCK_TIMEOUT_SECONDS: u64 = 60;
pub const DEFAULT_LOCK_LEASE_SECONDS: u64 = 60;

/// Retry policy and defaults applied to every lock handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockSettings {
    /// Pause between polls while the lock is held by someone else
    pub check_interval: Duration,
    /// Store failures tolerated by one `lock` call before giving up
    pub retries: u32,
    pub default_timeout: Duration,
    pub default_lease: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_millis(DEFAULT_LOCK_CHECK_INTERVAL_MS),
            retries: DEFAULT_LOCK_RETRIES,
            default_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECONDS),
            default_lease: Duration::from_secs(DEFAULT_LOCK_LEASE_SECONDS),
        }
    }
}

/// Application configuration loaded from config files and environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load configuration from `path` (when given) overlaid with environment variables.
    pub fn new(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(Self {
            config: builder.build()?,
        })
    }

    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    // ========================================================================
    // Lock Configuration
    // ========================================================================

    pub fn lock_check_interval_ms(&self) -> u64 {
        self.config
            .get_int(LOCK_CHECK_INTERVAL_MS)
            .map(|v| v.max(0) as u64)
            .unwrap_or(DEFAULT_LOCK_CHECK_INTERVAL_MS)
    }

    pub fn lock_retries(&self) -> u32 {
        self.config
            .get_int(LOCK_RETRIES)
            .map(|v| v.clamp(0, u32::MAX as i64) as u32)
            .unwrap_or(DEFAULT_LOCK_RETRIES)
    }

    pub fn lock_default_timeout_seconds(&self) -> u64 {
        self.config
            .get_int(LOCK_DEFAULT_TIMEOUT_SECONDS)
            .map(|v| v.max(0) as u64)
            .unwrap_or(DEFAULT_LOCK_TIMEOUT_SECONDS)
    }

    pub fn lock_default_lease_seconds(&self) -> u64 {
        self.config
            .get_int(LOCK_DEFAULT_LEASE_SECONDS)
            .map(|v| v.max(0) as u64)
            .unwrap_or(DEFAULT_LOCK_LEASE_SECONDS)
    }

    pub fn lock_settings(&self) -> LockSettings {
        LockSettings {
            check_interval: Duration::from_millis(self.lock_check_interval_ms()),
            retries: self.lock_retries(),
            default_timeout: Duration::from_secs(self.lock_default_timeout_seconds()),
            default_lease: Duration::from_secs(self.lock_default_lease_seconds()),
        }
    }

    // ========================================================================
    // Database Configuration
    // ========================================================================

    pub fn database_url(&self) -> Option<String> {
        self.config.get_string(DB_URL).ok()
    }

    pub fn db_max_connections(&self) -> u32 {
        self.config
            .get_int(DB_MAX_CONNECTIONS)
            .map(|v| v.clamp(1, u32::MAX as i64) as u32)
            .unwrap_or(10)
    }

    pub fn db_min_connections(&self) -> u32 {
        self.config
            .get_int(DB_MIN_CONNECTIONS)
            .map(|v| v.clamp(0, u32::MAX as i64) as u32)
            .unwrap_or(1)
    }

    pub fn db_connect_timeout_seconds(&self) -> u64 {
        self.config
            .get_int(DB_CONNECT_TIMEOUT_SECONDS)
            .map(|v| v.max(0) as u64)
            .unwrap_or(30)
    }

    pub fn db_sqlx_logging(&self) -> bool {
        self.config.get_bool(DB_SQLX_LOGGING).unwrap_or(false)
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn log_level(&self) -> String {
        self.config
            .get_string(LOG_LEVEL)
            .unwrap_or_else(|_| "info".to_string())
    }
}
