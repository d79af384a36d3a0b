//! Logging bootstrap.
//!
//! Installs a `tracing` registry with a human-readable console layer. The
//! level comes from `log.level` in the configuration and can be overridden
//! with `RUST_LOG`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::Configuration;

/// Build the console filter, preferring `RUST_LOG` over the configured level.
pub fn console_filter(configuration: &Configuration) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(configuration.log_level()))
}

/// Install the global subscriber.
///
/// Fails if a global subscriber has already been set.
pub fn init_logging(configuration: &Configuration) -> anyhow::Result<()> {
    let console = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_filter(console_filter(configuration));

    Registry::default().with(console).try_init()?;

    tracing::debug!(level = %configuration.log_level(), "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let configuration = Configuration::default();
        // The first call may race with other tests installing a subscriber;
        // either way the second call must be rejected.
        let _ = init_logging(&configuration);
        assert!(init_logging(&configuration).is_err());
    }
}
