//! Logging setup for hosts embedding the runtime.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` wins over `config.filter`. Returns `false` if a subscriber was
/// already installed (tests, or a host with its own setup).
pub fn init_logging(config: &LoggingConfig) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .try_init()
            .is_ok()
    }
}
