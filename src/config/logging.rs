// ABOUTME: Tracing subscriber setup driven by the logging section of the configuration
// ABOUTME: RUST_LOG takes precedence over the configured level when it is set

use anyhow::Result;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use super::LoggingConfig;

/// Installs a global fmt subscriber.
///
/// Returns `Ok(false)` without touching anything when a global subscriber
/// is already installed, so embedding applications keep their own.
pub fn init_logging(config: &LoggingConfig) -> Result<bool> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))?;

    let installed = match config.format.as_str() {
        "compact" => tracing_subscriber::fmt()
            .compact()
            .with_env_filter(env_filter)
            .with_target(false)
            .try_init()
            .is_ok(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_names(true)
            .try_init()
            .is_ok(),
    };

    if installed {
        debug!("Logging initialized with level: {}", config.level);
    }
    Ok(installed)
}
