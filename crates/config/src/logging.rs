//! Tracing subscriber setup driven by [`LoggingConfig`].

use tracing_subscriber::EnvFilter;

use crate::{ConfigError, LogFormat, LoggingConfig};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Only the first
/// successful call in a process installs anything; later calls return
/// [`ConfigError::Logging`].
pub fn init(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };

    installed.map_err(|e| ConfigError::Logging(e.to_string()))
}
