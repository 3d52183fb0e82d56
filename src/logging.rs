//! Subscriber setup for binaries embedding the workflow
use super::config::{ConfigError, LogFormat, LoggingConfig};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. Library code only emits events; the
/// embedding binary decides whether and how they are written.
///
/// `RUST_LOG` directives are added on top of the configured level.
pub fn init(config: &LoggingConfig) -> Result<(), ConfigError> {
    let log_level = config.level.parse::<Level>().unwrap_or(Level::INFO);
    let filter = EnvFilter::from_default_env().add_directive(log_level.into());

    let installed = match config.format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_target(false)
            .with_env_filter(filter)
            .compact()
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_target(false)
            .with_env_filter(filter)
            .pretty()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_target(false)
            .with_env_filter(filter)
            .json()
            .try_init(),
    };

    installed.map_err(|error| ConfigError::Logging(error.to_string()))
}
