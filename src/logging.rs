//! Logging setup for the detection runner
//!
//! The library only emits `tracing` events. Binaries and tests decide where
//! they go by installing a subscriber through this module.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "span_inspector=debug")
    pub level_filter: String,
    /// Emit one JSON object per line instead of human-readable output
    pub json_format: bool,
    /// Include the event target (module path)
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level_filter: "info,span_inspector=info".to_string(),
            json_format: false,
            with_target: true,
        }
    }
}

/// Build the env filter, letting `RUST_LOG` win over the configured level
fn env_filter(level_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_filter))
}

/// Initialize console logging (human-readable or JSON).
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = env_filter(&config.level_filter);

    let console_layer = if config.json_format {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_level(true)
            .with_target(config.with_target)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_level(true)
            .with_target(config.with_target)
            .with_filter(filter)
            .boxed()
    };

    tracing_subscriber::registry().with(console_layer).try_init()?;

    tracing::info!(
        level_filter = %config.level_filter,
        json_format = config.json_format,
        "🖥️ Logging initialized"
    );

    Ok(())
}

/// Initialize simple logging for testing or minimal setups
pub fn init_simple_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter("info,span_inspector=info"))
        .try_init()?;

    tracing::info!("🖥️ Simple console logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert!(config.level_filter.contains("span_inspector=info"));
        assert!(!config.json_format);
    }

    #[test]
    fn test_second_init_reports_error() {
        // Whichever call loses the race for the global subscriber must error, not panic
        let first = init_simple_logging();
        let second = init_simple_logging();
        assert!(first.is_err() || second.is_err());
    }
}
