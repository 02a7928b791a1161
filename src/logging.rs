//! Structured logging with tracing

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Initialize the global tracing subscriber from logging configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Returns an error
/// if a subscriber was already installed.
pub fn init_tracing(
    config: &LoggingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match config.format.as_str() {
        "json" => builder.json().try_init()?,
        "compact" => builder.compact().try_init()?,
        _ => builder.pretty().try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test owns the process-global subscriber; the json format exercises
    // the structured output path.
    #[test]
    fn init_succeeds_once_then_reports_installed_subscriber() {
        let config = LoggingConfig {
            level: "debug".into(),
            format: "json".into(),
        };
        assert!(init_tracing(&config).is_ok());
        assert!(init_tracing(&config).is_err());
    }
}
