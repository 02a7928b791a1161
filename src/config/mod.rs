//! Configuration management

pub mod validation;

pub use validation::{Validate, ValidationError};

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::infrastructure::resilience::{
    ADVISORY_API, AI_ANALYSIS, CircuitBreakerConfig, ResilienceRegistry, RetryConfig,
    SCAN_EXECUTOR, SOURCE_HOST,
};

/// Circuit breaker configuration (serializable version)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfigSerializable {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Duration to wait before admitting a half-open probe (in seconds)
    pub recovery_timeout_seconds: u64,
    /// Timeout for individual requests (in seconds)
    pub request_timeout_seconds: u64,
}

impl Default for CircuitBreakerConfigSerializable {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_seconds: 60,
            request_timeout_seconds: 30,
        }
    }
}

impl CircuitBreakerConfigSerializable {
    /// Convert to the runtime CircuitBreakerConfig
    pub fn to_circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_secs(self.recovery_timeout_seconds),
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
        }
    }
}

/// Retry configuration (serializable version)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfigSerializable {
    /// Maximum number of attempts, first try included
    pub max_attempts: u32,
    /// Delay before the second attempt (in milliseconds); doubles each retry
    pub base_delay_ms: u64,
    /// Cap on the exponential delay (in milliseconds)
    pub max_delay_ms: u64,
    /// Upper bound of the uniform jitter added to each delay (in milliseconds)
    pub jitter_ms: u64,
}

impl Default for RetryConfigSerializable {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            jitter_ms: 250,
        }
    }
}

impl RetryConfigSerializable {
    /// Convert to the runtime RetryConfig
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: Duration::from_millis(self.jitter_ms),
        }
    }
}

/// Breaker + retry settings for one external dependency
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyResilienceConfig {
    pub breaker: CircuitBreakerConfigSerializable,
    pub retry: RetryConfigSerializable,
}

/// Resilience settings for every known external dependency.
///
/// The primary scan path gets a loose threshold and a long request timeout;
/// the AI integration is non-critical and trips earlier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub scan_executor: DependencyResilienceConfig,
    pub advisory_api: DependencyResilienceConfig,
    pub ai_analysis: DependencyResilienceConfig,
    pub source_host: DependencyResilienceConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            scan_executor: DependencyResilienceConfig {
                breaker: CircuitBreakerConfigSerializable {
                    failure_threshold: 5,
                    recovery_timeout_seconds: 60,
                    request_timeout_seconds: 300,
                },
                retry: RetryConfigSerializable::default(),
            },
            advisory_api: DependencyResilienceConfig::default(),
            ai_analysis: DependencyResilienceConfig {
                breaker: CircuitBreakerConfigSerializable {
                    failure_threshold: 3,
                    recovery_timeout_seconds: 120,
                    request_timeout_seconds: 60,
                },
                retry: RetryConfigSerializable {
                    max_attempts: 2,
                    ..Default::default()
                },
            },
            source_host: DependencyResilienceConfig::default(),
        }
    }
}

impl ResilienceConfig {
    /// Build the runtime policy registry, one policy per dependency.
    pub fn build_registry(&self) -> ResilienceRegistry {
        let entry = |name, dep: &DependencyResilienceConfig| {
            (
                name,
                dep.breaker.to_circuit_breaker_config(),
                dep.retry.to_retry_config(),
            )
        };
        ResilienceRegistry::new([
            entry(SCAN_EXECUTOR, &self.scan_executor),
            entry(ADVISORY_API, &self.advisory_api),
            entry(AI_ANALYSIS, &self.ai_analysis),
            entry(SOURCE_HOST, &self.source_host),
        ])
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of jobs in the running state at once
    pub max_concurrent_jobs: usize,
    /// Dispatch tick interval (in milliseconds)
    pub tick_interval_ms: u64,
    /// Number of most recent job records kept by cleanup
    pub retention: usize,
    /// Minimum age (in seconds) of a terminal job before cleanup may evict it
    pub cleanup_grace_seconds: u64,
    /// Per-subscriber event buffer size
    pub broadcast_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 3,
            tick_interval_ms: 500,
            retention: 100,
            cleanup_grace_seconds: 60,
            broadcast_capacity: 16,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level filter (overridden by `RUST_LOG`)
    pub level: String,
    /// Output format: "pretty", "json", or "compact"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub resilience: ResilienceConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from files and environment.
    ///
    /// Sources, lowest to highest priority: `config/default.toml`,
    /// `config/{ENV}.toml`, `config/local.toml`, then `VIGIL__*` environment
    /// variables with `__` as the section separator
    /// (e.g. `VIGIL__SCHEDULER__MAX_CONCURRENT_JOBS=5`).
    pub fn load() -> Result<Self, ConfigLoadError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));

        if let Ok(env) = std::env::var("ENV") {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{}", env)).required(false));
        }

        builder = builder
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("VIGIL").separator("__"));

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationError> {
        self.scheduler.validate()?;
        self.resilience.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Configuration file error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Validation(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::resilience::{AI_ANALYSIS, SCAN_EXECUTOR};

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.scheduler.max_concurrent_jobs, 3);
        assert_eq!(config.scheduler.tick_interval_ms, 500);
        assert_eq!(config.scheduler.retention, 100);
        assert_eq!(config.resilience.scan_executor.breaker.failure_threshold, 5);
        assert_eq!(config.resilience.ai_analysis.breaker.failure_threshold, 3);
    }

    #[test]
    fn serializable_configs_convert_to_runtime_types() {
        let retry = RetryConfigSerializable {
            max_attempts: 4,
            base_delay_ms: 100,
            max_delay_ms: 5000,
            jitter_ms: 50,
        }
        .to_retry_config();
        assert_eq!(retry.max_attempts, 4);
        assert_eq!(retry.base_delay, Duration::from_millis(100));
        assert_eq!(retry.jitter, Duration::from_millis(50));

        let breaker = CircuitBreakerConfigSerializable::default().to_circuit_breaker_config();
        assert_eq!(breaker.failure_threshold, 5);
        assert_eq!(breaker.recovery_timeout, Duration::from_secs(60));
    }

    #[test]
    fn registry_built_from_config_has_all_dependencies() {
        let registry = ResilienceConfig::default().build_registry();
        assert_eq!(registry.dependencies().count(), 4);
        assert!(registry.policy(SCAN_EXECUTOR).is_some());
        assert!(registry.policy(AI_ANALYSIS).is_some());
    }

    #[test]
    fn config_deserializes_from_partial_toml() {
        let parsed: Config = config::Config::builder()
            .add_source(config::File::from_str(
                "[scheduler]\nmax_concurrent_jobs = 8\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(parsed.scheduler.max_concurrent_jobs, 8);
        // Untouched sections fall back to defaults.
        assert_eq!(parsed.scheduler.retention, 100);
    }
}
