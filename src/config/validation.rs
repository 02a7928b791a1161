//! Configuration validation module

use crate::config::{DependencyResilienceConfig, LoggingConfig, ResilienceConfig, SchedulerConfig};

/// Trait for validating configuration sections
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Scheduler configuration error: {message}")]
    Scheduler { message: String },

    #[error("Resilience configuration error ({dependency}): {message}")]
    Resilience { dependency: String, message: String },

    #[error("Logging configuration error: {message}")]
    Logging { message: String },
}

impl ValidationError {
    pub fn scheduler(message: impl Into<String>) -> Self {
        Self::Scheduler {
            message: message.into(),
        }
    }

    pub fn resilience(dependency: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resilience {
            dependency: dependency.into(),
            message: message.into(),
        }
    }

    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }
}

impl Validate for SchedulerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.max_concurrent_jobs == 0 {
            return Err(ValidationError::scheduler(
                "max_concurrent_jobs must be at least 1",
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(ValidationError::scheduler(
                "tick_interval_ms must be non-zero",
            ));
        }
        if self.retention == 0 {
            return Err(ValidationError::scheduler("retention must be at least 1"));
        }
        if self.broadcast_capacity == 0 {
            return Err(ValidationError::scheduler(
                "broadcast_capacity must be at least 1",
            ));
        }
        Ok(())
    }
}

impl DependencyResilienceConfig {
    fn validate_for(&self, dependency: &str) -> Result<(), ValidationError> {
        if self.breaker.failure_threshold == 0 {
            return Err(ValidationError::resilience(
                dependency,
                "failure_threshold must be at least 1",
            ));
        }
        if self.breaker.request_timeout_seconds == 0 {
            return Err(ValidationError::resilience(
                dependency,
                "request_timeout_seconds must be non-zero",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ValidationError::resilience(
                dependency,
                "max_attempts must be at least 1",
            ));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ValidationError::resilience(
                dependency,
                "max_delay_ms must be >= base_delay_ms",
            ));
        }
        Ok(())
    }
}

impl Validate for ResilienceConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        self.scan_executor.validate_for("scan_executor")?;
        self.advisory_api.validate_for("advisory_api")?;
        self.ai_analysis.validate_for("ai_analysis")?;
        self.source_host.validate_for("source_host")?;
        Ok(())
    }
}

impl Validate for LoggingConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        match self.format.as_str() {
            "pretty" | "json" | "compact" => Ok(()),
            other => Err(ValidationError::logging(format!(
                "unknown log format '{other}' (expected pretty, json, or compact)"
            ))),
        }
    }
}
