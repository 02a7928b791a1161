//! Resilience patterns for external dependency calls.
//!
//! Every external call the scheduler makes (scan execution, advisory lookups,
//! AI analysis, source-hosting APIs) goes through a named [`ResiliencePolicy`]:
//! a per-dependency [`CircuitBreaker`] combined with exponential-backoff retry.
//!
//! **State machine:**
//! ```text
//!    ┌────────────┐   failure threshold    ┌────────────┐
//!    │   CLOSED   │ ─────────────────────► │    OPEN    │
//!    └────────────┘                        └────────────┘
//!          ▲                                     │ recovery timeout
//!          │ probe success                       ▼
//!          │                               ┌────────────┐
//!          └────────────────────────────── │ HALF-OPEN  │ ── probe failure ──► OPEN
//!                                          └────────────┘
//! ```
//!
//! Half-open admits exactly one probe call; its outcome decides whether the
//! circuit closes again or re-opens.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::executor::ScanError;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests are allowed through; failures are counted.
    Closed,
    /// Requests are rejected immediately without invoking the operation.
    Open,
    /// A single probe request is allowed through to test recovery.
    HalfOpen,
}

/// Circuit breaker configuration, fixed per dependency at construction.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Duration to wait before admitting a half-open probe
    pub recovery_timeout: Duration,
    /// Timeout for individual requests
    pub request_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    current_state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    /// Whether the single half-open probe has been handed out.
    probe_in_flight: bool,
}

/// Per-dependency guard that fails fast after repeated failures.
///
/// Breakers are created once at startup for each known dependency and live
/// for the process lifetime; success resets them, nothing destroys them.
/// State is guarded by a mutex so admission decisions are atomic with respect
/// to concurrent callers.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

/// Outcome of asking the breaker for permission to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Allowed,
    Rejected,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState {
                current_state: CircuitState::Closed,
                failure_count: 0,
                last_failure_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Decide whether a call may proceed, transitioning Open → HalfOpen when
    /// the recovery timeout has elapsed.
    async fn admit(&self) -> Admission {
        let mut state = self.state.lock().await;
        match state.current_state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                let cooled_down = state
                    .last_failure_at
                    .is_some_and(|t| t.elapsed() > self.config.recovery_timeout);
                if cooled_down {
                    state.current_state = CircuitState::HalfOpen;
                    state.probe_in_flight = true;
                    Admission::Allowed
                } else {
                    Admission::Rejected
                }
            }
            CircuitState::HalfOpen => {
                if state.probe_in_flight {
                    Admission::Rejected
                } else {
                    state.probe_in_flight = true;
                    Admission::Allowed
                }
            }
        }
    }

    async fn on_success(&self) {
        let mut state = self.state.lock().await;
        state.current_state = CircuitState::Closed;
        state.failure_count = 0;
        state.probe_in_flight = false;
    }

    async fn on_failure(&self) {
        let mut state = self.state.lock().await;
        state.failure_count += 1;
        state.last_failure_at = Some(Instant::now());

        match state.current_state {
            CircuitState::Closed => {
                if state.failure_count >= self.config.failure_threshold {
                    state.current_state = CircuitState::Open;
                }
            }
            CircuitState::HalfOpen => {
                // Probe failed: back to open, wait out another cooldown.
                state.current_state = CircuitState::Open;
                state.probe_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.current_state
    }

    pub async fn failure_count(&self) -> u32 {
        self.state.lock().await.failure_count
    }
}

/// Retry configuration for exponential backoff
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (first try included)
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each retry
    pub base_delay: Duration,
    /// Cap on the exponential delay
    pub max_delay: Duration,
    /// Upper bound of the uniform jitter added to each delay
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `attempt` (1-based): `base × 2^(attempt−1)`
    /// capped at `max_delay`, plus uniform jitter.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32 << (attempt - 1).min(16))
            .min(self.max_delay);
        let jitter_ms = if self.jitter.is_zero() {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64)
        };
        exp + Duration::from_millis(jitter_ms)
    }
}

/// Failure surfaced by a [`ResiliencePolicy`] execution.
///
/// `CircuitOpen` is distinguished from `RetriesExhausted` so operators can
/// tell "dependency unavailable, not even tried" from "tried and failed".
#[derive(Debug, thiserror::Error)]
pub enum ResilienceError {
    #[error("Circuit breaker '{dependency}' is open; failing fast")]
    CircuitOpen { dependency: String },

    #[error("Operation '{operation}' failed after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Operation '{operation}' failed with non-retryable error: {source}")]
    Aborted {
        operation: String,
        source: ScanError,
    },
}

/// Circuit breaker + retry executor for one named dependency.
///
/// The breaker is consulted before every attempt: an open circuit fails the
/// call immediately, consuming no retry budget and incurring no backoff.
#[derive(Debug)]
pub struct ResiliencePolicy {
    dependency: String,
    breaker: CircuitBreaker,
    retry: RetryConfig,
}

impl ResiliencePolicy {
    pub fn new(
        dependency: impl Into<String>,
        breaker_config: CircuitBreakerConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            dependency: dependency.into(),
            breaker: CircuitBreaker::new(breaker_config),
            retry,
        }
    }

    /// Name of the dependency this policy guards.
    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    /// Current breaker state, for health reporting.
    pub async fn breaker_state(&self) -> CircuitState {
        self.breaker.state().await
    }

    /// Current consecutive-failure count, for health reporting.
    pub async fn failure_count(&self) -> u32 {
        self.breaker.failure_count().await
    }

    /// Execute `op` with breaker protection and bounded retries, raising on
    /// exhaustion.
    pub async fn execute<F, Fut, T>(
        &self,
        operation: &str,
        mut op: F,
    ) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ScanError>>,
    {
        let mut last_error = String::new();

        for attempt in 1..=self.retry.max_attempts.max(1) {
            if self.breaker.admit().await == Admission::Rejected {
                return Err(ResilienceError::CircuitOpen {
                    dependency: self.dependency.clone(),
                });
            }

            let timeout = self.breaker.config.request_timeout;
            let outcome = match tokio::time::timeout(timeout, op()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ScanError::Timeout {
                    seconds: timeout.as_secs(),
                }),
            };

            match outcome {
                Ok(value) => {
                    self.breaker.on_success().await;
                    return Ok(value);
                }
                Err(error) => {
                    self.breaker.on_failure().await;

                    if !error.is_retryable() {
                        return Err(ResilienceError::Aborted {
                            operation: operation.to_string(),
                            source: error,
                        });
                    }

                    last_error = error.to_string();
                    if attempt < self.retry.max_attempts {
                        let delay = self.retry.backoff(attempt);
                        debug!(
                            dependency = %self.dependency,
                            operation,
                            attempt,
                            max_attempts = self.retry.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "Retrying operation with exponential backoff"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(ResilienceError::RetriesExhausted {
            operation: operation.to_string(),
            attempts: self.retry.max_attempts.max(1),
            last_error,
        })
    }

    /// Execute `op`; on exhaustion, run `fallback` instead of raising.
    pub async fn execute_with_fallback<F, Fut, G, GFut, T>(
        &self,
        operation: &str,
        op: F,
        fallback: G,
    ) -> Result<T, ResilienceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ScanError>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, ScanError>>,
    {
        match self.execute(operation, op).await {
            Ok(value) => Ok(value),
            Err(primary) => {
                warn!(
                    dependency = %self.dependency,
                    operation,
                    error = %primary,
                    "Primary operation failed; invoking fallback"
                );
                fallback()
                    .await
                    .map_err(|e| ResilienceError::RetriesExhausted {
                        operation: format!("{operation} (fallback)"),
                        attempts: 1,
                        last_error: e.to_string(),
                    })
            }
        }
    }

    /// Execute `op`; on exhaustion, log the failure and return `default`.
    pub async fn execute_with_default<F, Fut, T>(&self, operation: &str, op: F, default: T) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ScanError>>,
    {
        match self.execute(operation, op).await {
            Ok(value) => value,
            Err(error) => {
                warn!(
                    dependency = %self.dependency,
                    operation,
                    error = %error,
                    "Operation failed; returning default value"
                );
                default
            }
        }
    }
}

/// All resilience policies, built once at startup from configuration.
///
/// One policy per known external dependency; the map is never mutated after
/// construction.
#[derive(Debug)]
pub struct ResilienceRegistry {
    policies: HashMap<&'static str, Arc<ResiliencePolicy>>,
}

/// Dependency name for the primary scan execution path.
pub const SCAN_EXECUTOR: &str = "scan-executor";
/// Dependency name for vulnerability advisory lookups.
pub const ADVISORY_API: &str = "advisory-api";
/// Dependency name for AI-assisted analysis.
pub const AI_ANALYSIS: &str = "ai-analysis";
/// Dependency name for source-hosting (Git provider) API calls.
pub const SOURCE_HOST: &str = "source-host";

impl ResilienceRegistry {
    pub fn new(
        policies: impl IntoIterator<Item = (&'static str, CircuitBreakerConfig, RetryConfig)>,
    ) -> Self {
        let policies = policies
            .into_iter()
            .map(|(name, breaker, retry)| {
                (name, Arc::new(ResiliencePolicy::new(name, breaker, retry)))
            })
            .collect();
        Self { policies }
    }

    pub fn policy(&self, dependency: &str) -> Option<Arc<ResiliencePolicy>> {
        self.policies.get(dependency).cloned()
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.policies.keys().copied()
    }
}
