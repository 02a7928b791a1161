//! Common test utilities shared across integration tests

pub mod mocks;

pub use mocks::*;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use vigil_scheduler::ScanScheduler;
use vigil_scheduler::config::SchedulerConfig;
use vigil_scheduler::domain::ScanExecutor;
use vigil_scheduler::infrastructure::resilience::{
    CircuitBreakerConfig, ResiliencePolicy, RetryConfig, SCAN_EXECUTOR,
};

/// Scheduler configuration tuned for fast tests.
pub fn test_scheduler_config(max_concurrent_jobs: usize) -> SchedulerConfig {
    SchedulerConfig {
        max_concurrent_jobs,
        tick_interval_ms: 20,
        retention: 100,
        cleanup_grace_seconds: 300,
        broadcast_capacity: 64,
    }
}

/// Resilience policy with negligible retry delays and a breaker that stays
/// out of the way unless a test trips it deliberately.
pub fn test_policy() -> Arc<ResiliencePolicy> {
    Arc::new(ResiliencePolicy::new(
        SCAN_EXECUTOR,
        CircuitBreakerConfig {
            failure_threshold: 1000,
            recovery_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(5),
        },
        RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            jitter: Duration::ZERO,
        },
    ))
}

/// Start a scheduler over the given executor with test-friendly settings.
pub fn start_scheduler(ceiling: usize, executor: Arc<dyn ScanExecutor>) -> ScanScheduler {
    ScanScheduler::start(test_scheduler_config(ceiling), executor, test_policy())
}

/// Poll `predicate` until it holds or `timeout` elapses; panics on timeout.
pub async fn wait_for<F, Fut>(description: &str, timeout: Duration, mut predicate: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for: {description}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
