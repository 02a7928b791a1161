//! Infrastructure Layer - Resilience, storage, and event fan-out

pub mod events;
pub mod job_store;
pub mod resilience;

pub use events::{JobEventBroadcaster, JobSubscription};
pub use job_store::{InMemoryJobStore, StatusCounts};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, ResilienceError, ResiliencePolicy,
    ResilienceRegistry, RetryConfig,
};
