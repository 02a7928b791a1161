//! Vigil Scheduler - Scan scheduling and resilience core for the Vigil platform
//!
//! This crate accepts scan requests for code repositories and executes them
//! under bounded concurrency, with isolation against failing downstream
//! dependencies.
//!
//! # Features
//!
//! - **Job Scheduling**: priority-ordered pending queue, fixed concurrency
//!   ceiling, tick-driven dispatch with a wake signal on submission
//! - **Resilience**: per-dependency circuit breakers combined with
//!   exponential-backoff retry for every external call
//! - **Live Updates**: best-effort fan-out of job state transitions to
//!   subscribers
//! - **Lifecycle Tracking**: validated forward-only job state machine with
//!   an audit trail
//!
//! # Architecture
//!
//! ```text
//! vigil-scheduler/
//! ├── domain/           # ScanJob state machine, executor interface
//! ├── application/      # ScanScheduler control loop and queries
//! ├── infrastructure/   # Resilience policies, job table, event fan-out
//! ├── config/           # Strongly-typed configuration with validation
//! └── logging/          # Structured logging with tracing
//! ```
//!
//! # Usage
//!
//! The scheduler is constructed once by the composition root and injected
//! wherever scans are submitted:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil_scheduler::{Config, ScanScheduler, init_tracing};
//! use vigil_scheduler::domain::{RepositoryId, ScanOrigin, ScanPriority};
//! use vigil_scheduler::infrastructure::resilience::SCAN_EXECUTOR;
//!
//! let config = Config::load()?;
//! init_tracing(&config.logging)?;
//!
//! let registry = config.resilience.build_registry();
//! let policy = registry.policy(SCAN_EXECUTOR).unwrap();
//! let scheduler = ScanScheduler::start(config.scheduler, executor, policy);
//!
//! let job_id = scheduler
//!     .submit(RepositoryId(42), ScanOrigin::Manual, ScanPriority::High)
//!     .await?;
//! ```
//!
//! Environment variables use the `VIGIL__` prefix with double underscore
//! separators:
//!
//! ```bash
//! VIGIL__SCHEDULER__MAX_CONCURRENT_JOBS=5
//! VIGIL__RESILIENCE__AI_ANALYSIS__BREAKER__FAILURE_THRESHOLD=3
//! ```
//!
//! # Volatility
//!
//! Job and breaker state are in-memory and reset on process restart. The
//! queue offers no cross-restart delivery guarantee by design.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;

pub use application::{ScanScheduler, SchedulerStats, SubmitError};
pub use config::Config;
pub use domain::{ScanExecutor, ScanJob, ScanOutcome};
pub use logging::init_tracing;
