//! Application Layer - Scheduling use cases

pub mod scheduler;

pub use scheduler::{ScanScheduler, SchedulerStats, SubmitError};
