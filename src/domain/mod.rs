//! Domain Layer - Core entities and collaborator interfaces
//!
//! This module contains the scan job entity, its lifecycle state machine,
//! and the executor interface the scheduler drives.

pub mod executor;
pub mod job;

pub use executor::{ScanError, ScanExecutor, ScanOutcome};
pub use job::{
    JobStatus, JobTransition, JobTransitionError, RepositoryId, ScanJob, ScanOrigin, ScanPriority,
};
