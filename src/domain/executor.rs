//! Scan executor collaborator interface.
//!
//! The scheduler does not compute findings itself. It hands a target to
//! whatever [`ScanExecutor`] implementation the deployment wires in and
//! stores what comes back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::job::RepositoryId;

/// Opaque outcome of a scan. The scheduler stores it verbatim; only
/// `findings_total` is read, for logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub findings_total: usize,
    /// Structured report produced by the executor, uninterpreted here.
    pub report: serde_json::Value,
}

/// Failure surfaced by an external dependency call.
///
/// The retryable variants describe conditions expected to clear on their own
/// (network blips, rate limits, restarts); the rest fail the operation on the
/// first attempt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScanError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Rate limited by upstream service")]
    RateLimited,

    #[error("Upstream service unavailable")]
    Unavailable,

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Invalid scan target: {0}")]
    InvalidTarget(String),
}

impl ScanError {
    /// Whether retrying the operation can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout { .. } | Self::RateLimited | Self::Unavailable
        )
    }
}

/// The external operation the scheduler drives per job.
///
/// Implementations may perform network calls, AI inference, or static
/// analysis; every call is routed through the `scan-executor` resilience
/// policy by the scheduler.
#[async_trait]
pub trait ScanExecutor: Send + Sync {
    async fn execute(&self, target: RepositoryId) -> Result<ScanOutcome, ScanError>;
}
