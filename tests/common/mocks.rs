//! Shared mock implementations for testing

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use vigil_scheduler::domain::{RepositoryId, ScanError, ScanExecutor, ScanOutcome};

/// Configurable scan executor that records execution order and tracks the
/// observed concurrency high-water mark.
pub struct MockScanExecutor {
    delay: Duration,
    fail_targets: HashSet<i64>,
    panic_targets: HashSet<i64>,
    started: Mutex<Vec<RepositoryId>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockScanExecutor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_targets: HashSet::new(),
            panic_targets: HashSet::new(),
            started: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Executions against these targets return a retryable failure.
    pub fn failing_for(mut self, targets: impl IntoIterator<Item = i64>) -> Self {
        self.fail_targets.extend(targets);
        self
    }

    /// Executions against these targets panic mid-scan.
    pub fn panicking_for(mut self, targets: impl IntoIterator<Item = i64>) -> Self {
        self.panic_targets.extend(targets);
        self
    }

    /// Targets in the order their executions started.
    pub fn started_order(&self) -> Vec<RepositoryId> {
        self.started.lock().unwrap().clone()
    }

    /// Number of executions started against `target`.
    pub fn executions_for(&self, target: RepositoryId) -> usize {
        self.started
            .lock()
            .unwrap()
            .iter()
            .filter(|t| **t == target)
            .count()
    }

    /// Highest number of simultaneously running executions observed.
    pub fn max_observed_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScanExecutor for MockScanExecutor {
    async fn execute(&self, target: RepositoryId) -> Result<ScanOutcome, ScanError> {
        self.started.lock().unwrap().push(target);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panic_targets.contains(&target.0) {
            panic!("mock scan blew up for target {target}");
        }
        if self.fail_targets.contains(&target.0) {
            return Err(ScanError::Network("mock upstream unreachable".into()));
        }

        Ok(ScanOutcome {
            findings_total: 2,
            report: json!({ "target": target.0, "findings": ["F-1", "F-2"] }),
        })
    }
}

/// Executor that always fails, for breaker-focused tests.
pub struct AlwaysFailingExecutor;

#[async_trait]
impl ScanExecutor for AlwaysFailingExecutor {
    async fn execute(&self, _target: RepositoryId) -> Result<ScanOutcome, ScanError> {
        Err(ScanError::Unavailable)
    }
}
