//! Scan scheduler: priority-ordered, concurrency-bounded job execution.
//!
//! One control loop makes every dispatch decision; dispatched jobs execute
//! concurrently up to the configured ceiling. The loop wakes on a fixed tick
//! and on a buffered wake signal sent at submission, so idle capacity is used
//! promptly without busy-polling.
//!
//! ```text
//! submit() ──► store(Pending) ──► wake ──┐
//!                                        ▼
//!                                  control loop ──► select pending by
//!                                   (tick/wake)     (priority, age)
//!                                        │
//!                     ┌──────────────────┴───────────────────┐
//!                     ▼ per job, up to ceiling               ▼
//!               Running + broadcast                     cleanup pass
//!                     │
//!                     ▼
//!        ResiliencePolicy(scan-executor) ──► ScanExecutor
//!                     │
//!                     ▼
//!        Completed/Failed + broadcast, slot released
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::domain::executor::{ScanExecutor, ScanOutcome};
use crate::domain::job::{JobStatus, RepositoryId, ScanJob, ScanOrigin, ScanPriority};
use crate::infrastructure::events::{JobEventBroadcaster, JobSubscription};
use crate::infrastructure::job_store::InMemoryJobStore;
use crate::infrastructure::resilience::ResiliencePolicy;

/// Errors reported synchronously at submission; such requests never enter
/// the job table.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Invalid scan target: {0}")]
    InvalidTarget(RepositoryId),
}

/// Point-in-time scheduler counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SchedulerStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub concurrency_ceiling: usize,
    pub current_running: usize,
}

/// Job table plus the running-id set. Both live under one mutex so admission
/// into a concurrency slot is atomic with respect to the dispatch loop.
struct SchedulerState {
    store: InMemoryJobStore,
    running: HashSet<Uuid>,
}

struct SchedulerInner {
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    executor: Arc<dyn ScanExecutor>,
    policy: Arc<ResiliencePolicy>,
    broadcaster: JobEventBroadcaster,
    wake_tx: mpsc::Sender<()>,
}

/// Handle to the scan scheduler.
///
/// Constructed once by the composition root and injected wherever scans are
/// submitted; clones share the same scheduler.
#[derive(Clone)]
pub struct ScanScheduler {
    inner: Arc<SchedulerInner>,
    shutdown: CancellationToken,
}

impl ScanScheduler {
    /// Create the scheduler and spawn its control loop.
    pub fn start(
        config: SchedulerConfig,
        executor: Arc<dyn ScanExecutor>,
        policy: Arc<ResiliencePolicy>,
    ) -> Self {
        // Capacity 1: a pending wake already covers any number of submissions.
        let (wake_tx, wake_rx) = mpsc::channel(1);

        let inner = Arc::new(SchedulerInner {
            broadcaster: JobEventBroadcaster::new(config.broadcast_capacity),
            config,
            state: Mutex::new(SchedulerState {
                store: InMemoryJobStore::new(),
                running: HashSet::new(),
            }),
            executor,
            policy,
            wake_tx,
        });

        let shutdown = CancellationToken::new();
        tokio::spawn(Self::run_loop(
            inner.clone(),
            wake_rx,
            shutdown.clone(),
        ));

        Self { inner, shutdown }
    }

    /// Accept a scan request. Returns the job id immediately; execution is
    /// asynchronous.
    pub async fn submit(
        &self,
        target: RepositoryId,
        origin: ScanOrigin,
        priority: ScanPriority,
    ) -> Result<Uuid, SubmitError> {
        if !target.is_valid() {
            return Err(SubmitError::InvalidTarget(target));
        }

        let job = ScanJob::new(target, origin, priority);
        let job_id = job.id;
        let snapshot = job.clone();

        {
            // Published under the state lock: dispatch cannot see the job
            // until this lock is released, so the Pending snapshot is ordered
            // before any Running broadcast for it.
            let mut state = self.inner.state.lock().await;
            state.store.insert(job);
            self.inner.broadcaster.publish(&snapshot).await;
        }

        info!(
            job_id = %job_id,
            target = %target,
            origin = ?origin,
            priority = ?priority,
            "Scan job submitted"
        );

        // Poke the loop for an immediate dispatch pass; a full channel means
        // one is already scheduled.
        let _ = self.inner.wake_tx.try_send(());

        Ok(job_id)
    }

    pub async fn get(&self, job_id: Uuid) -> Option<ScanJob> {
        self.inner.state.lock().await.store.get(&job_id).cloned()
    }

    pub async fn list_by_target(&self, target: RepositoryId) -> Vec<ScanJob> {
        self.inner.state.lock().await.store.list_by_target(target)
    }

    pub async fn list_active(&self) -> Vec<ScanJob> {
        self.inner.state.lock().await.store.list_active()
    }

    pub async fn list_recent(&self, limit: usize) -> Vec<ScanJob> {
        self.inner.state.lock().await.store.list_recent(limit)
    }

    pub async fn stats(&self) -> SchedulerStats {
        let state = self.inner.state.lock().await;
        let counts = state.store.status_counts();
        SchedulerStats {
            total: state.store.len(),
            pending: counts.pending,
            running: counts.running,
            completed: counts.completed,
            failed: counts.failed,
            concurrency_ceiling: self.inner.config.max_concurrent_jobs,
            current_running: state.running.len(),
        }
    }

    /// Register a live subscriber for job state transitions.
    pub async fn subscribe(&self) -> JobSubscription {
        self.inner.broadcaster.subscribe().await
    }

    /// Halt the control loop. In-flight jobs finish; no new dispatch occurs.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    // ── Control loop ─────────────────────────────────────────────────

    async fn run_loop(
        inner: Arc<SchedulerInner>,
        mut wake_rx: mpsc::Receiver<()>,
        shutdown: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(inner.config.tick_interval());
        info!(
            ceiling = inner.config.max_concurrent_jobs,
            tick_ms = inner.config.tick_interval_ms,
            "Scan scheduler started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    Self::dispatch_pass(&inner).await;
                    Self::cleanup_pass(&inner).await;
                }
                Some(()) = wake_rx.recv() => {
                    Self::dispatch_pass(&inner).await;
                }
                _ = shutdown.cancelled() => {
                    info!("Scan scheduler shutting down; in-flight jobs will finish");
                    break;
                }
            }
        }
    }

    /// Move pending jobs into the running set up to the ceiling, highest
    /// priority first, oldest first within a priority.
    async fn dispatch_pass(inner: &Arc<SchedulerInner>) {
        let dispatched = {
            let mut state = inner.state.lock().await;
            let capacity = inner
                .config
                .max_concurrent_jobs
                .saturating_sub(state.running.len());
            if capacity == 0 {
                return;
            }

            let mut dispatched = Vec::new();
            for id in state.store.pending_ids_for_dispatch() {
                if dispatched.len() == capacity {
                    break;
                }
                // Membership in the running set is the double-dispatch guard;
                // checked and inserted under the same lock as selection.
                if state.running.contains(&id) {
                    continue;
                }
                let Some(job) = state.store.get_mut(&id) else {
                    continue;
                };
                if let Err(e) = job.transition(JobStatus::Running, Some("Dispatched".into())) {
                    error!(job_id = %id, error = %e, "Refusing to dispatch job in unexpected state");
                    continue;
                }
                let snapshot = job.clone();
                state.running.insert(id);
                dispatched.push(snapshot);
            }
            dispatched
        };

        for job in dispatched {
            info!(job_id = %job.id, target = %job.target, "Job dispatched");
            inner.broadcaster.publish(&job).await;
            Self::spawn_execution(inner.clone(), job.id, job.target);
        }
    }

    /// Run one job through the resilience policy, then record the terminal
    /// state. The slot release in [`Self::finish_job`] is unconditional: the
    /// executor call runs in its own task, so even a panic surfaces here as a
    /// `JoinError` rather than skipping the release.
    fn spawn_execution(inner: Arc<SchedulerInner>, job_id: Uuid, target: RepositoryId) {
        tokio::spawn(async move {
            let policy = inner.policy.clone();
            let executor = inner.executor.clone();

            let execution = tokio::spawn(async move {
                policy
                    .execute("repository-scan", move || {
                        let executor = executor.clone();
                        async move { executor.execute(target).await }
                    })
                    .await
            });

            let outcome = match execution.await {
                Ok(Ok(outcome)) => Ok(outcome),
                Ok(Err(error)) => Err(error.to_string()),
                Err(join_error) if join_error.is_panic() => {
                    Err("Scan execution panicked".to_string())
                }
                Err(join_error) => Err(format!("Scan execution aborted: {join_error}")),
            };

            Self::finish_job(&inner, job_id, outcome).await;
            // Freed slot: let a queued job take it without waiting for the tick.
            let _ = inner.wake_tx.try_send(());
        });
    }

    async fn finish_job(inner: &SchedulerInner, job_id: Uuid, outcome: Result<ScanOutcome, String>) {
        let snapshot = {
            let mut state = inner.state.lock().await;
            let snapshot = match state.store.get_mut(&job_id) {
                Some(job) => {
                    let transition = match outcome {
                        Ok(result) => {
                            let findings = result.findings_total;
                            job.result = Some(result);
                            job.transition(
                                JobStatus::Completed,
                                Some(format!("Completed with {findings} findings")),
                            )
                        }
                        Err(message) => {
                            job.error = Some(message.clone());
                            job.transition(
                                JobStatus::Failed,
                                Some(format!("Execution failed: {message}")),
                            )
                        }
                    };
                    if let Err(e) = transition {
                        error!(job_id = %job_id, error = %e, "Terminal transition rejected");
                    }
                    Some(job.clone())
                }
                None => {
                    // Running jobs are never evicted, so this indicates a bug.
                    error!(job_id = %job_id, "Finished job missing from store");
                    None
                }
            };
            state.running.remove(&job_id);
            snapshot
        };

        if let Some(job) = snapshot {
            match job.status {
                JobStatus::Completed => info!(job_id = %job.id, "Scan job completed"),
                JobStatus::Failed => {
                    warn!(job_id = %job.id, error = ?job.error, "Scan job failed")
                }
                _ => {}
            }
            inner.broadcaster.publish(&job).await;
        }
    }

    async fn cleanup_pass(inner: &SchedulerInner) {
        let evicted = inner.state.lock().await.store.cleanup(
            inner.config.retention,
            inner.config.cleanup_grace_seconds,
        );
        if evicted > 0 {
            debug!(evicted, "Evicted old job records");
        }
    }
}
