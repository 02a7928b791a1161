//! In-memory scan job table.
//!
//! Insertion-ordered, append-mostly storage owned exclusively by the
//! scheduler. State is volatile by design: the queue does not survive a
//! process restart.

use std::collections::HashMap;

use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use crate::domain::job::{JobStatus, RepositoryId, ScanJob};

/// Per-status record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Insertion-ordered job table with O(1) lookup by id.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: HashMap<Uuid, ScanJob>,
    /// Insertion order, used as the deterministic tie-break for dispatch.
    order: Vec<Uuid>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, job: ScanJob) {
        self.order.push(job.id);
        self.jobs.insert(job.id, job);
    }

    pub fn get(&self, id: &Uuid) -> Option<&ScanJob> {
        self.jobs.get(id)
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut ScanJob> {
        self.jobs.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// All jobs for one target repository, in insertion order.
    pub fn list_by_target(&self, target: RepositoryId) -> Vec<ScanJob> {
        self.iter_ordered()
            .filter(|job| job.target == target)
            .cloned()
            .collect()
    }

    /// All pending and running jobs, in insertion order.
    pub fn list_active(&self) -> Vec<ScanJob> {
        self.iter_ordered()
            .filter(|job| job.is_active())
            .cloned()
            .collect()
    }

    /// The `limit` most recent jobs by creation time, newest first.
    pub fn list_recent(&self, limit: usize) -> Vec<ScanJob> {
        let mut jobs: Vec<ScanJob> = self.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        jobs
    }

    /// Pending job ids ordered for dispatch: highest priority first, oldest
    /// first within a priority class (stable over insertion order).
    pub fn pending_ids_for_dispatch(&self) -> Vec<Uuid> {
        let mut pending: Vec<&ScanJob> = self
            .iter_ordered()
            .filter(|job| job.status == JobStatus::Pending)
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .rank()
                .cmp(&a.priority.rank())
                .then(a.created_at.cmp(&b.created_at))
        });
        pending.into_iter().map(|job| job.id).collect()
    }

    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for job in self.jobs.values() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Running => counts.running += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Trim old records, keeping the `retention` most recent by creation
    /// time. Active jobs are never evicted, and terminal jobs are kept for
    /// `grace_seconds` after completion so live subscribers can still observe
    /// their final state. Returns the number of evicted records.
    pub fn cleanup(&mut self, retention: usize, grace_seconds: u64) -> usize {
        if self.jobs.len() <= retention {
            return 0;
        }

        let mut by_age: Vec<(Uuid, chrono::DateTime<Utc>)> = self
            .jobs
            .values()
            .map(|job| (job.id, job.created_at))
            .collect();
        by_age.sort_by(|a, b| b.1.cmp(&a.1));

        let grace_cutoff = Utc::now() - ChronoDuration::seconds(grace_seconds as i64);
        let mut evicted = 0;
        for (id, _) in by_age.into_iter().skip(retention) {
            let evictable = self.jobs.get(&id).is_some_and(|job| {
                job.status.is_terminal()
                    && job.completed_at.is_some_and(|done| done < grace_cutoff)
            });
            if evictable {
                self.jobs.remove(&id);
                evicted += 1;
            }
        }

        if evicted > 0 {
            self.order.retain(|id| self.jobs.contains_key(id));
        }
        evicted
    }

    fn iter_ordered(&self) -> impl Iterator<Item = &ScanJob> {
        self.order.iter().filter_map(|id| self.jobs.get(id))
    }
}
