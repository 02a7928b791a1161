//! Scan job entity and lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::executor::ScanOutcome;

/// Identifier of the repository a scan targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryId(pub i64);

impl RepositoryId {
    /// A target is addressable only if it refers to a real repository row.
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl std::fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the scan request entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOrigin {
    /// Requested directly by a user.
    Manual,
    /// Created by the periodic scan planner.
    Scheduled,
    /// Fired by an external event (push webhook, dependency alert).
    Triggered,
}

/// Dispatch priority. Higher ranks are selected first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPriority {
    Low,
    Normal,
    High,
}

impl ScanPriority {
    /// Numeric rank used by the dispatch ordering: High > Normal > Low.
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 3,
            Self::Normal => 2,
            Self::Low => 1,
        }
    }
}

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting for a concurrency slot
    Pending,
    /// Job is currently executing
    Running,
    /// Job finished successfully
    Completed,
    /// Job exhausted its execution attempts
    Failed,
}

impl JobStatus {
    /// Returns the set of valid target states from the current state.
    ///
    /// ```text
    /// Pending ──► Running ──► Completed
    ///                 │
    ///                 └─────► Failed
    /// ```
    pub fn valid_transitions(&self) -> &[JobStatus] {
        match self {
            Self::Pending => &[Self::Running],
            Self::Running => &[Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => &[],
        }
    }

    /// Check whether transitioning to `target` is allowed from the current state.
    pub fn can_transition_to(&self, target: &JobStatus) -> bool {
        self.valid_transitions().contains(target)
    }

    /// Whether this status represents a terminal (final) state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Recorded state transition for a scan job (audit trail).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTransition {
    pub from: JobStatus,
    pub to: JobStatus,
    pub timestamp: DateTime<Utc>,
    /// Human-readable reason or context for the transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an invalid status transition is attempted.
#[derive(Debug, thiserror::Error)]
#[error("Invalid job transition from {from} to {to}")]
pub struct JobTransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// A unit of scan work submitted against a target repository.
///
/// The record is append-mostly: identity fields never change, and `status`
/// only advances forward through the state machine on [`JobStatus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: Uuid,
    pub target: RepositoryId,
    pub origin: ScanOrigin,
    pub priority: ScanPriority,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Present only once the job completed successfully.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ScanOutcome>,
    /// Present only once the job failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Audit trail of every status change.
    #[serde(default)]
    pub transitions: Vec<JobTransition>,
}

impl ScanJob {
    pub fn new(target: RepositoryId, origin: ScanOrigin, priority: ScanPriority) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            origin,
            priority,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            transitions: Vec::new(),
        }
    }

    /// Advance the job to `target`, validating against the state machine and
    /// stamping `started_at`/`completed_at` on the corresponding edges.
    pub fn transition(
        &mut self,
        target: JobStatus,
        reason: Option<String>,
    ) -> Result<(), JobTransitionError> {
        if !self.status.can_transition_to(&target) {
            return Err(JobTransitionError {
                from: self.status,
                to: target,
            });
        }

        let now = Utc::now();
        match target {
            JobStatus::Running => self.started_at = Some(now),
            JobStatus::Completed | JobStatus::Failed => self.completed_at = Some(now),
            JobStatus::Pending => {}
        }

        self.transitions.push(JobTransition {
            from: self.status,
            to: target,
            timestamp: now,
            reason,
        });
        self.status = target;
        Ok(())
    }

    /// Whether the job currently occupies (or is waiting for) a concurrency slot.
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ScanJob {
        ScanJob::new(RepositoryId(42), ScanOrigin::Manual, ScanPriority::Normal)
    }

    #[test]
    fn new_job_starts_pending_without_timestamps() {
        let job = job();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
        assert!(job.result.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn running_transition_sets_started_at_once() {
        let mut job = job();
        job.transition(JobStatus::Running, None).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn terminal_transition_sets_completed_at() {
        let mut job = job();
        job.transition(JobStatus::Running, None).unwrap();
        job.transition(JobStatus::Completed, None).unwrap();
        assert!(job.completed_at.is_some());
        assert!(job.status.is_terminal());
    }

    #[test]
    fn status_never_regresses() {
        let mut job = job();
        job.transition(JobStatus::Running, None).unwrap();
        job.transition(JobStatus::Failed, None).unwrap();

        let err = job.transition(JobStatus::Running, None).unwrap_err();
        assert_eq!(err.from, JobStatus::Failed);
        assert_eq!(err.to, JobStatus::Running);
        // Terminal fields untouched by the rejected transition.
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn pending_cannot_skip_to_terminal() {
        let mut job = job();
        assert!(job.transition(JobStatus::Completed, None).is_err());
        assert!(job.transition(JobStatus::Failed, None).is_err());
    }

    #[test]
    fn transitions_are_recorded_in_order() {
        let mut job = job();
        job.transition(JobStatus::Running, Some("dispatched".into()))
            .unwrap();
        job.transition(JobStatus::Completed, Some("scan finished".into()))
            .unwrap();

        assert_eq!(job.transitions.len(), 2);
        assert_eq!(job.transitions[0].from, JobStatus::Pending);
        assert_eq!(job.transitions[0].to, JobStatus::Running);
        assert_eq!(job.transitions[1].to, JobStatus::Completed);
    }

    #[test]
    fn priority_ranks_order_high_first() {
        assert!(ScanPriority::High.rank() > ScanPriority::Normal.rank());
        assert!(ScanPriority::Normal.rank() > ScanPriority::Low.rank());
    }

    #[test]
    fn repository_id_validity() {
        assert!(RepositoryId(1).is_valid());
        assert!(!RepositoryId(0).is_valid());
        assert!(!RepositoryId(-7).is_valid());
    }
}
