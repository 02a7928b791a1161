//! Best-effort fan-out of job lifecycle events.
//!
//! Every status transition publishes a [`ScanJob`] snapshot to all live
//! subscribers. Delivery is at-most-once: a subscriber whose channel is full
//! misses that event, and the publisher never blocks. There is no replay for
//! late subscribers; this is a live feed, not an event log.

use std::collections::HashMap;

use tokio::sync::{Mutex, mpsc};
use tracing::debug;
use uuid::Uuid;

use crate::domain::job::ScanJob;

/// Live subscription to job state transitions.
///
/// Dropping the subscription closes the channel; the broadcaster removes the
/// subscriber on its next publish.
pub struct JobSubscription {
    id: Uuid,
    rx: mpsc::Receiver<ScanJob>,
}

impl JobSubscription {
    /// Subscriber identity, usable for explicit [`JobEventBroadcaster::unsubscribe`].
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Receive the next job snapshot; `None` once the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<ScanJob> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<ScanJob> {
        self.rx.try_recv().ok()
    }
}

/// Push-based broadcaster of job snapshots.
#[derive(Debug)]
pub struct JobEventBroadcaster {
    capacity: usize,
    subscribers: Mutex<HashMap<Uuid, mpsc::Sender<ScanJob>>>,
}

impl JobEventBroadcaster {
    /// `capacity` is the per-subscriber buffer; a slow consumer loses events
    /// beyond it rather than stalling the scheduler.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new live subscriber.
    pub async fn subscribe(&self) -> JobSubscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();
        self.subscribers.lock().await.insert(id, tx);
        debug!(subscriber_id = %id, "Job event subscriber registered");
        JobSubscription { id, rx }
    }

    /// Remove a subscriber explicitly. Closed subscribers are also pruned
    /// automatically during publish.
    pub async fn unsubscribe(&self, id: Uuid) {
        if self.subscribers.lock().await.remove(&id).is_some() {
            debug!(subscriber_id = %id, "Job event subscriber removed");
        }
    }

    /// Send a snapshot of `job` to every open subscriber channel.
    pub async fn publish(&self, job: &ScanJob) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|id, tx| match tx.try_send(job.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                // Slow consumer: skip this event for them, keep the channel.
                debug!(subscriber_id = %id, job_id = %job.id, "Subscriber buffer full; event dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::{JobStatus, RepositoryId, ScanOrigin, ScanPriority};

    fn job() -> ScanJob {
        ScanJob::new(RepositoryId(1), ScanOrigin::Manual, ScanPriority::Normal)
    }

    #[tokio::test]
    async fn subscriber_receives_published_snapshots() {
        let broadcaster = JobEventBroadcaster::new(8);
        let mut sub = broadcaster.subscribe().await;

        let mut j = job();
        broadcaster.publish(&j).await;
        j.transition(JobStatus::Running, None).unwrap();
        broadcaster.publish(&j).await;

        assert_eq!(sub.recv().await.unwrap().status, JobStatus::Pending);
        assert_eq!(sub.recv().await.unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn full_subscriber_misses_events_without_blocking() {
        let broadcaster = JobEventBroadcaster::new(1);
        let mut sub = broadcaster.subscribe().await;

        let j = job();
        broadcaster.publish(&j).await;
        // Buffer of one is full; this event is dropped for the subscriber.
        broadcaster.publish(&j).await;

        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());
        // Subscriber stays registered.
        assert_eq!(broadcaster.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned_on_publish() {
        let broadcaster = JobEventBroadcaster::new(4);
        let sub = broadcaster.subscribe().await;
        drop(sub);

        broadcaster.publish(&job()).await;
        assert_eq!(broadcaster.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn explicit_unsubscribe_removes_channel() {
        let broadcaster = JobEventBroadcaster::new(4);
        let sub = broadcaster.subscribe().await;
        broadcaster.unsubscribe(sub.id()).await;
        assert_eq!(broadcaster.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn no_replay_for_late_subscribers() {
        let broadcaster = JobEventBroadcaster::new(4);
        broadcaster.publish(&job()).await;

        let mut late = broadcaster.subscribe().await;
        assert!(late.try_recv().is_none());
    }
}
