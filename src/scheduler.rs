//! Scheduler adapter: one-shot jobs at absolute times.
//!
//! `InProcessScheduler` keeps a local job table and polls for due work:
//! - at-least-once firing (a job that cannot be delivered is re-queued)
//! - idempotent re-registration under an identical job id
//! - tolerant cancellation (unknown/fired ids are not errors)
//! - sleep/wake detection via time-jump polling, with a grace window for
//!   jobs that came due while the process was suspended
//!
//! The job table is process-local and advisory only — commitment status
//! truth lives in the ledger.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::ScheduleError;
use crate::types::JobPayload;

/// Grace period for jobs that came due during a suspend (2 hours).
const MISSED_JOB_GRACE_PERIOD_SECS: i64 = 7200;

/// Time jump threshold to detect sleep/wake (5 minutes).
const TIME_JUMP_THRESHOLD_SECS: i64 = 300;

/// A due job handed to the lifecycle engine.
#[derive(Debug, Clone, PartialEq)]
pub struct FiredJob {
    pub job_id: String,
    pub payload: JobPayload,
}

#[async_trait]
pub trait SchedulerAdapter: Send + Sync {
    /// Register a one-shot job. Re-registering an existing `job_id` is a
    /// no-op, not an error.
    async fn schedule_at(
        &self,
        run_at: DateTime<Utc>,
        job_id: &str,
        payload: JobPayload,
    ) -> Result<(), ScheduleError>;

    /// Best-effort cancel. Returns whether a pending job was removed;
    /// cancelling a fired or unknown job returns `false` silently.
    async fn cancel(&self, job_id: &str) -> bool;

    /// Whether a job with this id is still pending.
    async fn exists(&self, job_id: &str) -> bool;
}

#[derive(Debug, Clone)]
struct ScheduledJob {
    run_at: DateTime<Utc>,
    payload: JobPayload,
}

/// Polling in-process scheduler.
pub struct InProcessScheduler {
    jobs: Mutex<HashMap<String, ScheduledJob>>,
    sender: mpsc::Sender<FiredJob>,
    poll_interval: Duration,
}

impl InProcessScheduler {
    /// Build the scheduler and the receiving end of its fire channel.
    pub fn new(poll_interval_secs: u64) -> (Arc<Self>, mpsc::Receiver<FiredJob>) {
        let (sender, receiver) = mpsc::channel(64);
        let scheduler = Arc::new(Self {
            jobs: Mutex::new(HashMap::new()),
            sender,
            poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
        });
        (scheduler, receiver)
    }

    /// Number of jobs still pending.
    pub fn pending_count(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Fire time of a pending job, if registered.
    pub fn job_run_at(&self, job_id: &str) -> Option<DateTime<Utc>> {
        self.jobs.lock().get(job_id).map(|job| job.run_at)
    }

    /// Run the poll loop indefinitely, firing due jobs in `run_at` order.
    pub async fn run(&self) {
        let mut last_check = Utc::now();
        loop {
            tokio::time::sleep(self.poll_interval).await;
            let now = Utc::now();

            let time_jump = (now - last_check).num_seconds();
            if time_jump > TIME_JUMP_THRESHOLD_SECS {
                log::info!(
                    "Detected system wake (time jumped {} seconds), firing jobs missed in the grace window",
                    time_jump
                );
            }

            self.fire_due(now).await;
            last_check = now;
        }
    }

    /// Fire every job due at or before `now`. Jobs that came due longer
    /// ago than the grace window are dropped with a warning.
    pub async fn fire_due(&self, now: DateTime<Utc>) {
        let mut due: Vec<(String, ScheduledJob)> = {
            let mut jobs = self.jobs.lock();
            let ids: Vec<String> = jobs
                .iter()
                .filter(|(_, job)| job.run_at <= now)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| jobs.remove(&id).map(|job| (id, job)))
                .collect()
        };
        due.sort_by_key(|(_, job)| job.run_at);

        for (job_id, job) in due {
            let overdue = (now - job.run_at).num_seconds();
            if overdue > MISSED_JOB_GRACE_PERIOD_SECS {
                log::warn!(
                    "Dropping job '{}' — {} seconds past due, beyond the grace window",
                    job_id,
                    overdue
                );
                continue;
            }

            let fired = FiredJob {
                job_id: job_id.clone(),
                payload: job.payload.clone(),
            };
            if self.sender.send(fired).await.is_err() {
                // Receiver gone — re-queue so a restarted consumer still
                // sees the job (at-least-once).
                log::error!("Job channel closed; re-queueing '{}'", job_id);
                self.jobs.lock().insert(job_id, job);
            }
        }
    }
}

#[async_trait]
impl SchedulerAdapter for InProcessScheduler {
    async fn schedule_at(
        &self,
        run_at: DateTime<Utc>,
        job_id: &str,
        payload: JobPayload,
    ) -> Result<(), ScheduleError> {
        let mut jobs = self.jobs.lock();
        if jobs.contains_key(job_id) {
            log::debug!("Job '{}' already registered; keeping existing schedule", job_id);
            return Ok(());
        }
        jobs.insert(job_id.to_string(), ScheduledJob { run_at, payload });
        Ok(())
    }

    async fn cancel(&self, job_id: &str) -> bool {
        let removed = self.jobs.lock().remove(job_id).is_some();
        if !removed {
            log::debug!("Cancel of job '{}' was a no-op (already fired or never registered)", job_id);
        }
        removed
    }

    async fn exists(&self, job_id: &str) -> bool {
        self.jobs.lock().contains_key(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn payload(id: &str) -> JobPayload {
        JobPayload::OutcomeCheck {
            commitment_id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_schedule_and_fire_due() {
        let (scheduler, mut rx) = InProcessScheduler::new(30);
        let now = Utc::now();

        scheduler
            .schedule_at(now - ChronoDuration::seconds(5), "check-c1", payload("c1"))
            .await
            .unwrap();
        scheduler
            .schedule_at(now + ChronoDuration::hours(1), "check-c2", payload("c2"))
            .await
            .unwrap();

        scheduler.fire_due(now).await;

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.job_id, "check-c1");
        assert!(scheduler.exists("check-c2").await);
        assert!(!scheduler.exists("check-c1").await);
    }

    #[tokio::test]
    async fn test_reregistration_is_noop() {
        let (scheduler, _rx) = InProcessScheduler::new(30);
        let now = Utc::now();
        let first = now + ChronoDuration::minutes(10);

        scheduler
            .schedule_at(first, "check-c1", payload("c1"))
            .await
            .unwrap();
        scheduler
            .schedule_at(now + ChronoDuration::minutes(99), "check-c1", payload("c1"))
            .await
            .unwrap();

        assert_eq!(scheduler.pending_count(), 1);
        let jobs = scheduler.jobs.lock();
        assert_eq!(jobs.get("check-c1").unwrap().run_at, first);
    }

    #[tokio::test]
    async fn test_cancel_is_tolerant() {
        let (scheduler, _rx) = InProcessScheduler::new(30);
        let now = Utc::now();

        scheduler
            .schedule_at(now + ChronoDuration::minutes(5), "check-c1", payload("c1"))
            .await
            .unwrap();

        assert!(scheduler.cancel("check-c1").await);
        assert!(!scheduler.cancel("check-c1").await);
        assert!(!scheduler.cancel("never-registered").await);
    }

    #[tokio::test]
    async fn test_fires_in_run_at_order() {
        let (scheduler, mut rx) = InProcessScheduler::new(30);
        let now = Utc::now();

        scheduler
            .schedule_at(now - ChronoDuration::seconds(10), "later", payload("b"))
            .await
            .unwrap();
        scheduler
            .schedule_at(now - ChronoDuration::seconds(60), "earlier", payload("a"))
            .await
            .unwrap();

        scheduler.fire_due(now).await;
        assert_eq!(rx.recv().await.unwrap().job_id, "earlier");
        assert_eq!(rx.recv().await.unwrap().job_id, "later");
    }

    #[tokio::test]
    async fn test_jobs_beyond_grace_window_dropped() {
        let (scheduler, mut rx) = InProcessScheduler::new(30);
        let now = Utc::now();

        scheduler
            .schedule_at(
                now - ChronoDuration::seconds(MISSED_JOB_GRACE_PERIOD_SECS + 60),
                "stale",
                payload("c1"),
            )
            .await
            .unwrap();
        scheduler
            .schedule_at(now - ChronoDuration::seconds(30), "fresh", payload("c2"))
            .await
            .unwrap();

        scheduler.fire_due(now).await;
        assert_eq!(rx.recv().await.unwrap().job_id, "fresh");
        assert!(rx.try_recv().is_err());
        assert_eq!(scheduler.pending_count(), 0);
    }
}
