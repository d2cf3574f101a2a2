//! Commitment lifecycle engine.
//!
//! Owns the state machine: a confirmed draft is persisted `Pending`, its
//! check-in job(s) are registered, and exactly one terminal transition
//! happens later — from a user response, an explicit cancellation, or the
//! auto-expiry fallback. The ledger row is the source of truth; the
//! terminal write is a compare-and-set guarded by the `Pending`
//! precondition, so racing triggers resolve cleanly: first writer wins,
//! the second observes `AlreadyResolved` and discards its transition.
//!
//! Ordering is persist-then-schedule: a commitment that failed to persist
//! never gets a job; a commitment whose job registration failed stays
//! `Pending` without a reminder (degraded, logged, not fatal).

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::{Config, ConfigError};
use crate::error::{CreateError, ScheduleError};
use crate::ledger::{Ledger, LedgerError, StatusWrite};
use crate::notify::{NotificationSink, PromptOptions};
use crate::recurrence::HabitSchedule;
use crate::scheduler::{FiredJob, SchedulerAdapter};
use crate::types::{
    check_job_id, expire_job_id, Commitment, CommitmentDraft, CommitmentKind, CommitmentStatus,
    JobPayload, Outcome, ReminderPolicy, Resolution,
};

pub struct LifecycleEngine {
    ledger: Arc<dyn Ledger>,
    scheduler: Arc<dyn SchedulerAdapter>,
    notifier: Arc<dyn NotificationSink>,
    tz: Tz,
    task_reminder_lead_minutes: u32,
    auto_expiry_grace_minutes: u32,
}

impl LifecycleEngine {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        scheduler: Arc<dyn SchedulerAdapter>,
        notifier: Arc<dyn NotificationSink>,
        config: &Config,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            ledger,
            scheduler,
            notifier,
            tz: config.tz()?,
            task_reminder_lead_minutes: config.task_reminder_lead_minutes,
            auto_expiry_grace_minutes: config.auto_expiry_grace_minutes,
        })
    }

    fn local(&self, at: DateTime<Utc>) -> DateTime<Tz> {
        at.with_timezone(&self.tz)
    }

    /// Persist a confirmed draft and register its check-in job(s).
    pub async fn create(
        &self,
        user_id: &str,
        draft: CommitmentDraft,
    ) -> Result<Commitment, CreateError> {
        if draft.description.split_whitespace().count() < 2 {
            return Err(CreateError::DescriptionTooShort(draft.description));
        }

        let now = Utc::now();
        if draft.kind == CommitmentKind::Task && draft.scheduled_at < now {
            return Err(CreateError::DueInPast(draft.scheduled_at));
        }

        let commitment = Commitment {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            kind: draft.kind,
            description: draft.description,
            scheduled_at: draft.scheduled_at,
            duration_minutes: draft.duration_minutes.max(1),
            status: CommitmentStatus::Pending,
            created_at: now,
        };

        // Persist before any scheduling.
        self.ledger.append(&commitment).await?;

        let policy = ReminderPolicy::for_kind(commitment.kind, self.task_reminder_lead_minutes);
        let check_at = policy
            .reminder_time(commitment.scheduled_at, commitment.duration_minutes)
            .max(now);
        let payload = match commitment.kind {
            CommitmentKind::Task => JobPayload::TaskReminder {
                commitment_id: commitment.id.clone(),
            },
            _ => JobPayload::OutcomeCheck {
                commitment_id: commitment.id.clone(),
            },
        };

        match self
            .scheduler
            .schedule_at(check_at, &check_job_id(&commitment.id), payload)
            .await
        {
            Ok(()) => {
                if policy.auto_expire {
                    let expire_at = check_at + Duration::minutes(self.auto_expiry_grace_minutes as i64);
                    if let Err(e) = self
                        .scheduler
                        .schedule_at(
                            expire_at,
                            &expire_job_id(&commitment.id),
                            JobPayload::AutoExpire {
                                commitment_id: commitment.id.clone(),
                            },
                        )
                        .await
                    {
                        log::warn!(
                            "Auto-expiry registration failed for '{}': {}",
                            commitment.id,
                            e
                        );
                    }
                }
            }
            Err(e) => {
                log::warn!(
                    "Reminder registration failed for '{}'; commitment stays pending without a check-in: {}",
                    commitment.id,
                    e
                );
            }
        }

        let local = self.local(commitment.scheduled_at);
        let confirmation = match commitment.kind {
            CommitmentKind::Task => format!(
                "✅ Task '{}' has been added with a due date of {}.",
                commitment.description,
                local.format("%Y-%m-%d %H:%M")
            ),
            _ => format!(
                "✅ {} '{}' scheduled for {} ({} minutes).",
                commitment.kind.label(),
                commitment.description,
                local.format("%Y-%m-%d %H:%M"),
                commitment.duration_minutes
            ),
        };
        self.notifier.send_text(user_id, &confirmation).await;

        Ok(commitment)
    }

    /// Record a terminal outcome. `NotFound` and `AlreadyResolved` are
    /// reported, not raised — the caller decides whether anyone cares.
    pub async fn resolve(&self, id: &str, outcome: Outcome) -> Result<Resolution, LedgerError> {
        let Some(row) = self.ledger.find(id).await? else {
            log::debug!("resolve('{}'): no such commitment", id);
            return Ok(Resolution::NotFound);
        };
        if row.status.is_terminal() {
            return Ok(Resolution::AlreadyResolved);
        }

        let status = outcome.status();
        match self.ledger.transition_if_pending(id, status).await? {
            StatusWrite::Updated => {
                // Terminal state holds no live jobs. Cancellation is
                // best-effort: a fired or unregistered job is a no-op.
                self.scheduler.cancel(&check_job_id(id)).await;
                self.scheduler.cancel(&expire_job_id(id)).await;

                let emoji = match status {
                    CommitmentStatus::Done => "✅",
                    CommitmentStatus::Missed => "❌",
                    _ => "🛑",
                };
                self.notifier
                    .edit_last_prompt(
                        &row.user_id,
                        &format!(
                            "{} {} '{}' marked as {}!",
                            emoji,
                            row.kind.label(),
                            row.description,
                            status.label()
                        ),
                    )
                    .await;
                Ok(Resolution::Resolved(status))
            }
            StatusWrite::NotFound => Ok(Resolution::NotFound),
            StatusWrite::NotPending => {
                log::debug!("resolve('{}'): lost the race, already resolved", id);
                Ok(Resolution::AlreadyResolved)
            }
        }
    }

    /// Dispatch a fired scheduler job.
    pub async fn handle_job(&self, job: FiredJob) {
        match job.payload {
            JobPayload::OutcomeCheck { commitment_id } => {
                self.send_outcome_check(&commitment_id).await;
            }
            JobPayload::TaskReminder { commitment_id } => {
                self.send_task_reminder(&commitment_id).await;
            }
            JobPayload::AutoExpire { commitment_id } => {
                self.auto_expire(&commitment_id).await;
            }
            JobPayload::SpawnHabit { user_id, habit } => {
                self.spawn_habit(&user_id, habit).await;
            }
        }
    }

    /// Consume fired jobs until the scheduler side closes.
    pub async fn run(&self, mut receiver: mpsc::Receiver<FiredJob>) {
        while let Some(job) = receiver.recv().await {
            self.handle_job(job).await;
        }
    }

    async fn send_outcome_check(&self, commitment_id: &str) {
        let row = match self.ledger.find(commitment_id).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                log::warn!("Outcome check for unknown commitment '{}'", commitment_id);
                return;
            }
            Err(e) => {
                log::warn!("Outcome check lookup failed for '{}': {}", commitment_id, e);
                return;
            }
        };
        if row.status.is_terminal() {
            log::debug!(
                "Outcome check for '{}' suppressed: already {}",
                commitment_id,
                row.status.as_str()
            );
            return;
        }

        self.notifier
            .send_prompt(
                &row.user_id,
                &format!(
                    "⏰ Your {} '{}' has ended.\nDid you complete it?",
                    row.kind.as_str(),
                    row.description
                ),
                PromptOptions::new("Yes", "No"),
            )
            .await;
    }

    async fn send_task_reminder(&self, commitment_id: &str) {
        let row = match self.ledger.find(commitment_id).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                log::warn!("Task reminder for unknown commitment '{}'", commitment_id);
                return;
            }
            Err(e) => {
                log::warn!("Task reminder lookup failed for '{}': {}", commitment_id, e);
                return;
            }
        };
        if row.status.is_terminal() {
            log::debug!("Task reminder for '{}' suppressed: already resolved", commitment_id);
            return;
        }

        let due = self.local(row.scheduled_at);
        self.notifier
            .send_prompt(
                &row.user_id,
                &format!(
                    "⏰ Reminder: Task '{}' is due at {}. Have you completed it?",
                    row.description,
                    due.format("%H:%M")
                ),
                PromptOptions::new("Completed", "Not yet"),
            )
            .await;
    }

    async fn auto_expire(&self, commitment_id: &str) {
        match self.resolve(commitment_id, Outcome::Missed).await {
            Ok(Resolution::Resolved(_)) => {
                log::info!(
                    "Commitment '{}' auto-marked Missed after no response",
                    commitment_id
                );
            }
            Ok(Resolution::AlreadyResolved) | Ok(Resolution::NotFound) => {
                log::debug!(
                    "Auto-expiry for '{}' discarded: already resolved",
                    commitment_id
                );
            }
            Err(e) => {
                log::warn!("Auto-expiry for '{}' failed: {}", commitment_id, e);
            }
        }
    }

    /// Register the spawn job for a recurring habit. Returns the first
    /// occurrence time.
    pub async fn schedule_habit(
        &self,
        user_id: &str,
        habit: &HabitSchedule,
    ) -> Result<DateTime<Utc>, ScheduleError> {
        let next = habit.next_occurrence(Utc::now(), self.tz)?;
        self.scheduler
            .schedule_at(
                next,
                &habit.job_id(),
                JobPayload::SpawnHabit {
                    user_id: user_id.to_string(),
                    habit: habit.clone(),
                },
            )
            .await?;
        Ok(next)
    }

    /// Create one habit instance for the occurrence that just fired, then
    /// re-arm the spawn job for the next occurrence.
    async fn spawn_habit(&self, user_id: &str, habit: HabitSchedule) {
        let now = Utc::now();
        let now_local = self.local(now);
        let mut occurrence = now_local.date_naive().and_time(habit.time);
        if occurrence < now_local.naive_local() {
            occurrence += Duration::days(1);
        }
        let occurrence_utc = self
            .tz
            .from_local_datetime(&occurrence)
            .single()
            .or_else(|| self.tz.from_local_datetime(&occurrence).earliest())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now);

        if let Err(e) = self
            .create(user_id, habit.instance_draft(occurrence_utc))
            .await
        {
            log::warn!("Habit instance creation failed for '{}': {}", habit.description, e);
        }

        if let Err(e) = self.schedule_habit(user_id, &habit).await {
            log::warn!("Habit re-arm failed for '{}': {}", habit.description, e);
        }
    }

    /// Pending commitments of a kind scheduled on the local day of `now`,
    /// ordered by time.
    pub async fn due_today(
        &self,
        kind: CommitmentKind,
        now: DateTime<Utc>,
    ) -> Result<Vec<Commitment>, LedgerError> {
        let day = self.local(now).date_naive();
        let rows = self.ledger.due_on_day(kind, day, self.tz).await?;
        Ok(rows
            .into_iter()
            .filter(|c| c.status == CommitmentStatus::Pending)
            .collect())
    }

    /// Re-send outcome checks for today's still-pending commitments of a
    /// kind (the manual "did I do my habits?" sweep).
    pub async fn recheck_pending(
        &self,
        kind: CommitmentKind,
        now: DateTime<Utc>,
    ) -> Result<usize, LedgerError> {
        let pending = self.due_today(kind, now).await?;
        let count = pending.len();
        for row in &pending {
            self.notifier
                .send_prompt(
                    &row.user_id,
                    &format!(
                        "⏰ Your {} '{}' has ended.\nDid you complete it?",
                        row.kind.as_str(),
                        row.description
                    ),
                    PromptOptions::new("Yes", "No"),
                )
                .await;
        }
        Ok(count)
    }
}
