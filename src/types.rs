//! Core domain types: commitments, their lifecycle states, and the
//! per-kind reminder policy table.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// What flavor of commitment a request produces.
///
/// Tasks carry a due time; events and habits carry a start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentKind {
    Event,
    Task,
    Habit,
}

impl CommitmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitmentKind::Event => "event",
            CommitmentKind::Task => "task",
            CommitmentKind::Habit => "habit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "event" => Some(CommitmentKind::Event),
            "task" => Some(CommitmentKind::Task),
            "habit" => Some(CommitmentKind::Habit),
            _ => None,
        }
    }

    /// Capitalized label for user-facing messages.
    pub fn label(&self) -> &'static str {
        match self {
            CommitmentKind::Event => "Event",
            CommitmentKind::Task => "Task",
            CommitmentKind::Habit => "Habit",
        }
    }
}

/// Lifecycle state. `Pending` is initial; the rest are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentStatus {
    Pending,
    Done,
    Missed,
    Cancelled,
}

impl CommitmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitmentStatus::Pending => "pending",
            CommitmentStatus::Done => "done",
            CommitmentStatus::Missed => "missed",
            CommitmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CommitmentStatus::Pending),
            "done" => Some(CommitmentStatus::Done),
            "missed" => Some(CommitmentStatus::Missed),
            "cancelled" => Some(CommitmentStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, CommitmentStatus::Pending)
    }

    /// Label for user-facing status messages ("marked as Done").
    pub fn label(&self) -> &'static str {
        match self {
            CommitmentStatus::Pending => "Pending",
            CommitmentStatus::Done => "Done",
            CommitmentStatus::Missed => "Missed",
            CommitmentStatus::Cancelled => "Cancelled",
        }
    }
}

/// Terminal outcome requested by a user response, an auto-expiry, or an
/// explicit cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Missed,
    Cancelled,
}

impl Outcome {
    pub fn status(&self) -> CommitmentStatus {
        match self {
            Outcome::Done => CommitmentStatus::Done,
            Outcome::Missed => CommitmentStatus::Missed,
            Outcome::Cancelled => CommitmentStatus::Cancelled,
        }
    }
}

/// A persisted commitment. `scheduled_at` is stored UTC and rendered in the
/// configured timezone at the edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commitment {
    pub id: String,
    pub user_id: String,
    pub kind: CommitmentKind,
    pub description: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub status: CommitmentStatus,
    pub created_at: DateTime<Utc>,
}

impl Commitment {
    /// When the commitment's window closes (start + duration).
    pub fn end_time(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(self.duration_minutes as i64)
    }
}

/// A candidate commitment awaiting user confirmation. Nothing is persisted
/// until the dialogue receives an affirmative reply.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitmentDraft {
    pub kind: CommitmentKind,
    pub description: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
}

/// Result of `resolve()`. `NotFound` and `AlreadyResolved` are routine
/// control flow, not faults — the loser of a response/auto-expiry race
/// sees `AlreadyResolved` and discards its write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved(CommitmentStatus),
    NotFound,
    AlreadyResolved,
}

/// When the check-in prompt fires relative to `scheduled_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderOffset {
    /// Fires when the commitment's window ends (start + duration).
    AfterEnd,
    /// Fires a fixed lead before the due time.
    BeforeDue { lead_minutes: u32 },
}

/// Per-kind reminder policy. One strategy table instead of per-kind
/// copies of the scheduling code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderPolicy {
    pub offset: ReminderOffset,
    /// Whether an unanswered check-in auto-transitions to `Missed`.
    pub auto_expire: bool,
}

impl ReminderPolicy {
    pub fn for_kind(kind: CommitmentKind, task_lead_minutes: u32) -> Self {
        match kind {
            CommitmentKind::Event | CommitmentKind::Habit => ReminderPolicy {
                offset: ReminderOffset::AfterEnd,
                auto_expire: true,
            },
            CommitmentKind::Task => ReminderPolicy {
                offset: ReminderOffset::BeforeDue {
                    lead_minutes: task_lead_minutes,
                },
                auto_expire: false,
            },
        }
    }

    /// Absolute fire time of the check-in prompt.
    pub fn reminder_time(
        &self,
        scheduled_at: DateTime<Utc>,
        duration_minutes: u32,
    ) -> DateTime<Utc> {
        match self.offset {
            ReminderOffset::AfterEnd => scheduled_at + Duration::minutes(duration_minutes as i64),
            ReminderOffset::BeforeDue { lead_minutes } => {
                scheduled_at - Duration::minutes(lead_minutes as i64)
            }
        }
    }
}

/// What a fired scheduler job asks the lifecycle engine to do.
#[derive(Debug, Clone, PartialEq)]
pub enum JobPayload {
    /// Ask whether the commitment was completed (event/habit, fires at end).
    OutcomeCheck { commitment_id: String },
    /// Pre-due nudge for a task.
    TaskReminder { commitment_id: String },
    /// Transition a still-pending commitment to Missed.
    AutoExpire { commitment_id: String },
    /// Create the next instance of a recurring habit and re-arm.
    SpawnHabit {
        user_id: String,
        habit: crate::recurrence::HabitSchedule,
    },
}

/// Scheduler job id for a commitment's check-in prompt. Deterministic so
/// re-registration is idempotent.
pub fn check_job_id(commitment_id: &str) -> String {
    format!("check-{commitment_id}")
}

/// Scheduler job id for a commitment's auto-expiry.
pub fn expire_job_id(commitment_id: &str) -> String {
    format!("expire-{commitment_id}")
}
