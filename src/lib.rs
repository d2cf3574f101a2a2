//! Keeper turns free-form natural-language requests ("dinner with family
//! tomorrow at 7pm for 2 hours") into structured, time-bound commitments
//! — events, tasks, habits — and tracks each through a lifecycle of
//! pending → done, missed, or cancelled, with time-delayed check-ins.
//!
//! The crate is transport-agnostic: the chat surface, calendar, and
//! spreadsheet-like store are reached through three narrow traits
//! ([`scheduler::SchedulerAdapter`], [`ledger::Ledger`],
//! [`notify::NotificationSink`]), with working in-process/SQLite
//! implementations bundled.
//!
//! Typical wiring:
//!
//! ```no_run
//! use std::sync::Arc;
//! use keeper::{
//!     Config, ConfirmationDialogue, InProcessScheduler, LifecycleEngine, OutboxSink,
//!     RuleResolver, SqliteLedger,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let (scheduler, jobs) = InProcessScheduler::new(config.poll_interval_secs);
//! let ledger = Arc::new(SqliteLedger::open()?);
//! let outbox = Arc::new(OutboxSink::new());
//!
//! let engine = Arc::new(LifecycleEngine::new(
//!     ledger,
//!     scheduler.clone(),
//!     outbox,
//!     &config,
//! )?);
//! let resolver = Arc::new(RuleResolver::new(config.tz()?));
//! let dialogue = ConfirmationDialogue::new(engine.clone(), resolver, &config)?;
//!
//! // Spawn `scheduler.run()` and `engine.run(jobs)` on the runtime, then
//! // feed user messages through `dialogue.begin(..)` / `dialogue.reply(..)`.
//! # let _ = (dialogue, jobs);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dialogue;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod lifecycle;
pub mod notify;
pub mod recurrence;
pub mod scheduler;
pub mod types;

pub use config::{load_config, save_config, Config, ConfigError};
pub use dialogue::{ConfirmationDialogue, DialogueReply};
pub use error::{CreateError, ScheduleError};
pub use extract::{DateResolver, Intent, IntentExtractor, RuleResolver, TemporalMatch};
pub use ledger::{Ledger, LedgerError, SqliteLedger, StatusWrite};
pub use lifecycle::LifecycleEngine;
pub use notify::{NotificationSink, OutboundMessage, OutboxSink, PromptOptions};
pub use recurrence::{Frequency, HabitSchedule, RecurrenceError};
pub use scheduler::{FiredJob, InProcessScheduler, SchedulerAdapter};
pub use types::{
    Commitment, CommitmentDraft, CommitmentKind, CommitmentStatus, JobPayload, Outcome,
    ReminderPolicy, Resolution,
};

/// Initialize `env_logger` for hosts that bring no logger of their own.
/// Idempotent; a second call is a no-op.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .try_init();
}
