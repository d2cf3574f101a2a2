//! Errors for commitment creation and adapter failures.
//!
//! Parsing ambiguity is never an error — it routes to the confirmation
//! dialogue. `NotFound`/`AlreadyResolved` on resolve are result variants
//! (`types::Resolution`), not errors. What remains here are the failures
//! that abort an operation or degrade it.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::ledger::LedgerError;

/// Why a commitment could not be created.
///
/// Persistence failure aborts creation before any job is scheduled.
/// Scheduling failure after a successful write is deliberately NOT a
/// variant: the commitment exists, it just has no reminder — the engine
/// logs it and carries on.
#[derive(Debug, Error)]
pub enum CreateError {
    #[error("description too short: {0:?}")]
    DescriptionTooShort(String),

    #[error("task due time {0} is already in the past")]
    DueInPast(DateTime<Utc>),

    #[error("ledger write failed: {0}")]
    Persistence(#[from] LedgerError),
}

impl CreateError {
    /// User-visible apology line for the chat transport.
    pub fn user_message(&self) -> String {
        match self {
            CreateError::DescriptionTooShort(_) => {
                "❓ I couldn't find enough of a description. Please include a few words about what you're committing to.".to_string()
            }
            CreateError::DueInPast(_) => {
                "❌ That due time has already passed. Please pick a time in the future.".to_string()
            }
            CreateError::Persistence(_) => {
                "❌ An error occurred while saving your request. Please try again later.".to_string()
            }
        }
    }
}

/// Job registration failure. Degraded, not fatal: a commitment without a
/// reminder stays `Pending` and remains visible through the day queries.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("job registration failed: {0}")]
    Backend(String),

    #[error("invalid recurrence: {0}")]
    Recurrence(#[from] crate::recurrence::RecurrenceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_are_apologies_not_internals() {
        let err = CreateError::DescriptionTooShort("x".to_string());
        assert!(!err.user_message().contains("DescriptionTooShort"));

        let err = CreateError::DueInPast(Utc::now());
        assert!(err.user_message().contains("future"));
    }
}
