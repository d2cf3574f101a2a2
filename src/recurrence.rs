//! Habit recurrence: a small frequency grammar compiled to cron.
//!
//! Habits repeat (`daily`, or a comma-separated list of weekday names) at
//! a fixed local time. Each occurrence spawns one ordinary commitment
//! instance, so the lifecycle machinery downstream is identical to events.

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use cron::Schedule;
use thiserror::Error;

use crate::types::{CommitmentDraft, CommitmentKind};

#[derive(Debug, Error)]
pub enum RecurrenceError {
    #[error("unknown frequency token: '{0}'")]
    UnknownFrequency(String),

    #[error("invalid cron expression '{expr}': {message}")]
    InvalidCron { expr: String, message: String },

    #[error("no upcoming occurrence")]
    NoUpcoming,
}

/// How often a habit repeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    /// Specific weekdays, deduplicated, in the order given.
    Days(Vec<Weekday>),
}

impl Frequency {
    /// Parse "daily" or a comma-separated weekday list ("monday,thursday",
    /// full or three-letter names).
    pub fn parse(s: &str) -> Result<Self, RecurrenceError> {
        let trimmed = s.trim().to_lowercase();
        if trimmed == "daily" {
            return Ok(Frequency::Daily);
        }
        let mut days = Vec::new();
        for token in trimmed.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let day: Weekday = token
                .parse()
                .map_err(|_| RecurrenceError::UnknownFrequency(token.to_string()))?;
            if !days.contains(&day) {
                days.push(day);
            }
        }
        if days.is_empty() {
            return Err(RecurrenceError::UnknownFrequency(s.trim().to_string()));
        }
        Ok(Frequency::Days(days))
    }

    /// Day-of-week field of a cron expression.
    fn cron_dow(&self) -> String {
        match self {
            Frequency::Daily => "*".to_string(),
            Frequency::Days(days) => days
                .iter()
                .map(|d| cron_day_name(*d))
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

fn cron_day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

/// A recurring habit definition. Instances are spawned per occurrence;
/// the definition itself is not a commitment.
#[derive(Debug, Clone, PartialEq)]
pub struct HabitSchedule {
    pub description: String,
    pub frequency: Frequency,
    /// Local wall-clock start time.
    pub time: NaiveTime,
    pub duration_minutes: u32,
}

impl HabitSchedule {
    /// 5-field cron expression for this habit.
    pub fn to_cron(&self) -> String {
        use chrono::Timelike;
        format!(
            "{} {} * * {}",
            self.time.minute(),
            self.time.hour(),
            self.frequency.cron_dow()
        )
    }

    pub fn schedule(&self) -> Result<Schedule, RecurrenceError> {
        parse_cron(&self.to_cron())
    }

    /// Next occurrence strictly after `after`, computed in the configured
    /// timezone, returned in UTC.
    pub fn next_occurrence(
        &self,
        after: DateTime<Utc>,
        tz: Tz,
    ) -> Result<DateTime<Utc>, RecurrenceError> {
        let local = after.with_timezone(&tz);
        self.schedule()?
            .after(&local)
            .next()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or(RecurrenceError::NoUpcoming)
    }

    /// Deterministic scheduler job id for this habit's spawn job.
    pub fn job_id(&self) -> String {
        format!("habit-{}", slugify(&self.description))
    }

    /// The commitment instance for one occurrence.
    pub fn instance_draft(&self, at: DateTime<Utc>) -> CommitmentDraft {
        CommitmentDraft {
            kind: CommitmentKind::Habit,
            description: self.description.clone(),
            scheduled_at: at,
            duration_minutes: self.duration_minutes,
        }
    }
}

/// Parse a 5-field cron expression. The cron crate expects 6 fields (with
/// seconds), so "0" is prepended.
pub fn parse_cron(expr: &str) -> Result<Schedule, RecurrenceError> {
    let full_expr = format!("0 {}", expr);
    full_expr
        .parse::<Schedule>()
        .map_err(|e| RecurrenceError::InvalidCron {
            expr: expr.to_string(),
            message: e.to_string(),
        })
}

/// Convert a description to a job-id-safe kebab-case slug.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_frequency_daily() {
        assert_eq!(Frequency::parse("daily").unwrap(), Frequency::Daily);
        assert_eq!(Frequency::parse(" DAILY ").unwrap(), Frequency::Daily);
    }

    #[test]
    fn test_parse_frequency_weekdays() {
        assert_eq!(
            Frequency::parse("monday,thursday").unwrap(),
            Frequency::Days(vec![Weekday::Mon, Weekday::Thu])
        );
        assert_eq!(
            Frequency::parse("mon, mon, fri").unwrap(),
            Frequency::Days(vec![Weekday::Mon, Weekday::Fri])
        );
    }

    #[test]
    fn test_parse_frequency_rejects_unknown() {
        assert!(matches!(
            Frequency::parse("fortnightly"),
            Err(RecurrenceError::UnknownFrequency(_))
        ));
        assert!(Frequency::parse("").is_err());
    }

    #[test]
    fn test_to_cron() {
        let habit = HabitSchedule {
            description: "Meditate".to_string(),
            frequency: Frequency::Daily,
            time: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            duration_minutes: 30,
        };
        assert_eq!(habit.to_cron(), "0 7 * * *");
        assert!(habit.schedule().is_ok());

        let habit = HabitSchedule {
            frequency: Frequency::parse("monday,friday").unwrap(),
            ..habit
        };
        assert_eq!(habit.to_cron(), "0 7 * * Mon,Fri");
        assert!(habit.schedule().is_ok());
    }

    #[test]
    fn test_next_occurrence_daily() {
        let habit = HabitSchedule {
            description: "Meditate".to_string(),
            frequency: Frequency::Daily,
            time: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            duration_minutes: 30,
        };
        // 2024-01-01 10:00 UTC — 07:00 already passed, next is tomorrow.
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let next = habit.next_occurrence(after, chrono_tz::UTC).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 2, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_next_occurrence_weekday_in_zone() {
        let habit = HabitSchedule {
            description: "Long run".to_string(),
            frequency: Frequency::parse("saturday").unwrap(),
            time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            duration_minutes: 90,
        };
        // Monday 2024-01-01 10:00 UTC; next Saturday is 2024-01-06.
        // 08:00 in Kuala Lumpur (UTC+8) is 00:00 UTC.
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let next = habit
            .next_occurrence(after, chrono_tz::Asia::Kuala_Lumpur)
            .unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_cron_invalid() {
        assert!(parse_cron("not a cron").is_err());
        assert!(parse_cron("0 8 * * 1-5").is_ok());
    }

    #[test]
    fn test_job_id_slug() {
        let habit = HabitSchedule {
            description: "Morning Pages!".to_string(),
            frequency: Frequency::Daily,
            time: NaiveTime::from_hms_opt(6, 30, 0).unwrap(),
            duration_minutes: 20,
        };
        assert_eq!(habit.job_id(), "habit-morning-pages");
    }
}
