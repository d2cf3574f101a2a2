//! Temporal intent extraction: free text in, candidate commitment out.
//!
//! `extract()` turns "Dinner with family tomorrow at 7pm for 2 hours"
//! into a description/instant/duration triple plus an ambiguity verdict.
//! Ambiguity is a signal for the confirmation dialogue, never an error.

pub mod duration;
pub mod temporal;

use std::sync::Arc;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

pub use duration::{extract_duration, strip_duration_phrases};
pub use temporal::{
    contains_immediacy, parse_datetime_field, strip_immediacy, DateResolver, RuleResolver,
    TemporalMatch,
};

/// The extractor's output. `when` and `duration_minutes` are always
/// defined; an empty `description` implies `ambiguous = true` and the
/// caller must re-prompt instead of creating a commitment.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub description: String,
    pub when: DateTime<Utc>,
    pub duration_minutes: u32,
    pub ambiguous: bool,
}

/// Imperative verbs that leak through from phrasing like "set dinner
/// tomorrow" and carry no meaning once the request is structured.
fn stopword_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:set|schedule)\b").unwrap())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct IntentExtractor {
    resolver: Arc<dyn DateResolver>,
    default_duration_minutes: u32,
}

impl IntentExtractor {
    pub fn new(resolver: Arc<dyn DateResolver>, default_duration_minutes: u32) -> Self {
        Self {
            resolver,
            default_duration_minutes,
        }
    }

    /// Extract a candidate commitment from free text, resolved relative
    /// to `now`.
    pub fn extract(&self, text: &str, now: DateTime<Utc>) -> Intent {
        // Duration first — "3 hours" left in place would read as a time
        // of day. Capture from the untouched text, then strip every
        // duration phrase from the working copy.
        let duration_minutes = extract_duration(text).unwrap_or(self.default_duration_minutes);
        let mut working = strip_duration_phrases(text);

        let mut ambiguous = false;
        let when = if contains_immediacy(&working) {
            working = strip_immediacy(&working);
            now
        } else {
            let matches = self.resolver.locate(&working, now);
            let future: Vec<&TemporalMatch> = matches.iter().filter(|m| m.at > now).collect();

            if let Some(winner) = future.first() {
                // Earliest-declared future phrase wins; more than one
                // candidate needs human confirmation.
                if future.len() > 1 {
                    ambiguous = true;
                }
                let at = winner.at;
                let (offset, len) = (winner.offset, winner.text.len());
                working.replace_range(offset..offset + len, "");
                at
            } else if let Some(first) = matches.first() {
                // Only past-resolving phrases — very likely a misparse.
                ambiguous = true;
                let at = first.at;
                let (offset, len) = (first.offset, first.text.len());
                working.replace_range(offset..offset + len, "");
                at
            } else {
                ambiguous = true;
                now
            }
        };

        let description = collapse_whitespace(&working);
        let description = description.trim_matches(|c: char| matches!(c, '.' | ',' | '!' | '?' | ';' | ':'));
        let description = stopword_pattern().replace_all(description, "");
        let description = collapse_whitespace(&description);

        if description.split_whitespace().count() < 2 {
            ambiguous = true;
        }

        Intent {
            description,
            when,
            duration_minutes,
            ambiguous,
        }
    }
}
