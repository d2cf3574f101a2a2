//! Confirmation dialogue: the two-turn gate in front of commitment
//! creation.
//!
//! Every candidate — however confidently parsed — is echoed back and
//! requires an explicit yes/no before anything is persisted. Parsing is
//! heuristic; no commitment is created silently. Nonconforming replies
//! re-prompt without burning a retry: the dialogue waits as long as the
//! host conversation allows.
//!
//! One pending draft per user. A new request while one is outstanding
//! overrides the old draft — drafts are never merged.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use regex::Regex;

use crate::config::{Config, ConfigError};
use crate::extract::{parse_datetime_field, DateResolver, IntentExtractor};
use crate::lifecycle::LifecycleEngine;
use crate::types::{Commitment, CommitmentDraft, CommitmentKind};

const AFFIRMATIVE: &[&str] = &["yes", "yeah", "yep", "sure", "affirmative"];
const NEGATIVE: &[&str] = &["no", "nope", "nah"];

/// What the transport should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogueReply {
    /// Show the confirmation prompt; a draft is now pending.
    Confirm(String),
    /// Affirmed and created.
    Created(Commitment),
    /// Declined; the draft was discarded without a ledger write.
    Cancelled,
    /// The request could not be parsed at all; shows a usage hint.
    Rejected(String),
    /// Nonconforming reply; ask again, draft unchanged.
    Reprompt(String),
    /// A reply arrived with no draft outstanding.
    NothingPending(String),
    /// Creation failed after an affirmative; user-facing apology.
    Failed(String),
}

/// Structured fallback grammar: `description | datetime [| duration]`.
fn structured_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<desc>.+?)\s*\|\s*(?P<when>.+?)\s*(?:\|\s*(?P<dur>\d+)\s*)?$").unwrap()
    })
}

fn usage_hint(kind: CommitmentKind) -> String {
    format!(
        "Please enter the {} details in either format:\n\
         1. Natural language: Dinner with family tomorrow at 7pm for 2 hours\n\
         2. Structured format: [Description] | [YYYY-MM-DD HH:MM] | [Duration in minutes]",
        kind.as_str()
    )
}

pub struct ConfirmationDialogue {
    engine: Arc<LifecycleEngine>,
    extractor: IntentExtractor,
    resolver: Arc<dyn DateResolver>,
    tz: Tz,
    default_duration_minutes: u32,
    /// One pending draft per user-conversation.
    sessions: Mutex<HashMap<String, CommitmentDraft>>,
}

impl ConfirmationDialogue {
    pub fn new(
        engine: Arc<LifecycleEngine>,
        resolver: Arc<dyn DateResolver>,
        config: &Config,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            engine,
            extractor: IntentExtractor::new(resolver.clone(), config.default_duration_minutes),
            resolver,
            tz: config.tz()?,
            default_duration_minutes: config.default_duration_minutes,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Whether a draft is outstanding for this user.
    pub fn has_pending(&self, user_id: &str) -> bool {
        self.sessions.lock().contains_key(user_id)
    }

    /// First turn: parse the request and stage a draft for confirmation.
    pub fn begin(
        &self,
        user_id: &str,
        kind: CommitmentKind,
        text: &str,
        now: DateTime<Utc>,
    ) -> DialogueReply {
        let text = text.trim();
        if text.is_empty() {
            return DialogueReply::Rejected(usage_hint(kind));
        }

        let draft = if let Some(caps) = structured_pattern().captures(text) {
            let when_str = caps.name("when").map(|m| m.as_str()).unwrap_or_default();
            let Some(when) = parse_datetime_field(when_str, self.tz, now, self.resolver.as_ref())
            else {
                return DialogueReply::Rejected(
                    "❌ Could not parse the date and time. Please ensure it's in a recognizable format."
                        .to_string(),
                );
            };
            let duration_minutes = caps
                .name("dur")
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(self.default_duration_minutes);
            CommitmentDraft {
                kind,
                description: caps["desc"].trim().to_string(),
                scheduled_at: when,
                duration_minutes,
            }
        } else {
            let intent = self.extractor.extract(text, now);
            if intent.description.is_empty() {
                // Nothing recognizable survived extraction.
                return DialogueReply::Rejected(usage_hint(kind));
            }
            CommitmentDraft {
                kind,
                description: intent.description,
                scheduled_at: intent.when,
                duration_minutes: intent.duration_minutes,
            }
        };

        let prompt = format!(
            "Please confirm the {} details:\n\
             📝 Description: {}\n\
             📅 Date and Time: {}\n\
             ⏰ Duration: {} minutes\n\
             \nReply with 'yes' to confirm or 'no' to cancel.",
            draft.kind.as_str(),
            draft.description,
            draft.scheduled_at.with_timezone(&self.tz).format("%Y-%m-%d %H:%M"),
            draft.duration_minutes
        );

        if self
            .sessions
            .lock()
            .insert(user_id.to_string(), draft)
            .is_some()
        {
            log::info!("User '{}' started a new request; replacing the pending draft", user_id);
        }

        DialogueReply::Confirm(prompt)
    }

    /// Second turn: apply the user's yes/no.
    pub async fn reply(&self, user_id: &str, text: &str) -> DialogueReply {
        let normalized = text.trim().to_lowercase();

        if AFFIRMATIVE.contains(&normalized.as_str()) {
            let Some(draft) = self.sessions.lock().remove(user_id) else {
                return DialogueReply::NothingPending(
                    "⚠️ No pending request found. Please start over.".to_string(),
                );
            };
            return match self.engine.create(user_id, draft).await {
                Ok(commitment) => DialogueReply::Created(commitment),
                Err(e) => {
                    log::warn!("Creation after confirmation failed for '{}': {}", user_id, e);
                    DialogueReply::Failed(e.user_message())
                }
            };
        }

        if NEGATIVE.contains(&normalized.as_str()) {
            return if self.sessions.lock().remove(user_id).is_some() {
                DialogueReply::Cancelled
            } else {
                DialogueReply::NothingPending(
                    "⚠️ No pending request found. Please start over.".to_string(),
                )
            };
        }

        if !self.has_pending(user_id) {
            return DialogueReply::NothingPending(
                "⚠️ No pending request found. Please start over.".to_string(),
            );
        }
        DialogueReply::Reprompt("❓ Please reply with 'yes' to confirm or 'no' to cancel.".to_string())
    }
}
