//! Notification sink: the narrow slice of a chat transport the engine
//! needs — present a two-option prompt, edit it in place, send a line of
//! text. Message formatting beyond that stays with the host.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Labels for the accept/reject buttons of a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptOptions {
    pub accept: String,
    pub reject: String,
}

impl PromptOptions {
    pub fn new(accept: &str, reject: &str) -> Self {
        Self {
            accept: accept.to_string(),
            reject: reject.to_string(),
        }
    }
}

/// A message handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub user_id: String,
    pub text: String,
    /// `Some` for two-option prompts, `None` for plain text.
    pub options: Option<PromptOptions>,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Present a two-option prompt (confirmation or outcome check).
    async fn send_prompt(&self, user_id: &str, text: &str, options: PromptOptions);

    /// Replace the text of the user's most recent prompt (used to report
    /// the final status in place of the check-in buttons).
    async fn edit_last_prompt(&self, user_id: &str, text: &str);

    /// Plain one-way text.
    async fn send_text(&self, user_id: &str, text: &str);
}

/// In-memory sink: buffers messages per user and optionally forwards them
/// over an mpsc channel to an embedding transport. Also what the tests
/// observe.
pub struct OutboxSink {
    messages: Mutex<HashMap<String, Vec<OutboundMessage>>>,
    forward: Option<mpsc::UnboundedSender<OutboundMessage>>,
}

impl OutboxSink {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(HashMap::new()),
            forward: None,
        }
    }

    /// Forward every message to `sender` as well as buffering it.
    pub fn with_channel(sender: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self {
            messages: Mutex::new(HashMap::new()),
            forward: Some(sender),
        }
    }

    /// Drain the buffered messages for one user, oldest first.
    pub fn drain(&self, user_id: &str) -> Vec<OutboundMessage> {
        self.messages
            .lock()
            .remove(user_id)
            .unwrap_or_default()
    }

    fn push(&self, message: OutboundMessage) {
        if let Some(ref sender) = self.forward {
            if sender.send(message.clone()).is_err() {
                log::warn!("Notification channel closed; message buffered only");
            }
        }
        self.messages
            .lock()
            .entry(message.user_id.clone())
            .or_default()
            .push(message);
    }
}

impl Default for OutboxSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for OutboxSink {
    async fn send_prompt(&self, user_id: &str, text: &str, options: PromptOptions) {
        self.push(OutboundMessage {
            user_id: user_id.to_string(),
            text: text.to_string(),
            options: Some(options),
        });
    }

    async fn edit_last_prompt(&self, user_id: &str, text: &str) {
        let mut guard = self.messages.lock();
        let entries = guard.entry(user_id.to_string()).or_default();
        match entries.iter_mut().rev().find(|m| m.options.is_some()) {
            Some(last) => {
                last.text = text.to_string();
                last.options = None;
            }
            // Nothing to edit — deliver as plain text instead of dropping.
            None => entries.push(OutboundMessage {
                user_id: user_id.to_string(),
                text: text.to_string(),
                options: None,
            }),
        }
        if let Some(ref sender) = self.forward {
            let _ = sender.send(OutboundMessage {
                user_id: user_id.to_string(),
                text: text.to_string(),
                options: None,
            });
        }
    }

    async fn send_text(&self, user_id: &str, text: &str) {
        self.push(OutboundMessage {
            user_id: user_id.to_string(),
            text: text.to_string(),
            options: None,
        });
    }
}
