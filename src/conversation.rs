//! Conversation log shown next to the agent builder
//!
//! Holds preview and real messages in display order and tracks whether the
//! operator has started a real conversation. Once they have, preview rounds
//! are refused until the log is reset.

use crate::types::ConversationMessage;

/// Ordered message log with the real-activity marker
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    messages: Vec<ConversationMessage>,
    real_activity: bool,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message from genuine interaction
    pub fn append_real(&mut self, message: ConversationMessage) {
        if message.is_real_user() && !self.real_activity {
            tracing::debug!(message = %message.id, "Real user activity started");
            self.real_activity = true;
        }
        self.messages.push(message);
    }

    /// Replace the whole log with one preview round
    ///
    /// Returns `false` and leaves the log untouched when real activity exists.
    pub fn replace_with_preview_round(
        &mut self,
        user: ConversationMessage,
        assistant: ConversationMessage,
    ) -> bool {
        if self.real_activity {
            return false;
        }
        self.messages = vec![user, assistant];
        true
    }

    /// Append the bubble explaining a failed preview
    ///
    /// Returns `false` when real activity exists.
    pub fn append_preview_error(&mut self, message: ConversationMessage) -> bool {
        if self.real_activity {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Clear messages and the real-activity marker
    pub fn reset(&mut self) {
        self.messages.clear();
        self.real_activity = false;
    }

    pub fn has_real_activity(&self) -> bool {
        self.real_activity
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
