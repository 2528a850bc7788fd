//! Conversation history storage
//!
//! Stores the chat transcript of one console session with timestamps and
//! approximate token counts.

use crate::index::chunker::estimate_tokens;
use crate::llm::{ChatMessage, ChatRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// A single message in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub message_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Approximate token count for context window management
    pub token_count: usize,
    pub message: ChatMessage,
}

impl ConversationMessage {
    pub fn new(message: ChatMessage) -> Self {
        let arguments: usize = message
            .tool_calls
            .iter()
            .map(|c| estimate_tokens(&c.name) + estimate_tokens(&c.arguments))
            .sum();

        Self {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            token_count: estimate_tokens(&message.content) + arguments,
            message,
        }
    }

    pub fn role(&self) -> ChatRole {
        self.message.role
    }
}

/// Transcript of one chat session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistory {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    messages: VecDeque<ConversationMessage>,
    /// Total token count (approximate)
    total_tokens: usize,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            messages: VecDeque::new(),
            total_tokens: 0,
        }
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        let message = ConversationMessage::new(message);
        self.total_tokens += message.token_count;
        self.messages.push_back(message);
        self.updated_at = Utc::now();
    }

    pub fn messages(&self) -> impl DoubleEndedIterator<Item = &ConversationMessage> {
        self.messages.iter()
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn last(&self) -> Option<&ConversationMessage> {
        self.messages.back()
    }

    /// Drop every message after the first `len`
    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
        self.total_tokens = self.messages.iter().map(|m| m.token_count).sum();
        self.updated_at = Utc::now();
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolCall;

    #[test]
    fn test_conversation_message_creation() {
        let msg = ConversationMessage::new(ChatMessage::user("What was Uber's 2021 revenue?"));
        assert_eq!(msg.role(), ChatRole::User);
        assert!(msg.token_count > 0);
    }

    #[test]
    fn test_tool_call_arguments_count_as_tokens() {
        let msg = ConversationMessage::new(ChatMessage::assistant_tool_calls(vec![ToolCall {
            id: "call_1".to_string(),
            name: "vector_index_2021".to_string(),
            arguments: r#"{"input":"revenue"}"#.to_string(),
        }]));
        assert!(msg.token_count > 0);
    }

    #[test]
    fn test_conversation_history() {
        let mut history = ConversationHistory::new();
        history.add_message(ChatMessage::user("What is gross bookings?"));
        history.add_message(ChatMessage::assistant("Gross bookings is the total dollar value..."));

        assert_eq!(history.message_count(), 2);
        assert!(history.total_tokens() > 0);
        assert_eq!(history.last().map(|m| m.role()), Some(ChatRole::Assistant));
    }

    #[test]
    fn test_truncate_recomputes_tokens() {
        let mut history = ConversationHistory::new();
        history.add_message(ChatMessage::user("first question"));
        let after_first = history.total_tokens();
        history.add_message(ChatMessage::assistant("a much longer answer than the question"));

        history.truncate(1);

        assert_eq!(history.message_count(), 1);
        assert_eq!(history.total_tokens(), after_first);
    }
}
