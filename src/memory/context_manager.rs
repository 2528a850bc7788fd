//! Context Window Management
//!
//! Picks the slice of the transcript that is sent to the LLM so the prompt
//! stays under a token budget.

use crate::llm::{ChatMessage, ChatRole};
use crate::memory::store::{ConversationHistory, ConversationMessage};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Token budget for the transcript sent with each request
    pub max_context_tokens: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        // Three quarters of a 16k-token context window.
        Self {
            max_context_tokens: 12_000,
        }
    }
}

pub struct ContextManager {
    config: ContextConfig,
}

impl ContextManager {
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
        }
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Newest messages that fit in the budget, oldest first
    ///
    /// `reserved_tokens` is spent elsewhere in the prompt (system prompt).
    /// The newest message is always included. Tool results are never sent
    /// without the assistant call that requested them: orphans are dropped,
    /// or, when nothing else fits, the call is pulled back in over budget.
    pub fn prepare_context_for_llm<'a>(
        &self,
        history: &'a ConversationHistory,
        reserved_tokens: usize,
    ) -> Vec<&'a ChatMessage> {
        let budget = self.config.max_context_tokens.saturating_sub(reserved_tokens);
        let messages: Vec<&ConversationMessage> = history.messages().collect();

        let mut start = messages.len();
        let mut used = 0;
        while start > 0 {
            let msg = messages[start - 1];
            if start < messages.len() && used + msg.token_count > budget {
                break;
            }
            used += msg.token_count;
            start -= 1;
        }

        let orphaned = messages[start..]
            .iter()
            .take_while(|m| m.role() == ChatRole::Tool)
            .count();
        if orphaned > 0 && start + orphaned < messages.len() {
            start += orphaned;
        } else if orphaned > 0 {
            while start > 0 && messages[start].role() == ChatRole::Tool {
                start -= 1;
            }
        }

        let window: Vec<&ChatMessage> = messages[start..].iter().map(|&m| &m.message).collect();
        debug!(
            kept = window.len(),
            total = history.message_count(),
            tokens = messages[start..].iter().map(|m| m.token_count).sum::<usize>(),
            "Prepared context window"
        );
        window
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolCall;

    #[test]
    fn test_context_manager_creation() {
        let manager = ContextManager::new();
        assert_eq!(manager.config().max_context_tokens, 12_000);
    }

    #[test]
    fn test_window_keeps_newest_within_budget() {
        let manager = ContextManager::with_config(ContextConfig {
            max_context_tokens: 40,
        });
        let mut history = ConversationHistory::new();
        for i in 0..20 {
            history.add_message(ChatMessage::user(format!("Question number {} about revenue", i)));
        }

        let context = manager.prepare_context_for_llm(&history, 0);

        assert!(!context.is_empty());
        assert!(context.len() < 20);
        assert_eq!(context.last().unwrap().content, "Question number 19 about revenue");
        let first = history.messages().count() - context.len();
        assert_eq!(context[0].content, format!("Question number {} about revenue", first));
    }

    #[test]
    fn test_newest_message_survives_tiny_budget() {
        let manager = ContextManager::with_config(ContextConfig {
            max_context_tokens: 1,
        });
        let mut history = ConversationHistory::new();
        history.add_message(ChatMessage::user("a question far longer than one token"));

        let context = manager.prepare_context_for_llm(&history, 500);
        assert_eq!(context.len(), 1);
    }

    #[test]
    fn test_window_does_not_start_with_orphaned_tool_result() {
        let mut history = ConversationHistory::new();
        history.add_message(ChatMessage::user("x".repeat(400)));
        history.add_message(ChatMessage::assistant_tool_calls(vec![ToolCall {
            id: "call_1".to_string(),
            name: "vector_index_2020".to_string(),
            arguments: "{}".to_string(),
        }]));
        history.add_message(ChatMessage::tool_result("call_1", "y".repeat(80)));
        history.add_message(ChatMessage::assistant("done"));

        // Budget fits the tool result and final answer but not the call.
        let manager = ContextManager::with_config(ContextConfig {
            max_context_tokens: 22,
        });
        let context = manager.prepare_context_for_llm(&history, 0);

        assert_eq!(context.len(), 1);
        assert_eq!(context[0].role, ChatRole::Assistant);
        assert_eq!(context[0].content, "done");
    }

    #[test]
    fn test_oversized_tool_result_keeps_its_call() {
        let mut history = ConversationHistory::new();
        history.add_message(ChatMessage::user("How did freight do?"));
        history.add_message(ChatMessage::assistant_tool_calls(vec![
            ToolCall {
                id: "call_1".to_string(),
                name: "vector_index_2021".to_string(),
                arguments: "{}".to_string(),
            },
            ToolCall {
                id: "call_2".to_string(),
                name: "vector_index_2022".to_string(),
                arguments: "{}".to_string(),
            },
        ]));
        history.add_message(ChatMessage::tool_result("call_1", "short"));
        history.add_message(ChatMessage::tool_result("call_2", "z".repeat(400)));

        let manager = ContextManager::with_config(ContextConfig {
            max_context_tokens: 10,
        });
        let context = manager.prepare_context_for_llm(&history, 0);

        assert_eq!(context.len(), 3);
        assert_eq!(context[0].role, ChatRole::Assistant);
        assert_eq!(context[0].tool_calls.len(), 2);
        assert_eq!(context[1].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(context[2].tool_call_id.as_deref(), Some("call_2"));
    }
}
