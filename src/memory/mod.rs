//! Agent Memory System
//!
//! Conversation transcript plus the token-bounded window sent to the LLM.

pub mod context_manager;
pub mod store;

pub use context_manager::{ContextConfig, ContextManager};
pub use store::{ConversationHistory, ConversationMessage};
