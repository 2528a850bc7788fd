//! Function-calling agent over the filing tools
//!
//! USER TURN → LLM → TOOL CALLS? → TOOL RESULTS → LLM → ... → ANSWER
//!
//! The LLM may request tools for up to `max_function_calls` rounds; after
//! that it is asked for a final answer with no tools offered.

use crate::config::Settings;
use crate::error::AgentError;
use crate::llm::{ChatMessage, LanguageModel, ToolCall};
use crate::memory::{ContextManager, ConversationHistory};
use crate::models::{SourceNode, ToolInput};
use crate::tools::ToolRegistry;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One tool invocation made while answering a turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSource {
    pub tool_name: String,
    pub raw_input: Value,
    pub content: String,
    pub is_error: bool,
    pub source_nodes: Vec<SourceNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub response: String,
    pub sources: Vec<ToolSource>,
}

pub struct FilingAgent {
    llm: Arc<dyn LanguageModel>,
    tools: ToolRegistry,
    system_prompt: ChatMessage,
    max_function_calls: usize,
    history: ConversationHistory,
    context: ContextManager,
}

impl FilingAgent {
    pub fn new(llm: Arc<dyn LanguageModel>, tools: ToolRegistry, settings: &Settings) -> Self {
        let years = settings
            .years
            .iter()
            .map(|y| y.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let system_prompt = ChatMessage::system(format!(
            "You are an analyst answering questions about the SEC 10-K filings of {} for the years {}. \
             Use the provided tools to look up facts in the filings before answering. \
             Use the per-year tools for questions about a single year and the sub-question tool \
             for questions that compare or combine several years.",
            settings.company, years
        ));

        Self {
            llm,
            tools,
            system_prompt,
            max_function_calls: settings.max_function_calls,
            history: ConversationHistory::new(),
            context: ContextManager::new(),
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answer one user message. A failed turn leaves the transcript as it was.
    pub async fn chat(&mut self, input: &str) -> Result<AgentResponse> {
        let checkpoint = self.history.message_count();
        let result = self.run_turn(input).await;
        if result.is_err() {
            self.history.truncate(checkpoint);
        }
        result
    }

    async fn run_turn(&mut self, input: &str) -> Result<AgentResponse> {
        let start = Instant::now();
        self.history.add_message(ChatMessage::user(input));

        let specs = self.tools.specs();
        let mut sources = Vec::new();

        for round in 0..=self.max_function_calls {
            let allow_tools = round < self.max_function_calls && !specs.is_empty();
            let offered = if allow_tools { &specs[..] } else { &[] };

            let messages = self.prompt_messages();
            let reply = self.llm.chat(&messages, offered).await?;

            if !allow_tools || reply.tool_calls.is_empty() {
                let response = reply.content.trim().to_string();
                if response.is_empty() {
                    return Err(AgentError::LlmError("Empty response from LLM".to_string()));
                }
                self.history.add_message(ChatMessage::assistant(response.clone()));

                info!(
                    rounds = round,
                    tool_calls = sources.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Agent turn complete"
                );
                return Ok(AgentResponse { response, sources });
            }

            debug!(round, calls = reply.tool_calls.len(), "LLM requested tools");
            let calls = reply.tool_calls.clone();
            self.history.add_message(reply);

            for call in &calls {
                let source = self.call_tool(call).await;
                self.history
                    .add_message(ChatMessage::tool_result(call.id.clone(), source.content.clone()));
                sources.push(source);
            }
        }

        // The last round never offers tools, so it always returns above.
        Err(AgentError::LlmError("Agent loop ended without an answer".to_string()))
    }

    fn prompt_messages(&self) -> Vec<ChatMessage> {
        let reserved = crate::index::chunker::estimate_tokens(&self.system_prompt.content);
        let mut messages = vec![self.system_prompt.clone()];
        messages.extend(
            self.context
                .prepare_context_for_llm(&self.history, reserved)
                .into_iter()
                .cloned(),
        );
        messages
    }

    /// Run one requested tool. Failures become error text for the LLM.
    async fn call_tool(&self, call: &ToolCall) -> ToolSource {
        let raw_input = parse_arguments(&call.arguments);
        let input = ToolInput {
            tool_name: call.name.clone(),
            parameters: raw_input.clone(),
        };

        let result = match self.tools.get(&call.name) {
            Ok(tool) => tool.call(&input).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(output) => {
                info!(tool_name = %call.name, nodes = output.source_nodes.len(), "Tool call succeeded");
                ToolSource {
                    tool_name: call.name.clone(),
                    raw_input,
                    content: output.content,
                    is_error: false,
                    source_nodes: output.source_nodes,
                }
            }
            Err(e) => {
                warn!(tool_name = %call.name, error = %e, "Tool call failed");
                ToolSource {
                    tool_name: call.name.clone(),
                    raw_input,
                    content: format!("Error: {}", e),
                    is_error: true,
                    source_nodes: Vec::new(),
                }
            }
        }
    }
}

/// Tool arguments as an object; bare strings become `{"input": ...}`
fn parse_arguments(arguments: &str) -> Value {
    match serde_json::from_str::<Value>(arguments) {
        Ok(value @ Value::Object(_)) => value,
        Ok(Value::String(s)) => json!({ "input": s }),
        _ => json!({ "input": arguments }),
    }
}
