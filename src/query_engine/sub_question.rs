//! Sub-question routing across per-year tools
//!
//! The LLM decomposes a question into `{ sub_question, tool_name }` pairs,
//! each pair runs on its named tool, and the answers are synthesised into one
//! response. Sub-questions naming an unknown tool, or whose tool fails, are
//! dropped with a warning.

use super::{text_qa_prompt, EngineDeps, QueryEngine};
use crate::error::AgentError;
use crate::models::{QueryResponse, SourceNode, SubQuestion, SubQuestionAnswer, ToolInput};
use crate::tools::ToolRegistry;
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Answer when every sub-question was dropped
pub const NO_SUB_ANSWERS: &str = "No sub-questions could be answered with the available tools.";

/// Guard against runaway decompositions
const MAX_SUB_QUESTIONS: usize = 10;

pub struct SubQuestionQueryEngine {
    tools: ToolRegistry,
    deps: EngineDeps,
}

impl SubQuestionQueryEngine {
    pub fn new(tools: ToolRegistry, deps: EngineDeps) -> Self {
        Self { tools, deps }
    }

    fn build_prompt(&self, query: &str) -> String {
        let tools: serde_json::Map<String, Value> = self
            .tools
            .iter()
            .map(|t| {
                let meta = t.metadata();
                (meta.name.clone(), Value::String(meta.description.clone()))
            })
            .collect();

        format!(
            r#"Given a user question and a list of tools, output a list of relevant sub-questions
that, when answered with the named tools, are sufficient to answer the user question.

TOOLS:
{}

USER QUESTION:
{}

Rules:
- Each tool_name must be one of the TOOLS keys
- One sub-question per tool where the question needs that tool
- Return ONLY valid JSON
- No explanation text
- JSON format:

{{
  "items": [
    {{ "sub_question": "...", "tool_name": "..." }}
  ]
}}
"#,
            serde_json::to_string_pretty(&Value::Object(tools)).unwrap_or_default(),
            query
        )
    }

    /// Ask the LLM for sub-questions
    pub async fn generate(&self, query: &str) -> Result<Vec<SubQuestion>> {
        let response = self.deps.llm.complete(&self.build_prompt(query)).await?;
        parse_sub_questions(&response)
    }

    async fn answer(&self, sub: &SubQuestion) -> Option<(SubQuestionAnswer, Vec<SourceNode>)> {
        let tool = match self.tools.get(&sub.tool_name) {
            Ok(tool) => tool,
            Err(_) => {
                warn!(tool_name = %sub.tool_name, "Sub-question names an unknown tool; skipping");
                return None;
            }
        };

        let start = Instant::now();
        let input = ToolInput::query(&sub.tool_name, &sub.sub_question);

        match tool.call(&input).await {
            Ok(output) => {
                let execution_time_ms = start.elapsed().as_millis() as u64;
                debug!(
                    tool_name = %sub.tool_name,
                    execution_time_ms,
                    "Sub-question answered"
                );
                let answer = SubQuestionAnswer {
                    sub_question: sub.clone(),
                    answer: output.content,
                    execution_time_ms,
                };
                Some((answer, output.source_nodes))
            }
            Err(e) => {
                warn!(
                    tool_name = %sub.tool_name,
                    error = %e,
                    "Sub-question failed; skipping"
                );
                None
            }
        }
    }

    /// Run every sub-question in order, keeping the ones that succeed
    pub async fn run_sub_questions(&self, subs: &[SubQuestion]) -> (Vec<SubQuestionAnswer>, Vec<SourceNode>) {
        let mut answers = Vec::with_capacity(subs.len());
        let mut sources = Vec::new();

        for sub in subs {
            info!(tool_name = %sub.tool_name, sub_question = %sub.sub_question, "Running sub-question");
            if let Some((answer, nodes)) = self.answer(sub).await {
                answers.push(answer);
                sources.extend(nodes);
            }
        }

        (answers, sources)
    }
}

#[async_trait]
impl QueryEngine for SubQuestionQueryEngine {
    async fn query(&self, query: &str) -> Result<QueryResponse> {
        let subs = self.generate(query).await?;
        info!(count = subs.len(), "Generated sub-questions");

        let (answers, source_nodes) = self.run_sub_questions(&subs).await;

        if answers.is_empty() {
            return Ok(QueryResponse {
                response: NO_SUB_ANSWERS.to_string(),
                source_nodes,
            });
        }

        let context = answers
            .iter()
            .map(|a| format!("Sub question: {}\nResponse: {}", a.sub_question.sub_question, a.answer))
            .collect::<Vec<_>>()
            .join("\n\n");

        let answer = self.deps.llm.complete(&text_qa_prompt(&context, query)).await?;
        Ok(QueryResponse {
            response: answer.trim().to_string(),
            source_nodes,
        })
    }
}

/// Parse the decomposition response
///
/// Accepts `{ "items": [...] }` or a bare array, optionally fenced in ```json.
pub fn parse_sub_questions(response: &str) -> Result<Vec<SubQuestion>> {
    let cleaned = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let json: Value = serde_json::from_str(cleaned).map_err(|e| {
        AgentError::InvalidPlan(format!(
            "Failed to parse sub-question response: {} | raw={}",
            e, response
        ))
    })?;

    let items = match &json {
        Value::Array(items) => items,
        Value::Object(_) => json
            .get("items")
            .and_then(|v| v.as_array())
            .ok_or_else(|| AgentError::InvalidPlan("No items in response".to_string()))?,
        _ => {
            return Err(AgentError::InvalidPlan(
                "Sub-question response is not a list".to_string(),
            ))
        }
    };

    let mut subs = Vec::new();
    for item in items.iter().take(MAX_SUB_QUESTIONS) {
        let sub_question = item
            .get("sub_question")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AgentError::InvalidPlan("Missing sub_question".to_string()))?;

        let tool_name = item
            .get("tool_name")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AgentError::InvalidPlan("Missing tool_name".to_string()))?;

        subs.push(SubQuestion {
            sub_question: sub_question.to_string(),
            tool_name: tool_name.to_string(),
        });
    }

    Ok(subs)
}

/// JSON the decomposition step expects, for scripted models in tests
#[cfg(test)]
pub(crate) fn sub_questions_json(pairs: &[(&str, &str)]) -> String {
    use serde_json::json;

    let items: Vec<Value> = pairs
        .iter()
        .map(|(q, t)| json!({ "sub_question": q, "tool_name": t }))
        .collect();
    json!({ "items": items }).to_string()
}
