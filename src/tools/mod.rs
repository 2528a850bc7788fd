//! Tool trait and registry
//!
//! The agent sees one tool per filing year plus a composite tool that routes
//! sub-questions across those years. Tools are immutable once built and do
//! no I/O until called.

use crate::error::AgentError;
use crate::index::VectorIndex;
use crate::llm::ToolSpec;
use crate::models::{ToolInput, ToolOutput, Year, YearMap};
use crate::query_engine::{EngineDeps, QueryEngine, SubQuestionQueryEngine, VectorQueryEngine};
use crate::Result;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

pub const COMPOSITE_TOOL_NAME: &str = "sub_question_query_engine";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> &ToolMetadata;

    async fn call(&self, input: &ToolInput) -> Result<ToolOutput>;

    /// Function-calling schema: a single string argument `input`
    fn spec(&self) -> ToolSpec {
        let meta = self.metadata();
        ToolSpec {
            name: meta.name.clone(),
            description: meta.description.clone(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "input": {
                        "type": "string",
                        "description": "Natural-language question to answer with this tool"
                    }
                },
                "required": ["input"]
            }),
        }
    }
}

/// Answers questions about one year's filing
pub struct YearIndexTool {
    metadata: ToolMetadata,
    engine: VectorQueryEngine,
}

impl YearIndexTool {
    pub fn new(year: Year, index: Arc<VectorIndex>, deps: EngineDeps) -> Self {
        let metadata = ToolMetadata {
            name: year_tool_name(year),
            description: format!(
                "useful for when you want to answer queries about the {} SEC 10-K for {}",
                year, deps.company
            ),
        };
        Self {
            metadata,
            engine: VectorQueryEngine::new(index, deps),
        }
    }
}

#[async_trait]
impl Tool for YearIndexTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn call(&self, input: &ToolInput) -> Result<ToolOutput> {
        let query = input.query_text()?;
        debug!(tool_name = %self.metadata.name, "Querying year index");
        let response = self.engine.query(query).await?;
        Ok(ToolOutput {
            tool_name: self.metadata.name.clone(),
            content: response.response,
            source_nodes: response.source_nodes,
        })
    }
}

/// Answers questions that span several filings
pub struct SubQuestionTool {
    metadata: ToolMetadata,
    engine: SubQuestionQueryEngine,
}

impl SubQuestionTool {
    pub fn new(engine: SubQuestionQueryEngine, company: &str) -> Self {
        Self {
            metadata: ToolMetadata {
                name: COMPOSITE_TOOL_NAME.to_string(),
                description: format!(
                    "useful for when you want to answer queries that require analyzing multiple SEC 10-K documents for {}",
                    company
                ),
            },
            engine,
        }
    }
}

#[async_trait]
impl Tool for SubQuestionTool {
    fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    async fn call(&self, input: &ToolInput) -> Result<ToolOutput> {
        let query = input.query_text()?;
        let response = self.engine.query(query).await?;
        Ok(ToolOutput {
            tool_name: self.metadata.name.clone(),
            content: response.response,
            source_nodes: response.source_nodes,
        })
    }
}

pub fn year_tool_name(year: Year) -> String {
    format!("vector_index_{}", year)
}

/// Tool registry in registration order; names are unique
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn from_tools(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Result<Self> {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = &tool.metadata().name;
        if self.tools.iter().any(|t| &t.metadata().name == name) {
            return Err(AgentError::DuplicateTool(name.clone()));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.tools
            .iter()
            .find(|t| t.metadata().name == name)
            .cloned()
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.metadata().name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.iter()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// One `vector_index_{year}` tool per requested year, in the given order
pub fn single_tools(
    indices: &YearMap<Arc<VectorIndex>>,
    years: &[Year],
    deps: &EngineDeps,
) -> Result<Vec<Arc<dyn Tool>>> {
    years
        .iter()
        .map(|&year| -> Result<Arc<dyn Tool>> {
            let index = indices.get(year)?;
            Ok(Arc::new(YearIndexTool::new(year, index.clone(), deps.clone())))
        })
        .collect()
}

/// The `sub_question_query_engine` tool over the per-year tools
pub fn composite_tool(
    indices: &YearMap<Arc<VectorIndex>>,
    years: &[Year],
    deps: &EngineDeps,
) -> Result<Arc<dyn Tool>> {
    let registry = ToolRegistry::from_tools(single_tools(indices, years, deps)?)?;
    let engine = SubQuestionQueryEngine::new(registry, deps.clone());
    Ok(Arc::new(SubQuestionTool::new(engine, &deps.company)))
}

/// Everything the agent is given: per-year tools followed by the composite
pub fn agent_tools(
    indices: &YearMap<Arc<VectorIndex>>,
    years: &[Year],
    deps: &EngineDeps,
) -> Result<ToolRegistry> {
    let mut tools = single_tools(indices, years, deps)?;
    tools.push(composite_tool(indices, years, deps)?);
    ToolRegistry::from_tools(tools)
}
