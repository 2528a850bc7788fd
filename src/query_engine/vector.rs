use super::{text_qa_prompt, EngineDeps, QueryEngine, EMPTY_RESPONSE};
use crate::index::VectorIndex;
use crate::models::QueryResponse;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Retrieve-then-synthesise over a single year's index
pub struct VectorQueryEngine {
    index: Arc<VectorIndex>,
    deps: EngineDeps,
}

impl VectorQueryEngine {
    pub fn new(index: Arc<VectorIndex>, deps: EngineDeps) -> Self {
        Self { index, deps }
    }
}

#[async_trait]
impl QueryEngine for VectorQueryEngine {
    async fn query(&self, query: &str) -> Result<QueryResponse> {
        let embedding = self.deps.embedder.embed_query(query).await?;
        let nodes = self.index.retrieve(&embedding, self.deps.similarity_top_k)?;

        debug!(
            year = %self.index.year(),
            retrieved = nodes.len(),
            "Retrieved context"
        );

        if nodes.is_empty() {
            return Ok(QueryResponse {
                response: EMPTY_RESPONSE.to_string(),
                source_nodes: nodes,
            });
        }

        let context = nodes
            .iter()
            .map(|n| n.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let answer = self.deps.llm.complete(&text_qa_prompt(&context, query)).await?;

        Ok(QueryResponse {
            response: answer.trim().to_string(),
            source_nodes: nodes,
        })
    }
}
