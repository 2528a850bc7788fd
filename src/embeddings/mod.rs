//! Embedding capability
//!
//! Index construction and query time both go through [`Embedder`]; the
//! concrete model lives behind an HTTP endpoint.

use crate::Result;
use async_trait::async_trait;

pub mod http;
pub use http::HttpEmbedder;

/// Instruction BGE English models expect in front of retrieval queries
const BGE_QUERY_INSTRUCTION: &str = "Represent this sentence for searching relevant passages: ";

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded alongside persisted vectors
    fn model(&self) -> &str;

    /// Embed document chunks, one vector per input, in input order
    async fn embed_texts(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a retrieval query
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let text = query_text_for_model(self.model(), query);
        let mut vectors = self.embed_texts(&[text]).await?;
        vectors.pop().ok_or_else(|| {
            crate::error::AgentError::EmbeddingError("Embedding response was empty".to_string())
        })
    }
}

/// Apply the model's query instruction, if it has one
pub fn query_text_for_model(model: &str, query: &str) -> String {
    let lowered = model.to_lowercase();
    if lowered.contains("bge-") && lowered.contains("-en") {
        format!("{}{}", BGE_QUERY_INSTRUCTION, query)
    } else {
        query.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bge_models_get_query_instruction() {
        let text = query_text_for_model("BAAI/bge-small-en-v1.5", "risk factors");
        assert!(text.starts_with("Represent this sentence"));
        assert!(text.ends_with("risk factors"));

        assert_eq!(
            query_text_for_model("text-embedding-3-small", "risk factors"),
            "risk factors"
        );
    }
}
