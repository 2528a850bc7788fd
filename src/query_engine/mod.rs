//! Query engines
//!
//! A [`VectorQueryEngine`] answers from one year's index; a
//! [`SubQuestionQueryEngine`] decomposes a question across per-year tools and
//! synthesises the partial answers.

use crate::config::Settings;
use crate::embeddings::Embedder;
use crate::llm::LanguageModel;
use crate::models::QueryResponse;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub mod sub_question;
pub mod vector;

pub use sub_question::SubQuestionQueryEngine;
pub use vector::VectorQueryEngine;

/// Returned when retrieval finds nothing to answer from
pub const EMPTY_RESPONSE: &str = "Empty Response";

#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn query(&self, query: &str) -> Result<QueryResponse>;
}

/// Shared model handles and retrieval settings every engine needs
#[derive(Clone)]
pub struct EngineDeps {
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LanguageModel>,
    pub similarity_top_k: usize,
    pub company: String,
}

impl EngineDeps {
    pub fn new(embedder: Arc<dyn Embedder>, llm: Arc<dyn LanguageModel>, settings: &Settings) -> Self {
        Self {
            embedder,
            llm,
            similarity_top_k: settings.similarity_top_k,
            company: settings.company.clone(),
        }
    }
}

/// Question-answering prompt over retrieved context
pub(crate) fn text_qa_prompt(context: &str, query: &str) -> String {
    format!(
        "Context information is below.\n\
         ---------------------\n\
         {}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {}\n\
         Answer: ",
        context, query
    )
}
