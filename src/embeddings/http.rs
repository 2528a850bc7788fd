//! OpenAI-compatible `/embeddings` client
//!
//! Works against hosted APIs and self-hosted servers (e.g. text-embeddings-inference)
//! serving the configured model.

use super::Embedder;
use crate::config::Settings;
use crate::error::AgentError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Inputs per request
const EMBED_BATCH_SIZE: usize = 10;

/// Inputs are cut to this many chars before being sent
const MAX_INPUT_CHARS: usize = 12_000;

pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpEmbedder {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            &settings.embedding_base_url,
            &settings.embedding_model,
            settings.embedding_api_key.clone(),
            settings.llm_timeout,
        )
    }

    fn endpoint(&self) -> String {
        if self.base_url.ends_with("/embeddings") {
            self.base_url.clone()
        } else {
            format!("{}/embeddings", self.base_url)
        }
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let input: Vec<&str> = batch.iter().map(|s| truncate_chars(s, MAX_INPUT_CHARS)).collect();
        let request = EmbeddingsRequest {
            model: &self.model,
            input,
        };

        let mut req = self.client.post(self.endpoint()).json(&request);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            error!("Embeddings request failed: {}", e);
            AgentError::EmbeddingError(format!("Embeddings request failed: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Embeddings error response ({}): {}", status, body);
            return Err(AgentError::EmbeddingError(format!(
                "Embeddings endpoint returned {}: {}",
                status, body
            )));
        }

        let mut parsed: EmbeddingsResponse = response.json().await.map_err(|e| {
            AgentError::EmbeddingError(format!("Failed to decode embeddings response: {}", e))
        })?;

        if parsed.data.len() != batch.len() {
            return Err(AgentError::EmbeddingError(format!(
                "Expected {} embeddings, got {}",
                batch.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_texts(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(inputs.len());
        for (i, batch) in inputs.chunks(EMBED_BATCH_SIZE).enumerate() {
            debug!(batch = i, size = batch.len(), "Embedding batch");
            vectors.extend(self.embed_batch(batch).await?);
        }

        if vectors.iter().any(|v| v.is_empty()) {
            return Err(AgentError::EmbeddingError(
                "Embeddings response contained an empty vector".to_string(),
            ));
        }
        Ok(vectors)
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};
    use serde_json::{json, Value};

    #[test]
    fn test_request_serialization() {
        let request = EmbeddingsRequest {
            model: "BAAI/bge-small-en-v1.5",
            input: vec!["Uber revenue"],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "BAAI/bge-small-en-v1.5");
        assert_eq!(json["input"][0], "Uber revenue");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[tokio::test]
    async fn test_embeddings_are_reordered_by_index() {
        let router = Router::new().route(
            "/v1/embeddings",
            post(|Json(body): Json<Value>| async move {
                let n = body["input"].as_array().map(|a| a.len()).unwrap_or(0);
                let data: Vec<Value> = (0..n)
                    .rev()
                    .map(|i| json!({ "index": i, "embedding": [i as f32, 1.0] }))
                    .collect();
                Json(json!({ "data": data }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let embedder = HttpEmbedder::new(
            &format!("http://{}/v1", addr),
            "test-model",
            None,
            Duration::from_secs(5),
        )
        .unwrap();

        let inputs: Vec<String> = (0..12).map(|i| format!("chunk {}", i)).collect();
        let vectors = embedder.embed_texts(&inputs).await.unwrap();

        assert_eq!(vectors.len(), 12);
        assert_eq!(vectors[0], vec![0.0, 1.0]);
        // Second batch starts its own index sequence.
        assert_eq!(vectors[10], vec![0.0, 1.0]);
        assert_eq!(vectors[11], vec![1.0, 1.0]);
    }
}
