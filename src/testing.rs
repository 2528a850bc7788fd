//! Deterministic stand-ins for the embedding and language models

use crate::embeddings::Embedder;
use crate::llm::{ChatMessage, LanguageModel, ToolSpec};
use crate::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const KEYWORD_DIMS: usize = 64;

/// Hashed bag-of-words embedder: texts sharing words land close together
#[derive(Default)]
pub struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    /// Number of `embed_texts` invocations so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn embed_one(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; KEYWORD_DIMS];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| w.len() > 2) {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            v[digest[0] as usize % KEYWORD_DIMS] += 1.0;
        }
        // Keep every vector non-zero so cosine is defined.
        v[KEYWORD_DIMS - 1] += 0.01;
        v
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model(&self) -> &str {
        "keyword-test"
    }

    async fn embed_texts(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(inputs.iter().map(|t| Self::embed_one(t)).collect())
    }
}

type Responder = dyn Fn(&[ChatMessage], &[ToolSpec]) -> Result<ChatMessage> + Send + Sync;

/// Language model driven by a closure; records every request
pub struct ScriptedLlm {
    responder: Box<Responder>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&[ChatMessage], &[ToolSpec]) -> Result<ChatMessage> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with the same text
    pub fn fixed(answer: &str) -> Self {
        let answer = answer.to_string();
        Self::new(move |_, _| Ok(ChatMessage::assistant(answer.clone())))
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    fn model(&self) -> &str {
        "scripted-test"
    }

    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ChatMessage> {
        self.requests.lock().unwrap().push(messages.to_vec());
        (self.responder)(messages, tools)
    }
}

/// Text of the last message in a request
pub fn last_content(messages: &[ChatMessage]) -> &str {
    messages.last().map(|m| m.content.as_str()).unwrap_or("")
}
