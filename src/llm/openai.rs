//! Chat-completions client for OpenAI-compatible and Azure OpenAI endpoints
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use super::{ChatMessage, ChatRole, LanguageModel, ToolCall, ToolSpec};
use crate::config::{LlmEndpoint, Settings};
use crate::error::AgentError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

/// Reusable chat-completions client (connection-pooled)
pub struct OpenAiClient {
    client: Client,
    endpoint: LlmEndpoint,
    model: String,
    temperature: f32,
}

impl OpenAiClient {
    pub fn new(endpoint: LlmEndpoint, model: &str, temperature: f32, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            model: model.to_string(),
            temperature,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.llm_endpoint.clone(),
            &settings.llm_model,
            settings.temperature,
            settings.llm_timeout,
        )
    }

    fn url(&self) -> String {
        match &self.endpoint {
            LlmEndpoint::OpenAi { base_url, .. } => {
                let base = base_url.trim_end_matches('/');
                if base.ends_with("/chat/completions") {
                    base.to_string()
                } else {
                    format!("{}/chat/completions", base)
                }
            }
            LlmEndpoint::Azure {
                endpoint,
                deployment,
                api_version,
                ..
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                deployment,
                api_version
            ),
        }
    }

    fn build_request<'a>(&'a self, messages: &'a [ChatMessage], tools: &'a [ToolSpec]) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: messages.iter().map(WireMessage::from).collect(),
            tools: tools.iter().map(WireTool::from).collect(),
            tool_choice: if tools.is_empty() { None } else { Some("auto") },
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ChatMessage> {
        let request = self.build_request(messages, tools);

        debug!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "Calling chat completions"
        );

        let mut req = self.client.post(self.url()).json(&request);
        req = match &self.endpoint {
            LlmEndpoint::OpenAi { api_key: Some(key), .. } => req.bearer_auth(key),
            LlmEndpoint::Azure { api_key: Some(key), .. } => req.header("api-key", key),
            _ => req,
        };

        let response = req.send().await.map_err(|e| {
            error!("Chat completions request failed: {}", e);
            AgentError::LlmError(format!("Chat completions request failed: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Chat completions error response ({}): {}", status, error_text);
            return Err(AgentError::LlmError(format!(
                "Chat completions returned {}: {}",
                status, error_text
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            error!("Failed to parse chat completions response: {}", e);
            AgentError::LlmError(format!("Chat completions parse error: {}", e))
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::LlmError("No choices in chat completions response".to_string()))?;

        let message = choice.message.into_chat_message();
        info!(
            finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
            tool_calls = message.tool_calls.len(),
            "Chat completion received"
        );
        Ok(message)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: ChatRole,
    /// `null` for assistant turns that only carry tool calls
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCallOut<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

impl<'a> From<&'a ChatMessage> for WireMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        let content = if message.content.is_empty() && !message.tool_calls.is_empty() {
            None
        } else {
            Some(message.content.as_str())
        };
        Self {
            role: message.role,
            content,
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| WireToolCallOut {
                    id: &call.id,
                    kind: "function",
                    function: WireFunctionOut {
                        name: &call.name,
                        arguments: &call.arguments,
                    },
                })
                .collect(),
            tool_call_id: message.tool_call_id.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireToolCallOut<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionOut<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunctionOut<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolSpec,
}

impl<'a> From<&'a ToolSpec> for WireTool<'a> {
    fn from(spec: &'a ToolSpec) -> Self {
        Self {
            kind: "function",
            function: spec,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl ResponseMessage {
    fn into_chat_message(self) -> ChatMessage {
        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        ChatMessage {
            role: ChatRole::Assistant,
            content: self.content.unwrap_or_default(),
            tool_calls,
            tool_call_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, routing::post, Json, Router};
    use serde_json::{json, Value};

    fn client(endpoint: LlmEndpoint) -> OpenAiClient {
        OpenAiClient::new(endpoint, "gpt-35-turbo-16k", 0.0, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_azure_url_targets_deployment() {
        let client = client(LlmEndpoint::Azure {
            endpoint: "https://example.openai.azure.com/".to_string(),
            deployment: "gpt35".to_string(),
            api_version: "2023-07-01-preview".to_string(),
            api_key: None,
        });
        assert_eq!(
            client.url(),
            "https://example.openai.azure.com/openai/deployments/gpt35/chat/completions?api-version=2023-07-01-preview"
        );
    }

    #[test]
    fn test_request_serialization_with_tool_turns() {
        let client = client(LlmEndpoint::OpenAi {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
        });
        let messages = vec![
            ChatMessage::user("Compare revenue"),
            ChatMessage::assistant_tool_calls(vec![ToolCall {
                id: "call_1".to_string(),
                name: "vector_index_2021".to_string(),
                arguments: r#"{"input":"revenue"}"#.to_string(),
            }]),
            ChatMessage::tool_result("call_1", "$17.4B"),
        ];
        let tools = vec![ToolSpec {
            name: "vector_index_2021".to_string(),
            description: "2021 filing".to_string(),
            parameters: json!({"type": "object"}),
        }];

        let json = serde_json::to_value(client.build_request(&messages, &tools)).unwrap();

        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json["messages"][1]["content"].is_null());
        assert_eq!(json["messages"][1]["tool_calls"][0]["type"], "function");
        assert_eq!(json["messages"][1]["tool_calls"][0]["function"]["name"], "vector_index_2021");
        assert_eq!(json["messages"][2]["tool_call_id"], "call_1");
        assert_eq!(json["tools"][0]["function"]["name"], "vector_index_2021");
        assert_eq!(json["tool_choice"], "auto");
    }

    #[test]
    fn test_plain_request_omits_tools() {
        let client = client(LlmEndpoint::OpenAi {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
        });
        let messages = vec![ChatMessage::user("hi")];
        let json = serde_json::to_value(client.build_request(&messages, &[])).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("tool_choice").is_none());
    }

    #[tokio::test]
    async fn test_chat_parses_tool_calls_and_sends_key() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|headers: HeaderMap, Json(_body): Json<Value>| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some("Bearer sk-test");
                let name = if authorized { "vector_index_2022" } else { "unauthorized" };
                Json(json!({
                    "choices": [{
                        "finish_reason": "tool_calls",
                        "message": {
                            "role": "assistant",
                            "content": null,
                            "tool_calls": [{
                                "id": "call_9",
                                "type": "function",
                                "function": { "name": name, "arguments": "{\"input\":\"risks\"}" }
                            }]
                        }
                    }]
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let client = client(LlmEndpoint::OpenAi {
            base_url: format!("http://{}/v1", addr),
            api_key: Some("sk-test".to_string()),
        });
        let reply = client.chat(&[ChatMessage::user("risks?")], &[]).await.unwrap();

        assert_eq!(reply.role, ChatRole::Assistant);
        assert!(reply.content.is_empty());
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].name, "vector_index_2022");
        assert_eq!(reply.tool_calls[0].arguments, r#"{"input":"risks"}"#);
    }

    #[tokio::test]
    async fn test_error_status_is_llm_error() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (axum::http::StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let client = client(LlmEndpoint::OpenAi {
            base_url: format!("http://{}/v1", addr),
            api_key: None,
        });
        let err = client.complete("hello").await.unwrap_err();
        assert!(matches!(err, AgentError::LlmError(_)));
    }
}
