use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::stream::StreamEvent;

/// A single message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Tool definition sent to the LLM API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl From<picoclaw_skills::ToolDefinition> for ToolDefinition {
    fn from(d: picoclaw_skills::ToolDefinition) -> Self {
        Self {
            name: d.name,
            description: d.description,
            input_schema: d.parameter_schema,
        }
    }
}

/// A tool call extracted from the LLM response — either top-level or
/// nested under a `function` field (spec.md §4.5), normalized here so
/// downstream code never cares which shape the provider emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Request to an LLM provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub tools: Vec<ToolDefinition>,
    /// Raw JSON messages for the tool loop (overrides `messages` when
    /// set). Lets the loop build structured content blocks (tool_use,
    /// tool_result) that can't be represented as plain strings.
    pub raw_messages: Option<Vec<serde_json::Value>>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            messages: Vec::new(),
            max_tokens: 4096,
            temperature: 0.7,
            tools: Vec::new(),
            raw_messages: None,
        }
    }
}

/// Response from an LLM provider (non-streaming).
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub stop_reason: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ChatResponse {
    pub fn wants_tool_use(&self) -> bool {
        !self.tool_calls.is_empty() && self.stop_reason == "tool_use"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    ApiKey,
    OAuth,
    None,
}

#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub token_type: TokenType,
    pub expires_at: Option<i64>,
    pub refreshable: bool,
}

/// Common interface for all LLM providers (spec.md §4.5 — "the
/// language-model endpoint is out of scope, only the interface is
/// specified").
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Stream response events through a channel. Default: falls back to
    /// non-streaming `send`, emitting one `TextDelta` then `Done`.
    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let resp = self.send(req).await?;
        let _ = tx
            .send(StreamEvent::TextDelta {
                text: resp.content.clone(),
            })
            .await;
        for call in resp.tool_calls {
            let _ = tx
                .send(StreamEvent::ToolUse {
                    id: call.id,
                    name: call.name,
                    input: call.input,
                })
                .await;
        }
        let _ = tx
            .send(StreamEvent::Done {
                model: resp.model,
                tokens_in: resp.tokens_in,
                tokens_out: resp.tokens_out,
                stop_reason: resp.stop_reason,
            })
            .await;
        Ok(())
    }

    fn token_info(&self) -> Option<TokenInfo> {
        None
    }

    async fn refresh_auth(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("operation cancelled")]
    Cancelled,
}
