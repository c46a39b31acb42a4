//! Provider trait — the abstraction over LLM backends.
//!
//! A provider knows how to send a conversation to a model and stream the
//! response back as a forward-only sequence of tagged chunks. The agent
//! loop consumes that sequence without knowing which backend produced it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{FinishReason, TokenUsage};

/// Role of a wire-format message sent to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call embedded in an assistant wire message, arguments as a
/// JSON-encoded string (the provider protocol's shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// A role-tagged message in provider wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: WireRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<WireToolCall>,
    /// For `role = tool`: the call this result responds to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl WireMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: WireRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<WireToolCall>) -> Self {
        Self {
            role: WireRole::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: WireRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool parameters.
    pub parameters: serde_json::Value,
}

/// One event in a streaming response.
///
/// Chunks are produced in a single forward pass and never replayed out of
/// order. They are ephemeral: nothing here is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// A fragment of assistant text.
    Text { content: String },
    /// A new tool call was opened; argument fragments follow as deltas.
    ToolCall { id: String, name: String },
    /// A raw fragment of the JSON argument string for an open tool call.
    ToolCallDelta { id: String, args_delta: String },
    /// The stream finished normally.
    Finish {
        reason: FinishReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
    /// An error surfaced mid-stream (retry notices included).
    Error { message: String },
}

/// A request for one streaming model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// `provider/model` or bare model identifier.
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// The receiver half of a provider stream.
pub type StreamReceiver =
    tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>;

/// The core provider trait.
///
/// Every model backend implements this. The stream is finite,
/// forward-only, and terminates with a `Finish` chunk or an error.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable backend name (e.g. "openai", "deepseek").
    fn name(&self) -> &str;

    /// Start a streaming call and return the chunk receiver.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<StreamReceiver, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_chunk_serialization() {
        let chunk = StreamChunk::ToolCallDelta {
            id: "call_1".into(),
            args_delta: r#"{"file"#.into(),
        };
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains(r#""type":"tool_call_delta""#));

        let finish = StreamChunk::Finish {
            reason: FinishReason::ToolCalls,
            usage: Some(TokenUsage {
                input: 10,
                output: 5,
                total: 15,
            }),
        };
        let json = serde_json::to_string(&finish).unwrap();
        assert!(json.contains(r#""reason":"tool_calls""#));
    }

    #[test]
    fn tool_result_message_carries_call_id() {
        let msg = WireMessage::tool_result("call_9", "output text");
        assert_eq!(msg.role, WireRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_9"));
    }
}
