//! Anthropic Messages API provider.
//!
//! Speaks the native `/v1/messages` protocol: system prompt carried
//! out-of-band, content as typed blocks, tool results sent back as user
//! messages. Streaming uses SSE with per-block start/delta/stop events.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use clawsmith_core::error::ProviderError;
use clawsmith_core::message::{FinishReason, TokenUsage};
use clawsmith_core::provider::{
    Provider, ProviderRequest, StreamChunk, StreamReceiver, ToolDefinition, WireMessage,
    WireRole,
};

const API_VERSION: &str = "2023-06-01";

/// Anthropic requires `max_tokens` on every request.
const DEFAULT_MAX_TOKENS: u32 = 8192;

pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    pub fn anthropic(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("https://api.anthropic.com", api_key)
    }

    /// Split a conversation into the out-of-band system prompt and the
    /// typed-block message list the Messages API expects.
    fn to_api_messages(messages: &[WireMessage]) -> (String, Vec<ApiMessage>) {
        let mut system = String::new();
        let mut out: Vec<ApiMessage> = Vec::new();

        for m in messages {
            match m.role {
                WireRole::System => {
                    if !system.is_empty() {
                        system.push_str("\n\n");
                    }
                    system.push_str(&m.content);
                }
                WireRole::User => out.push(ApiMessage {
                    role: "user".into(),
                    content: vec![ApiBlock::Text {
                        text: m.content.clone(),
                    }],
                }),
                WireRole::Assistant => {
                    let mut content = Vec::new();
                    if !m.content.is_empty() {
                        content.push(ApiBlock::Text {
                            text: m.content.clone(),
                        });
                    }
                    for tc in &m.tool_calls {
                        content.push(ApiBlock::ToolUse {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            input: serde_json::from_str(&tc.arguments)
                                .unwrap_or_else(|_| serde_json::json!({})),
                        });
                    }
                    out.push(ApiMessage {
                        role: "assistant".into(),
                        content,
                    });
                }
                // Tool results travel as user messages with a
                // tool_result block referencing the originating call.
                WireRole::Tool => out.push(ApiMessage {
                    role: "user".into(),
                    content: vec![ApiBlock::ToolResult {
                        tool_use_id: m.tool_call_id.clone().unwrap_or_default(),
                        content: m.content.clone(),
                    }],
                }),
            }
        }

        (system, out)
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiTool> {
        tools
            .iter()
            .map(|t| ApiTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<StreamReceiver, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let (system, messages) = Self::to_api_messages(&request.messages);

        let mut body = serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": messages,
            "temperature": request.temperature,
            "stream": true,
        });
        if !system.is_empty() {
            body["system"] = serde_json::json!(system);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(provider = "anthropic", model = %request.model, "sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ProviderError::RateLimited { retry_after_secs });
        }
        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "invalid API key or insufficient permissions".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Read the SSE byte stream and translate each event.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut parser = EventParser::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete lines only; partial lines wait for
                // the next network chunk.
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    // The event name is repeated in the payload's
                    // `type` field, so `event:` lines carry nothing.
                    if line.is_empty() || line.starts_with(':') || line.starts_with("event:") {
                        continue;
                    }
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };

                    match serde_json::from_str::<ApiEvent>(data.trim()) {
                        Ok(event) => {
                            for chunk in parser.translate(event) {
                                if tx.send(Ok(chunk)).await.is_err() {
                                    return; // receiver dropped
                                }
                            }
                        }
                        Err(e) => {
                            trace!(
                                provider = "anthropic",
                                data = %data,
                                error = %e,
                                "ignoring unparseable SSE event"
                            );
                        }
                    }
                }
            }

            // Stream ended without a message_stop event.
            if let Some(chunk) = parser.close() {
                let _ = tx.send(Ok(chunk)).await;
            }
        });

        Ok(rx)
    }
}

/// Translates Messages API events into tagged stream chunks, holding the
/// state the protocol spreads across events: the block-index-to-call-id
/// mapping for argument deltas, the announced stop reason, and the usage
/// counters split between message_start and message_delta.
#[derive(Default)]
struct EventParser {
    /// block index -> tool call id.
    calls: HashMap<u32, String>,
    stop_reason: Option<String>,
    input_tokens: u32,
    output_tokens: u32,
    done: bool,
}

impl EventParser {
    fn translate(&mut self, event: ApiEvent) -> Vec<StreamChunk> {
        let mut out = Vec::new();

        match event {
            ApiEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.input_tokens = usage.input_tokens.unwrap_or(0);
                }
            }
            ApiEvent::ContentBlockStart {
                index,
                content_block: ApiBlockStart::ToolUse { id, name },
            } => {
                self.calls.insert(index, id.clone());
                out.push(StreamChunk::ToolCall { id, name });
            }
            ApiEvent::ContentBlockStart { .. } => {}
            ApiEvent::ContentBlockDelta { index, delta } => match delta {
                ApiDelta::TextDelta { text } if !text.is_empty() => {
                    out.push(StreamChunk::Text { content: text });
                }
                ApiDelta::InputJsonDelta { partial_json } if !partial_json.is_empty() => {
                    if let Some(id) = self.calls.get(&index) {
                        out.push(StreamChunk::ToolCallDelta {
                            id: id.clone(),
                            args_delta: partial_json,
                        });
                    }
                }
                _ => {}
            },
            ApiEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason {
                    self.stop_reason = Some(reason);
                }
                if let Some(usage) = usage {
                    self.output_tokens = usage.output_tokens.unwrap_or(0);
                }
            }
            ApiEvent::MessageStop => {
                if let Some(chunk) = self.close() {
                    out.push(chunk);
                }
            }
            ApiEvent::Error { error } => {
                out.push(StreamChunk::Error {
                    message: error.message,
                });
            }
            ApiEvent::Other => {}
        }

        out
    }

    /// The final chunk, once. Returns `None` after the stop was emitted.
    fn close(&mut self) -> Option<StreamChunk> {
        if self.done {
            return None;
        }
        self.done = true;
        let reason = match self.stop_reason.as_deref() {
            Some("tool_use") => FinishReason::ToolCalls,
            _ => FinishReason::Stop,
        };
        Some(StreamChunk::Finish {
            reason,
            usage: Some(TokenUsage {
                input: self.input_tokens,
                output: self.output_tokens,
                total: self.input_tokens + self.output_tokens,
            }),
        })
    }
}

// --- Messages API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: Vec<ApiBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

/// A single SSE `data: {...}` event from a streaming response.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiEvent {
    MessageStart {
        message: ApiMessageStart,
    },
    ContentBlockStart {
        index: u32,
        content_block: ApiBlockStart,
    },
    ContentBlockDelta {
        index: u32,
        delta: ApiDelta,
    },
    MessageDelta {
        delta: ApiStopDelta,
        #[serde(default)]
        usage: Option<ApiUsage>,
    },
    MessageStop,
    Error {
        error: ApiError,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiMessageStart {
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiBlockStart {
    ToolUse { id: String, name: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiStopDelta {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: Option<u32>,
    #[serde(default)]
    output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawsmith_core::provider::WireToolCall;

    fn event(data: &str) -> ApiEvent {
        serde_json::from_str(data).unwrap()
    }

    #[test]
    fn system_prompt_is_separated_from_messages() {
        let messages = vec![
            WireMessage::system("You are helpful"),
            WireMessage::user("Hello"),
        ];
        let (system, api) = AnthropicProvider::to_api_messages(&messages);
        assert_eq!(system, "You are helpful");
        assert_eq!(api.len(), 1);
        assert_eq!(api[0].role, "user");
    }

    #[test]
    fn tool_results_become_user_messages() {
        let messages = vec![WireMessage::tool_result("toolu_1", "file contents")];
        let (_, api) = AnthropicProvider::to_api_messages(&messages);
        assert_eq!(api[0].role, "user");
        match &api[0].content[0] {
            ApiBlock::ToolResult {
                tool_use_id,
                content,
            } => {
                assert_eq!(tool_use_id, "toolu_1");
                assert_eq!(content, "file contents");
            }
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[test]
    fn assistant_tool_calls_become_tool_use_blocks() {
        let messages = vec![WireMessage::assistant(
            "Let me read that",
            vec![WireToolCall {
                id: "toolu_1".into(),
                name: "read".into(),
                arguments: r#"{"file_path": "a.txt"}"#.into(),
            }],
        )];
        let (_, api) = AnthropicProvider::to_api_messages(&messages);
        assert_eq!(api[0].content.len(), 2);
        match &api[0].content[1] {
            ApiBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "toolu_1");
                assert_eq!(name, "read");
                assert_eq!(input["file_path"], "a.txt");
            }
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[test]
    fn tool_definition_uses_input_schema() {
        let tools = vec![ToolDefinition {
            name: "bash".into(),
            description: "Run a shell command".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let api = AnthropicProvider::to_api_tools(&tools);
        assert_eq!(api[0].name, "bash");
        assert_eq!(api[0].input_schema["type"], "object");
    }

    #[test]
    fn text_deltas_become_text_chunks() {
        let mut parser = EventParser::default();
        let chunks = parser.translate(event(
            r#"{"type": "content_block_delta", "index": 0,
                "delta": {"type": "text_delta", "text": "Hel"}}"#,
        ));
        assert!(matches!(
            &chunks[0],
            StreamChunk::Text { content } if content == "Hel"
        ));
    }

    #[test]
    fn tool_use_block_opens_then_streams_arguments() {
        let mut parser = EventParser::default();
        let open = parser.translate(event(
            r#"{"type": "content_block_start", "index": 1,
                "content_block": {"type": "tool_use", "id": "toolu_1", "name": "read"}}"#,
        ));
        assert!(matches!(
            &open[0],
            StreamChunk::ToolCall { id, name } if id == "toolu_1" && name == "read"
        ));

        let delta = parser.translate(event(
            r#"{"type": "content_block_delta", "index": 1,
                "delta": {"type": "input_json_delta", "partial_json": "{\"file"}}"#,
        ));
        assert!(matches!(
            &delta[0],
            StreamChunk::ToolCallDelta { id, args_delta }
                if id == "toolu_1" && args_delta == "{\"file"
        ));
    }

    #[test]
    fn stop_reason_and_usage_fold_into_finish_chunk() {
        let mut parser = EventParser::default();
        parser.translate(event(
            r#"{"type": "message_start",
                "message": {"usage": {"input_tokens": 10}}}"#,
        ));
        parser.translate(event(
            r#"{"type": "message_delta",
                "delta": {"stop_reason": "tool_use"},
                "usage": {"output_tokens": 4}}"#,
        ));
        let chunks = parser.translate(event(r#"{"type": "message_stop"}"#));
        match &chunks[0] {
            StreamChunk::Finish { reason, usage } => {
                assert_eq!(*reason, FinishReason::ToolCalls);
                let usage = usage.as_ref().unwrap();
                assert_eq!(usage.input, 10);
                assert_eq!(usage.output, 4);
                assert_eq!(usage.total, 14);
            }
            other => panic!("unexpected chunk: {other:?}"),
        }
    }

    #[test]
    fn finish_is_emitted_once() {
        let mut parser = EventParser::default();
        let first = parser.translate(event(r#"{"type": "message_stop"}"#));
        assert_eq!(first.len(), 1);
        assert!(parser.close().is_none());
    }

    #[test]
    fn error_events_surface_as_error_chunks() {
        let mut parser = EventParser::default();
        let chunks = parser.translate(event(
            r#"{"type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}}"#,
        ));
        assert!(matches!(
            &chunks[0],
            StreamChunk::Error { message } if message == "Overloaded"
        ));
    }

    #[test]
    fn unknown_events_are_ignored() {
        let mut parser = EventParser::default();
        assert!(parser.translate(event(r#"{"type": "ping"}"#)).is_empty());
    }
}
