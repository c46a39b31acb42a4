//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, DeepSeek, OpenRouter, Ollama, vLLM and any other
//! endpoint exposing `/v1/chat/completions` with SSE streaming and
//! function calling.

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

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    pub fn openai(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    pub fn deepseek(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("deepseek", "https://api.deepseek.com/v1", api_key)
    }

    /// Convert wire messages to the raw API shape.
    fn to_api_messages(messages: &[WireMessage]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    WireRole::System => "system".into(),
                    WireRole::User => "user".into(),
                    WireRole::Assistant => "assistant".into(),
                    WireRole::Tool => "tool".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: ProviderRequest) -> Result<StreamReceiver, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": true,
            "stream_options": { "include_usage": true },
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(provider = %self.name, model = %request.model, "sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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
        let provider_name = self.name.clone();

        // Read the SSE byte stream and translate each event.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut parser = SseParser::default();

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

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        let _ = tx.send(Ok(parser.finish())).await;
                        return;
                    }

                    match serde_json::from_str::<StreamResponse>(data) {
                        Ok(resp) => {
                            for chunk in parser.translate(resp) {
                                if tx.send(Ok(chunk)).await.is_err() {
                                    return; // receiver dropped
                                }
                            }
                        }
                        Err(e) => {
                            trace!(
                                provider = %provider_name,
                                data = %data,
                                error = %e,
                                "ignoring unparseable SSE chunk"
                            );
                        }
                    }
                }
            }

            // Stream ended without [DONE].
            let _ = tx.send(Ok(parser.finish())).await;
        });

        Ok(rx)
    }
}

/// Translates parsed SSE events into tagged stream chunks, holding the
/// state the protocol spreads across events: the index-to-id mapping
/// for tool call deltas, the announced finish reason, and usage.
#[derive(Default)]
struct SseParser {
    /// index -> (id, whether the open chunk was emitted).
    calls: HashMap<u32, (String, bool)>,
    finish: Option<FinishReason>,
    usage: Option<TokenUsage>,
}

impl SseParser {
    fn translate(&mut self, resp: StreamResponse) -> Vec<StreamChunk> {
        let mut out = Vec::new();

        if let Some(usage) = resp.usage {
            self.usage = Some(TokenUsage {
                input: usage.prompt_tokens,
                output: usage.completion_tokens,
                total: usage.total_tokens,
            });
        }

        let Some(choice) = resp.choices.into_iter().next() else {
            return out;
        };

        if let Some(content) = choice.delta.content
            && !content.is_empty()
        {
            out.push(StreamChunk::Text { content });
        }

        for tc in choice.delta.tool_calls.unwrap_or_default() {
            let entry = self
                .calls
                .entry(tc.index)
                .or_insert_with(|| (String::new(), false));
            if let Some(id) = tc.id {
                entry.0 = id;
            }
            if let Some(function) = tc.function {
                if let Some(name) = function.name
                    && !entry.1
                    && !entry.0.is_empty()
                {
                    entry.1 = true;
                    out.push(StreamChunk::ToolCall {
                        id: entry.0.clone(),
                        name,
                    });
                }
                if let Some(args) = function.arguments
                    && !args.is_empty()
                    && entry.1
                {
                    out.push(StreamChunk::ToolCallDelta {
                        id: entry.0.clone(),
                        args_delta: args,
                    });
                }
            }
        }

        if let Some(reason) = choice.finish_reason {
            self.finish = Some(match reason.as_str() {
                "tool_calls" | "function_call" => FinishReason::ToolCalls,
                _ => FinishReason::Stop,
            });
        }

        out
    }

    fn finish(&mut self) -> StreamChunk {
        StreamChunk::Finish {
            reason: self.finish.take().unwrap_or(FinishReason::Stop),
            usage: self.usage.take(),
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// A single SSE `data: {...}` event from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta — arrives incrementally across events.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> StreamResponse {
        serde_json::from_str(data).unwrap()
    }

    #[test]
    fn message_conversion() {
        let messages = vec![
            WireMessage::system("You are helpful"),
            WireMessage::user("Hello"),
            WireMessage::tool_result("call_1", "ok"),
        ];
        let api = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api.len(), 3);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[1].role, "user");
        assert_eq!(api[2].role, "tool");
        assert_eq!(api[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "bash".into(),
            description: "Run a shell command".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let api = OpenAiCompatProvider::to_api_tools(&tools);
        assert_eq!(api[0].r#type, "function");
        assert_eq!(api[0].function.name, "bash");
    }

    #[test]
    fn content_deltas_become_text_chunks() {
        let mut parser = SseParser::default();
        let chunks = parser.translate(event(
            r#"{"choices": [{"delta": {"content": "Hel"}}]}"#,
        ));
        assert!(matches!(
            &chunks[0],
            StreamChunk::Text { content } if content == "Hel"
        ));
    }

    #[test]
    fn tool_call_open_then_deltas() {
        let mut parser = SseParser::default();
        let open = parser.translate(event(
            r#"{"choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "call_1",
                 "function": {"name": "read", "arguments": ""}}]}}]}"#,
        ));
        assert!(matches!(
            &open[0],
            StreamChunk::ToolCall { id, name } if id == "call_1" && name == "read"
        ));

        let delta = parser.translate(event(
            r#"{"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "{\"file"}}]}}]}"#,
        ));
        assert!(matches!(
            &delta[0],
            StreamChunk::ToolCallDelta { id, args_delta }
                if id == "call_1" && args_delta == "{\"file"
        ));
    }

    #[test]
    fn finish_reason_and_usage_fold_into_finish_chunk() {
        let mut parser = SseParser::default();
        parser.translate(event(
            r#"{"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}"#,
        ));
        parser.translate(event(
            r#"{"choices": [],
                "usage": {"prompt_tokens": 10, "completion_tokens": 4, "total_tokens": 14}}"#,
        ));
        match parser.finish() {
            StreamChunk::Finish { reason, usage } => {
                assert_eq!(reason, FinishReason::ToolCalls);
                assert_eq!(usage.unwrap().total, 14);
            }
            other => panic!("unexpected chunk: {other:?}"),
        }
    }

    #[test]
    fn stream_without_finish_reason_defaults_to_stop() {
        let mut parser = SseParser::default();
        match parser.finish() {
            StreamChunk::Finish { reason, .. } => assert_eq!(reason, FinishReason::Stop),
            other => panic!("unexpected chunk: {other:?}"),
        }
    }
}
