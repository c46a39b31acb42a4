//! Streaming response assembler.
//!
//! Consumes a provider chunk stream and folds it into a complete step
//! result: the full assistant text, the ordered tool calls with parsed
//! arguments, the finish reason and token usage. Text fragments are
//! forwarded to an observer as they arrive so the caller can render
//! incrementally; the assembler itself never touches the terminal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use clawsmith_core::{FinishReason, StreamChunk, StreamReceiver, TokenUsage, ToolCall};

use crate::retry::STREAM_IDLE_TIMEOUT;

/// Receives stream events as they arrive. Implementations render to the
/// terminal; [`NullObserver`] discards everything.
pub trait StreamObserver: Send {
    fn on_text(&mut self, _fragment: &str) {}
    fn on_tool_call(&mut self, _id: &str, _name: &str) {}
    fn on_tool_call_delta(&mut self, _id: &str, _name: &str, _args_delta: &str) {}
    fn on_error(&mut self, _message: &str) {}
}

/// Observer that ignores all events.
pub struct NullObserver;

impl StreamObserver for NullObserver {}

/// A tool call in flight: raw argument fragments accumulate until the
/// stream finishes.
struct PendingCall {
    id: String,
    name: String,
    args: String,
}

/// The folded result of one streamed model step.
#[derive(Debug)]
pub struct AssembledResponse {
    pub text: String,
    /// Pending-state calls in emission order, arguments parsed.
    pub tool_calls: Vec<ToolCall>,
    pub finish: FinishReason,
    pub usage: Option<TokenUsage>,
    /// Set when the stream ended on an error; accumulated text and calls
    /// above are still valid up to that point.
    pub error: Option<String>,
}

/// Consume `rx` to completion and fold the chunks.
///
/// A 60s gap between chunks counts as a transient timeout and ends the
/// stream with finish reason `Error`. An abort flag raised mid-stream
/// ends it with `Interrupted`. If the provider reported "stop" but tool
/// calls were assembled, the finish reason is corrected to "tool_calls".
pub async fn assemble(
    mut rx: StreamReceiver,
    observer: &mut dyn StreamObserver,
    abort: &AtomicBool,
) -> AssembledResponse {
    let mut text = String::new();
    let mut pending: Vec<PendingCall> = Vec::new();
    let mut finish = FinishReason::Error;
    let mut usage = None;
    let mut error = None;

    loop {
        let item = match next_chunk(&mut rx, abort).await {
            Wait::Aborted => {
                finish = FinishReason::Interrupted;
                break;
            }
            Wait::Item(Some(item)) => item,
            Wait::Item(None) => {
                // Channel closed without a Finish chunk.
                error = Some("stream ended unexpectedly".to_string());
                break;
            }
            Wait::Idle => {
                error = Some(format!(
                    "stream timeout: no data for {}s",
                    STREAM_IDLE_TIMEOUT.as_secs()
                ));
                break;
            }
        };
        match item {
            Ok(StreamChunk::Text { content }) => {
                observer.on_text(&content);
                text.push_str(&content);
            }
            Ok(StreamChunk::ToolCall { id, name }) => {
                observer.on_tool_call(&id, &name);
                pending.push(PendingCall {
                    id,
                    name,
                    args: String::new(),
                });
            }
            Ok(StreamChunk::ToolCallDelta { id, args_delta }) => {
                match pending.iter_mut().find(|c| c.id == id) {
                    Some(call) => {
                        observer.on_tool_call_delta(&call.id, &call.name, &args_delta);
                        call.args.push_str(&args_delta);
                    }
                    // A delta for an id that was never opened is dropped.
                    None => debug!(%id, "argument delta for unregistered tool call"),
                }
            }
            Ok(StreamChunk::Finish {
                reason,
                usage: reported,
            }) => {
                finish = reason;
                usage = reported;
                break;
            }
            Ok(StreamChunk::Error { message }) => {
                observer.on_error(&message);
                error = Some(message);
                break;
            }
            Err(err) => {
                let message = err.to_string();
                observer.on_error(&message);
                error = Some(message);
                break;
            }
        }
    }

    let tool_calls: Vec<ToolCall> = pending.into_iter().map(finalize_call).collect();
    if finish == FinishReason::Stop && !tool_calls.is_empty() {
        finish = FinishReason::ToolCalls;
    }

    AssembledResponse {
        text,
        tool_calls,
        finish,
        usage,
        error,
    }
}

enum Wait {
    Item(Option<Result<StreamChunk, clawsmith_core::ProviderError>>),
    Idle,
    Aborted,
}

/// Wait for the next chunk, the idle deadline, or an abort. The wait is
/// sliced so a raised abort flag takes effect within ~100ms even while
/// the stream is stalled.
async fn next_chunk(rx: &mut StreamReceiver, abort: &AtomicBool) -> Wait {
    const ABORT_POLL: Duration = Duration::from_millis(100);
    let deadline = tokio::time::Instant::now() + STREAM_IDLE_TIMEOUT;
    loop {
        if abort.load(Ordering::Relaxed) {
            return Wait::Aborted;
        }
        match tokio::time::timeout(ABORT_POLL, rx.recv()).await {
            Ok(item) => return Wait::Item(item),
            Err(_) if tokio::time::Instant::now() >= deadline => return Wait::Idle,
            Err(_) => {}
        }
    }
}

/// Parse the accumulated argument string. A malformed payload degrades to
/// `{"raw": <string>}` so the tool can still see what the model sent.
fn finalize_call(call: PendingCall) -> ToolCall {
    let mut out = ToolCall::with_id(call.id, call.name);
    if call.args.trim().is_empty() {
        return out;
    }
    match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&call.args) {
        Ok(map) => out.input = map,
        Err(err) => {
            warn!(
                tool = %out.tool_name,
                %err,
                "tool arguments are not valid JSON, wrapping as raw"
            );
            out.input.insert(
                "raw".to_string(),
                serde_json::Value::String(call.args),
            );
        }
    }
    out
}
