//! The agent loop: drives one conversation turn to completion.
//!
//! A turn appends the user message, then repeats model steps until the
//! model stops requesting tools, an error or interruption ends the turn,
//! or the step budget runs out. Tools execute strictly sequentially in
//! the order the model emitted them; only this loop mutates the session.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use clawsmith_core::{
    AgentConfig, AssistantMessage, FinishReason, Message, PermissionCheck, PermissionError,
    Provider, ProviderRequest, Session, ToolCall, ToolContext, ToolError, ToolRegistry,
    ToolState, WireMessage, WireToolCall,
};

use crate::assembler::{assemble, AssembledResponse, StreamObserver};
use crate::retry::{classify_text, ErrorClass, RetryConfig, RetryGovernor};

/// Identical consecutive tool calls before the loop escalates.
const DOOM_LOOP_THRESHOLD: usize = 3;
/// Seconds between "still running" heartbeat logs during a tool call.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// What to do after a model call failed beyond the retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Run the whole governed call again.
    Retry,
    /// Give up on this step but keep what was assembled.
    Skip,
    /// End the turn.
    Abort,
}

/// Asks the user how to proceed after a terminal model-call failure. The
/// CLI implements this against the terminal.
#[async_trait]
pub trait RecoveryPrompt: Send + Sync {
    async fn recover(&self, error: &str) -> RecoveryAction;
}

/// Non-interactive fallback: always abort.
pub struct AbortRecovery;

#[async_trait]
impl RecoveryPrompt for AbortRecovery {
    async fn recover(&self, _error: &str) -> RecoveryAction {
        RecoveryAction::Abort
    }
}

enum StepOutcome {
    Continue,
    Finished(FinishReason),
}

/// Drives conversation turns for one agent against one provider.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    permission: Arc<dyn PermissionCheck>,
    agent: AgentConfig,
    retry: RetryConfig,
    working_dir: PathBuf,
    abort: Arc<AtomicBool>,
    observer: Box<dyn StreamObserver>,
    recovery: Arc<dyn RecoveryPrompt>,
}

impl AgentLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        permission: Arc<dyn PermissionCheck>,
        agent: AgentConfig,
        working_dir: PathBuf,
        abort: Arc<AtomicBool>,
        observer: Box<dyn StreamObserver>,
        recovery: Arc<dyn RecoveryPrompt>,
    ) -> Self {
        Self {
            provider,
            tools,
            permission,
            agent,
            retry: RetryConfig::default(),
            working_dir,
            abort,
            observer,
            recovery,
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Run one turn: append `prompt` as a user message and step until a
    /// terminal finish reason. The caller persists the session afterwards.
    pub async fn run_turn(
        &mut self,
        session: &mut Session,
        prompt: &str,
        model: &str,
    ) -> FinishReason {
        let parent_id = session.push_user(prompt);
        info!(
            session = %session.id,
            agent = %self.agent.name,
            model,
            "turn started"
        );

        for step in 0..self.agent.max_steps {
            if self.abort.load(Ordering::Relaxed) {
                return self.finalize_interrupted(session, &parent_id);
            }
            debug!(step, max = self.agent.max_steps, "agent step");
            match self.run_step(session, &parent_id, model).await {
                StepOutcome::Finished(reason) => {
                    info!(session = %session.id, %reason, "turn finished");
                    return reason;
                }
                StepOutcome::Continue => {}
            }
        }

        // Step budget exhausted.
        if let Some(Message::Assistant(m)) = session.messages.last_mut() {
            m.finish_reason = Some(FinishReason::MaxSteps);
            m.completed_at = Some(chrono::Utc::now());
        }
        warn!(session = %session.id, max_steps = self.agent.max_steps, "step budget exhausted");
        FinishReason::MaxSteps
    }

    async fn run_step(
        &mut self,
        session: &mut Session,
        parent_id: &str,
        model: &str,
    ) -> StepOutcome {
        let request = ProviderRequest {
            model: model.to_string(),
            messages: self.build_wire_messages(session),
            tools: self.tools.definitions(),
            temperature: self.agent.temperature,
            max_tokens: None,
        };

        let idx = session.push_assistant(parent_id);

        let response = match self.stream_with_recovery(request).await {
            Some(response) => response,
            None => {
                // Aborted after a failed model call.
                let msg = assistant_mut(session, idx);
                msg.finish_reason = Some(FinishReason::Aborted);
                msg.completed_at = Some(chrono::Utc::now());
                return StepOutcome::Finished(FinishReason::Aborted);
            }
        };

        let finish = {
            let msg = assistant_mut(session, idx);
            if !response.text.is_empty() {
                msg.add_text(&response.text);
            }
            for call in &response.tool_calls {
                msg.add_tool_call(call.clone());
            }
            if let Some(usage) = response.usage {
                msg.tokens = usage;
            }
            msg.error = response.error.clone();
            msg.finish_reason = Some(response.finish);
            if response.finish != FinishReason::ToolCalls {
                msg.completed_at = Some(chrono::Utc::now());
            }
            response.finish
        };

        if finish != FinishReason::ToolCalls {
            return StepOutcome::Finished(finish);
        }

        if let Some(reason) = self.execute_tools(session, idx, &response.tool_calls).await {
            let msg = assistant_mut(session, idx);
            msg.finish_reason = Some(reason);
            msg.completed_at = Some(chrono::Utc::now());
            return StepOutcome::Finished(reason);
        }

        if self.doom_loop_detected(session) {
            debug!(session = %session.id, "repeated identical tool calls detected");
            if let Err(err) = self
                .permission
                .check("doom_loop", &["*".to_string()], None)
                .await
            {
                warn!(%err, "loop escalation declined, stopping turn");
                let msg = assistant_mut(session, idx);
                msg.finish_reason = Some(FinishReason::Stopped);
                msg.error = Some(err.to_string());
                msg.completed_at = Some(chrono::Utc::now());
                return StepOutcome::Finished(FinishReason::Stopped);
            }
        }

        StepOutcome::Continue
    }

    /// Establish the stream under the retry governor, assemble it, and
    /// retry transient mid-stream failures on the same backoff schedule.
    /// The recovery prompt is consulted only once retries are exhausted
    /// or the failure is fatal. `None` means abort.
    async fn stream_with_recovery(
        &mut self,
        request: ProviderRequest,
    ) -> Option<AssembledResponse> {
        let governor = RetryGovernor::new(self.retry.clone(), self.abort.clone());
        let mut stream_retries = 0u32;
        loop {
            let provider = self.provider.clone();
            let established = governor
                .run(
                    || {
                        let req = request.clone();
                        let provider = provider.clone();
                        async move { provider.stream(req).await }
                    },
                    |attempt, _err, delay| {
                        debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying model call");
                    },
                )
                .await;

            let error = match established {
                Ok(rx) => {
                    let response = assemble(rx, self.observer.as_mut(), &self.abort).await;
                    if response.finish != FinishReason::Error {
                        return Some(response);
                    }
                    match response.error.clone() {
                        Some(message) => {
                            // A mid-stream failure. Transient classes go
                            // back through the backoff schedule first;
                            // recovery is a last resort.
                            let class = classify_text(&message);
                            if class != ErrorClass::Fatal
                                && stream_retries < self.retry.max_retries
                            {
                                let delay = self.retry.delay_for(stream_retries, class);
                                warn!(
                                    attempt = stream_retries + 1,
                                    max = self.retry.max_retries,
                                    delay_ms = delay.as_millis() as u64,
                                    error = %message,
                                    "stream failed mid-flight, backing off"
                                );
                                if !governor.sleep_unless_aborted(delay).await {
                                    return None;
                                }
                                stream_retries += 1;
                                continue;
                            }
                            match self.recovery.recover(&message).await {
                                RecoveryAction::Retry => {
                                    stream_retries = 0;
                                    continue;
                                }
                                RecoveryAction::Skip => return Some(response),
                                RecoveryAction::Abort => return None,
                            }
                        }
                        None => return Some(response),
                    }
                }
                Err(err) => err.to_string(),
            };

            match self.recovery.recover(&error).await {
                RecoveryAction::Retry => continue,
                RecoveryAction::Skip => {
                    return Some(AssembledResponse {
                        text: String::new(),
                        tool_calls: Vec::new(),
                        finish: FinishReason::Error,
                        usage: None,
                        error: Some(error),
                    });
                }
                RecoveryAction::Abort => return None,
            }
        }
    }

    /// Execute assembled tool calls sequentially. Returns a terminal
    /// finish reason when the step must stop (permission denial or
    /// rejection); individual tool failures are recorded and skipped.
    async fn execute_tools(
        &mut self,
        session: &mut Session,
        idx: usize,
        calls: &[ToolCall],
    ) -> Option<FinishReason> {
        let message_id = match &session.messages[idx] {
            Message::Assistant(m) => m.id.clone(),
            Message::User(m) => m.id.clone(),
        };

        for call in calls {
            if self.abort.load(Ordering::Relaxed) {
                return Some(FinishReason::Interrupted);
            }

            let Some(tool) = self.tools.get(&call.tool_name) else {
                warn!(tool = %call.tool_name, "model requested unknown tool");
                assistant_mut(session, idx).update_tool_call(
                    &call.id,
                    ToolState::Error,
                    None,
                    Some(format!("Unknown tool: {}", call.tool_name)),
                );
                continue;
            };

            // Resolve permission before showing the call as running so a
            // prompt never interleaves with execution output.
            let targets = precheck_targets(&call.tool_name, &call.input);
            if !targets.is_empty() {
                match self
                    .permission
                    .check(&call.tool_name, &targets, Some(&call.input))
                    .await
                {
                    Ok(()) => {}
                    Err(err @ PermissionError::Denied { .. }) => {
                        assistant_mut(session, idx).update_tool_call(
                            &call.id,
                            ToolState::Error,
                            None,
                            Some(err.to_string()),
                        );
                        assistant_mut(session, idx).error = Some(err.to_string());
                        return Some(FinishReason::Error);
                    }
                    Err(err @ PermissionError::Rejected { .. }) => {
                        assistant_mut(session, idx).update_tool_call(
                            &call.id,
                            ToolState::Error,
                            None,
                            Some(err.to_string()),
                        );
                        return Some(FinishReason::Stopped);
                    }
                }
            }

            assistant_mut(session, idx).update_tool_call(
                &call.id,
                ToolState::Running,
                None,
                None,
            );

            let mut ctx = ToolContext::new(
                session.id.clone(),
                message_id.clone(),
                self.agent.name.clone(),
                self.working_dir.clone(),
                self.permission.clone(),
            );
            if !targets.is_empty() {
                ctx.preapprove(&call.tool_name, &targets);
            }

            let heartbeat = spawn_heartbeat(call.tool_name.clone());
            let result = tool.execute(&call.input, &mut ctx).await;
            heartbeat.abort();
            let _ = heartbeat.await;

            match result {
                Ok(output) => {
                    debug!(tool = %call.tool_name, "tool completed");
                    assistant_mut(session, idx).update_tool_call(
                        &call.id,
                        ToolState::Completed,
                        Some(output.output),
                        None,
                    );
                }
                Err(ToolError::Permission(err @ PermissionError::Denied { .. })) => {
                    assistant_mut(session, idx).update_tool_call(
                        &call.id,
                        ToolState::Error,
                        None,
                        Some(err.to_string()),
                    );
                    assistant_mut(session, idx).error = Some(err.to_string());
                    return Some(FinishReason::Error);
                }
                Err(ToolError::Permission(err @ PermissionError::Rejected { .. })) => {
                    assistant_mut(session, idx).update_tool_call(
                        &call.id,
                        ToolState::Error,
                        None,
                        Some(err.to_string()),
                    );
                    return Some(FinishReason::Stopped);
                }
                Err(err) => {
                    warn!(tool = %call.tool_name, %err, "tool failed");
                    assistant_mut(session, idx).update_tool_call(
                        &call.id,
                        ToolState::Error,
                        None,
                        Some(err.to_string()),
                    );
                }
            }
        }
        None
    }

    /// Convert the session history to provider wire format: system prompt
    /// first, then messages in order, with each tool result folded back
    /// as a role="tool" entry keyed by call id.
    fn build_wire_messages(&self, session: &Session) -> Vec<WireMessage> {
        let mut wire = Vec::with_capacity(session.messages.len() + 1);
        if let Some(prompt) = &self.agent.system_prompt {
            wire.push(WireMessage::system(prompt.clone()));
        }
        for message in &session.messages {
            match message {
                Message::User(m) => wire.push(WireMessage::user(m.text())),
                Message::Assistant(m) => {
                    let calls: Vec<&ToolCall> = m.tool_calls().collect();
                    let text = m.text();
                    if text.is_empty() && calls.is_empty() {
                        continue;
                    }
                    let wire_calls = calls
                        .iter()
                        .map(|c| WireToolCall {
                            id: c.id.clone(),
                            name: c.tool_name.clone(),
                            arguments: serde_json::Value::Object(c.input.clone()).to_string(),
                        })
                        .collect();
                    wire.push(WireMessage::assistant(text, wire_calls));
                    for call in calls {
                        let content = match (&call.output, &call.error) {
                            (Some(output), _) => output.clone(),
                            (None, Some(error)) => format!("Error: {error}"),
                            (None, None) => continue,
                        };
                        wire.push(WireMessage::tool_result(call.id.clone(), content));
                    }
                }
            }
        }
        wire
    }

    /// True when the last `DOOM_LOOP_THRESHOLD` tool calls across the
    /// whole session are identical (same tool, same canonical arguments).
    fn doom_loop_detected(&self, session: &Session) -> bool {
        let mut recent: Vec<(String, String)> = Vec::with_capacity(DOOM_LOOP_THRESHOLD);
        'outer: for message in session.messages.iter().rev() {
            let Message::Assistant(m) = message else {
                continue;
            };
            for part in m.parts.iter().rev() {
                if let clawsmith_core::Part::Tool { call } = part {
                    recent.push((call.tool_name.clone(), canonical_args(&call.input)));
                    if recent.len() == DOOM_LOOP_THRESHOLD {
                        break 'outer;
                    }
                }
            }
        }
        recent.len() == DOOM_LOOP_THRESHOLD && recent.iter().all(|c| *c == recent[0])
    }

    fn finalize_interrupted(&self, session: &mut Session, parent_id: &str) -> FinishReason {
        match session.messages.last_mut() {
            Some(Message::Assistant(m)) if m.finish_reason.is_none() => {
                m.finish_reason = Some(FinishReason::Interrupted);
                m.completed_at = Some(chrono::Utc::now());
            }
            _ => {
                let idx = session.push_assistant(parent_id);
                let m = assistant_mut(session, idx);
                m.finish_reason = Some(FinishReason::Interrupted);
                m.completed_at = Some(chrono::Utc::now());
            }
        }
        info!(session = %session.id, "turn interrupted");
        FinishReason::Interrupted
    }
}

/// Arguments are canonicalized with sorted keys so two calls compare
/// equal regardless of emission order.
fn canonical_args(input: &serde_json::Map<String, serde_json::Value>) -> String {
    serde_json::Value::Object(input.clone()).to_string()
}

/// The target to pre-authorize for each builtin tool. Tools without an
/// entry are checked only by their own internal `ask_permission`.
fn precheck_targets(
    tool_name: &str,
    input: &serde_json::Map<String, serde_json::Value>,
) -> Vec<String> {
    let field = match tool_name {
        "bash" => "command",
        "edit" | "read" => "file_path",
        "list" => "path",
        "glob" => "pattern",
        _ => return Vec::new(),
    };
    input
        .get(field)
        .and_then(|v| v.as_str())
        .map(|s| vec![s.to_string()])
        .unwrap_or_default()
}

fn assistant_mut(session: &mut Session, idx: usize) -> &mut AssistantMessage {
    match &mut session.messages[idx] {
        Message::Assistant(m) => m,
        // push_assistant handed out this index; the slot cannot change role.
        Message::User(_) => unreachable!("index does not point at an assistant message"),
    }
}

fn spawn_heartbeat(tool_name: String) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut elapsed = 0u64;
        loop {
            tokio::time::sleep(HEARTBEAT_INTERVAL).await;
            elapsed += HEARTBEAT_INTERVAL.as_secs();
            debug!(tool = %tool_name, elapsed_secs = elapsed, "tool still running");
        }
    })
}
