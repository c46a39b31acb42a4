//! Message domain types.
//!
//! A conversation is an ordered sequence of messages. User messages carry
//! text parts; assistant messages carry an ordered mix of text, tool-call
//! and reasoning parts. Part order is display and replay order and is
//! never rearranged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a prefixed unique id, e.g. `msg_3f2a…` or `call_91bc…`.
pub fn generate_id(prefix: &str) -> String {
    if prefix.is_empty() {
        Uuid::new_v4().simple().to_string()
    } else {
        format!("{}_{}", prefix, Uuid::new_v4().simple())
    }
}

/// Terminal classification of a step or turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model produced a final text answer.
    Stop,
    /// The model requested tool execution; the loop continues.
    ToolCalls,
    /// An unrecoverable error ended the step.
    Error,
    /// The user declined to continue (permission rejection, doom loop).
    Stopped,
    /// External interrupt (Ctrl+C) ended the turn.
    Interrupted,
    /// The user chose to abort after a failed model call.
    Aborted,
    /// The step counter reached the configured maximum.
    MaxSteps,
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stop => "stop",
            Self::ToolCalls => "tool_calls",
            Self::Error => "error",
            Self::Stopped => "stopped",
            Self::Interrupted => "interrupted",
            Self::Aborted => "aborted",
            Self::MaxSteps => "max_steps",
        };
        write!(f, "{s}")
    }
}

/// Token usage for a single assistant message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
    pub total: u32,
}

/// Lifecycle state of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolState {
    Pending,
    Running,
    Completed,
    Error,
}

/// A tool invocation requested by the model.
///
/// Owned by the assistant message's tool part that created it; only the
/// agent loop and the tool execution context mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool_name: String,
    pub input: serde_json::Map<String, serde_json::Value>,
    pub state: ToolState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            id: generate_id("call"),
            tool_name: tool_name.into(),
            input: serde_json::Map::new(),
            state: ToolState::Pending,
            output: None,
            error: None,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn with_id(id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::new(tool_name)
        }
    }
}

/// One segment of a message. Order within a message is significant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
        /// True when the text was produced by the system, not the model.
        #[serde(default)]
        synthetic: bool,
    },
    Tool {
        call: ToolCall,
    },
    Reasoning {
        text: String,
    },
}

/// A message authored by the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessage {
    pub id: String,
    pub session_id: String,
    pub agent: String,
    /// `provider/model` the turn was addressed to.
    pub model: String,
    pub parts: Vec<Part>,
    pub created_at: DateTime<Utc>,
}

impl UserMessage {
    pub fn new(
        session_id: impl Into<String>,
        agent: impl Into<String>,
        model: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_id("msg"),
            session_id: session_id.into(),
            agent: agent.into(),
            model: model.into(),
            parts: vec![Part::Text {
                text: text.into(),
                synthetic: false,
            }],
            created_at: Utc::now(),
        }
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A message authored by the assistant during one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub id: String,
    pub session_id: String,
    /// Id of the user message this step responds to.
    pub parent_id: String,
    pub agent: String,
    pub model: String,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub tokens: TokenUsage,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AssistantMessage {
    pub fn new(
        session_id: impl Into<String>,
        parent_id: impl Into<String>,
        agent: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_id("msg"),
            session_id: session_id.into(),
            parent_id: parent_id.into(),
            agent: agent.into(),
            model: model.into(),
            parts: Vec::new(),
            finish_reason: None,
            error: None,
            tokens: TokenUsage::default(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Append streamed text, merging into the existing model-authored text
    /// part if one already exists.
    pub fn add_text(&mut self, text: &str) {
        for part in &mut self.parts {
            if let Part::Text {
                text: existing,
                synthetic: false,
            } = part
            {
                existing.push_str(text);
                return;
            }
        }
        self.parts.push(Part::Text {
            text: text.to_string(),
            synthetic: false,
        });
    }

    /// Append a tool-call part.
    pub fn add_tool_call(&mut self, call: ToolCall) {
        self.parts.push(Part::Tool { call });
    }

    /// Update the tool call with the given id, stamping start/end times
    /// on the running/settled transitions.
    pub fn update_tool_call(
        &mut self,
        call_id: &str,
        state: ToolState,
        output: Option<String>,
        error: Option<String>,
    ) {
        for part in &mut self.parts {
            if let Part::Tool { call } = part
                && call.id == call_id
            {
                call.state = state;
                call.output = output;
                call.error = error;
                match state {
                    ToolState::Running => call.started_at = Some(Utc::now()),
                    ToolState::Completed | ToolState::Error => {
                        call.ended_at = Some(Utc::now())
                    }
                    ToolState::Pending => {}
                }
                return;
            }
        }
    }

    /// Concatenated text of all model-authored text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<String>()
    }

    /// Tool calls in emission order.
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.parts.iter().filter_map(|p| match p {
            Part::Tool { call } => Some(call),
            _ => None,
        })
    }
}

/// A message in a session, tagged by author role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
}

impl Message {
    pub fn id(&self) -> &str {
        match self {
            Self::User(m) => &m.id,
            Self::Assistant(m) => &m.id,
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Self::Assistant(m) => Some(m),
            Self::User(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_prefixed_and_unique() {
        let a = generate_id("msg");
        let b = generate_id("msg");
        assert!(a.starts_with("msg_"));
        assert_ne!(a, b);
    }

    #[test]
    fn add_text_merges_into_existing_part() {
        let mut msg = AssistantMessage::new("s", "p", "build", "openai/gpt-4o");
        msg.add_text("Hello");
        msg.add_text(", world");
        assert_eq!(msg.parts.len(), 1);
        assert_eq!(msg.text(), "Hello, world");
    }

    #[test]
    fn add_text_does_not_merge_into_synthetic_part() {
        let mut msg = AssistantMessage::new("s", "p", "build", "openai/gpt-4o");
        msg.parts.push(Part::Text {
            text: "[system note]".into(),
            synthetic: true,
        });
        msg.add_text("real output");
        assert_eq!(msg.parts.len(), 2);
    }

    #[test]
    fn update_tool_call_stamps_lifecycle_times() {
        let mut msg = AssistantMessage::new("s", "p", "build", "openai/gpt-4o");
        let call = ToolCall::with_id("call_1", "bash");
        msg.add_tool_call(call);

        msg.update_tool_call("call_1", ToolState::Running, None, None);
        let running = msg.tool_calls().next().unwrap();
        assert_eq!(running.state, ToolState::Running);
        assert!(running.started_at.is_some());
        assert!(running.ended_at.is_none());

        msg.update_tool_call("call_1", ToolState::Completed, Some("ok".into()), None);
        let done = msg.tool_calls().next().unwrap();
        assert_eq!(done.state, ToolState::Completed);
        assert_eq!(done.output.as_deref(), Some("ok"));
        assert!(done.ended_at.is_some());
    }

    #[test]
    fn message_serialization_roundtrip() {
        let user = Message::User(UserMessage::new("s1", "build", "openai/gpt-4o", "hi"));
        let json = serde_json::to_string(&user).unwrap();
        assert!(json.contains(r#""role":"user""#));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, Message::User(_)));
    }

    #[test]
    fn part_order_survives_roundtrip() {
        let mut msg = AssistantMessage::new("s", "p", "build", "m");
        msg.add_text("before");
        msg.add_tool_call(ToolCall::with_id("call_1", "read"));
        msg.parts.push(Part::Reasoning {
            text: "thinking".into(),
        });
        let json = serde_json::to_string(&msg).unwrap();
        let back: AssistantMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back.parts[0], Part::Text { .. }));
        assert!(matches!(back.parts[1], Part::Tool { .. }));
        assert!(matches!(back.parts[2], Part::Reasoning { .. }));
    }

    #[test]
    fn finish_reason_serializes_snake_case() {
        let json = serde_json::to_string(&FinishReason::ToolCalls).unwrap();
        assert_eq!(json, r#""tool_calls""#);
        assert_eq!(FinishReason::MaxSteps.to_string(), "max_steps");
    }
}
