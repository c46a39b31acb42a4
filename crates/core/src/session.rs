//! Session — an ordered conversation with shared context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{AssistantMessage, Message, UserMessage};
use crate::permission::PermissionRule;

/// Generate a short 5-character lowercase alphanumeric session id.
pub fn generate_session_id() -> String {
    Uuid::new_v4().simple().to_string()[..5].to_string()
}

/// A conversation session.
///
/// Messages are stored in insertion order, which is conversation order;
/// they are never reordered. `updated_at` is monotonically non-decreasing
/// with each appended message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub agent: String,
    /// `provider/model` identifier.
    pub model: String,
    /// Parent session id when this is a subagent session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub messages: Vec<Message>,
    /// Session-level permission overrides.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<PermissionRule>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(agent: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_session_id(),
            title: format!("New Session - {}", now.to_rfc3339()),
            agent: agent.into(),
            model: model.into(),
            parent_id: None,
            messages: Vec::new(),
            permissions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Append a message, advancing `updated_at`.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Append a fresh user message and return its id.
    pub fn push_user(&mut self, text: &str) -> String {
        let msg = UserMessage::new(&self.id, &self.agent, &self.model, text);
        let id = msg.id.clone();
        self.push(Message::User(msg));
        id
    }

    /// Append an empty assistant message for a new step and return its
    /// index in `messages`.
    pub fn push_assistant(&mut self, parent_id: &str) -> usize {
        let msg = AssistantMessage::new(&self.id, parent_id, &self.agent, &self.model);
        self.push(Message::Assistant(msg));
        self.messages.len() - 1
    }

    pub fn last_user(&self) -> Option<&UserMessage> {
        self.messages.iter().rev().find_map(|m| match m {
            Message::User(u) => Some(u),
            _ => None,
        })
    }

    pub fn last_assistant(&self) -> Option<&AssistantMessage> {
        self.messages.iter().rev().find_map(|m| m.as_assistant())
    }
}
