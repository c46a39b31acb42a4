//! Core types shared across the clawsmith workspace.
//!
//! This crate defines the data model (sessions, messages, tool calls),
//! the `Provider` and `Tool` traits, permission rule types, and the
//! error hierarchy. It has no I/O of its own; the sibling crates build
//! the runtime on top of these types.

pub mod agent;
pub mod error;
pub mod message;
pub mod permission;
pub mod provider;
pub mod session;
pub mod tool;

pub use agent::{AgentConfig, AgentManager, AgentMode};
pub use error::{Error, PermissionError, ProviderError, Result, StoreError, ToolError};
pub use message::{
    generate_id, AssistantMessage, FinishReason, Message, Part, TokenUsage, ToolCall, ToolState,
    UserMessage,
};
pub use permission::{PermissionAction, PermissionRule};
pub use provider::{
    Provider, ProviderRequest, StreamChunk, StreamReceiver, ToolDefinition, WireMessage,
    WireRole, WireToolCall,
};
pub use session::{generate_session_id, Session};
pub use tool::{PermissionCheck, Tool, ToolContext, ToolOutput, ToolRegistry};
