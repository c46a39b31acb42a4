//! Tool trait — the abstraction over agent capabilities.
//!
//! Tools are what let the agent act on the local machine: run shell
//! commands, read and edit files, list directories, search by glob, ask
//! the user for clarification. Tools are registered in the `ToolRegistry`
//! and executed inside a scoped `ToolContext`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PermissionError, ToolError};
use crate::provider::ToolDefinition;

/// The result of a successful tool execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text folded back into the conversation for the model.
    pub output: String,
    /// Short human-readable title for display.
    #[serde(default)]
    pub title: String,
    /// Structured extras (exit codes, counts, …).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ToolOutput {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Self::default()
        }
    }
}

/// Entry point the tool execution context uses to authorize actions.
///
/// Implemented by the permission engine; mocked in tests.
#[async_trait]
pub trait PermissionCheck: Send + Sync {
    /// Check every target independently. A deny raises
    /// [`PermissionError::Denied`]; a declined interactive prompt raises
    /// [`PermissionError::Rejected`]. No partial execution: the first
    /// failure aborts the whole check.
    async fn check(
        &self,
        permission: &str,
        targets: &[String],
        metadata: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> std::result::Result<(), PermissionError>;
}

/// Scoped execution environment handed to each tool call.
pub struct ToolContext {
    pub session_id: String,
    pub message_id: String,
    pub agent: String,
    pub working_dir: PathBuf,
    permission: Arc<dyn PermissionCheck>,
    /// (permission, target) pairs already approved by the caller, so the
    /// tool's own check does not prompt a second time for one logical
    /// action.
    preapproved: HashMap<String, HashSet<String>>,
}

impl ToolContext {
    pub fn new(
        session_id: impl Into<String>,
        message_id: impl Into<String>,
        agent: impl Into<String>,
        working_dir: PathBuf,
        permission: Arc<dyn PermissionCheck>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            message_id: message_id.into(),
            agent: agent.into(),
            working_dir,
            permission,
            preapproved: HashMap::new(),
        }
    }

    /// Mark (permission, target) pairs as already authorized.
    pub fn preapprove(&mut self, permission: &str, targets: &[String]) {
        let set = self.preapproved.entry(permission.to_string()).or_default();
        for target in targets {
            set.insert(target.clone());
        }
    }

    /// Request authorization, skipping targets the caller pre-approved.
    pub async fn ask_permission(
        &self,
        permission: &str,
        targets: &[String],
        metadata: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> std::result::Result<(), PermissionError> {
        let remaining: Vec<String> = match self.preapproved.get(permission) {
            Some(approved) => targets
                .iter()
                .filter(|t| !approved.contains(*t))
                .cloned()
                .collect(),
            None => targets.to_vec(),
        };
        if remaining.is_empty() {
            return Ok(());
        }
        self.permission.check(permission, &remaining, metadata).await
    }
}

/// The core tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name (e.g. "bash", "read", "edit").
    fn name(&self) -> &str;

    /// Description sent to the model.
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given input.
    async fn execute(
        &self,
        input: &serde_json::Map<String, serde_json::Value>,
        ctx: &mut ToolContext,
    ) -> std::result::Result<ToolOutput, ToolError>;

    /// Convert to a definition for the model's tool catalogue.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// The agent loop uses this to build the tool catalogue for the model and
/// to look up tools when the model requests them.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// All tool definitions for sending to the model.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AllowAll;

    #[async_trait]
    impl PermissionCheck for AllowAll {
        async fn check(
            &self,
            _permission: &str,
            _targets: &[String],
            _metadata: Option<&serde_json::Map<String, serde_json::Value>>,
        ) -> std::result::Result<(), PermissionError> {
            Ok(())
        }
    }

    struct DenyAll;

    #[async_trait]
    impl PermissionCheck for DenyAll {
        async fn check(
            &self,
            permission: &str,
            targets: &[String],
            _metadata: Option<&serde_json::Map<String, serde_json::Value>>,
        ) -> std::result::Result<(), PermissionError> {
            Err(PermissionError::Denied {
                permission: permission.into(),
                pattern: targets.first().cloned().unwrap_or_default(),
            })
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            input: &serde_json::Map<String, serde_json::Value>,
            _ctx: &mut ToolContext,
        ) -> std::result::Result<ToolOutput, ToolError> {
            let text = input
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            Ok(ToolOutput::text(text))
        }
    }

    fn test_ctx(permission: Arc<dyn PermissionCheck>) -> ToolContext {
        ToolContext::new("s1", "msg_1", "build", PathBuf::from("."), permission)
    }

    #[tokio::test]
    async fn registry_register_and_execute() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.definitions().len(), 1);

        let mut ctx = test_ctx(Arc::new(AllowAll));
        let mut input = serde_json::Map::new();
        input.insert("text".into(), "hello".into());
        let out = registry
            .get("echo")
            .unwrap()
            .execute(&input, &mut ctx)
            .await
            .unwrap();
        assert_eq!(out.output, "hello");
    }

    #[tokio::test]
    async fn preapproved_targets_skip_the_check() {
        let mut ctx = test_ctx(Arc::new(DenyAll));
        ctx.preapprove("bash", &["ls -la".to_string()]);

        // Pre-approved target never reaches the (denying) engine.
        ctx.ask_permission("bash", &["ls -la".to_string()], None)
            .await
            .unwrap();

        // A different target still goes through and is denied.
        let err = ctx
            .ask_permission("bash", &["rm -rf /".to_string()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, PermissionError::Denied { .. }));
    }

    #[tokio::test]
    async fn preapproval_is_scoped_to_the_permission() {
        let mut ctx = test_ctx(Arc::new(DenyAll));
        ctx.preapprove("bash", &["cat file".to_string()]);
        let err = ctx
            .ask_permission("edit", &["cat file".to_string()], None)
            .await
            .unwrap_err();
        assert!(matches!(err, PermissionError::Denied { .. }));
    }
}
