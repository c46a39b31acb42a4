//! Bash tool — execute shell commands in the working directory.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use clawsmith_core::error::ToolError;
use clawsmith_core::tool::{Tool, ToolContext, ToolOutput};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Execute shell commands with a hard timeout.
pub struct BashTool {
    timeout_secs: u64,
}

impl BashTool {
    pub fn new() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }
}

impl Default for BashTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a bash command in the shell. Use this for running commands, \
         scripts, or interacting with the system. The command runs in the \
         current working directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash command to execute"
                },
                "description": {
                    "type": "string",
                    "description": "Brief description of what this command does"
                }
            },
            "required": ["command", "description"]
        })
    }

    async fn execute(
        &self,
        input: &serde_json::Map<String, serde_json::Value>,
        ctx: &mut ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let command = input
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("missing 'command'".into()))?;
        let description = input
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        ctx.ask_permission("bash", &[command.to_string()], Some(input))
            .await?;

        debug!(%command, "executing shell command");

        let mut child = Command::new("sh")
            .args(["-c", command])
            .current_dir(&ctx.working_dir)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "bash".into(),
                reason: e.to_string(),
            })?;

        let timeout = std::time::Duration::from_secs(self.timeout_secs);
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| ToolError::ExecutionFailed {
                tool_name: "bash".into(),
                reason: e.to_string(),
            })?,
            Err(_) => {
                warn!(%command, timeout_secs = self.timeout_secs, "command timed out");
                return Err(ToolError::Timeout {
                    tool_name: "bash".into(),
                    timeout_secs: self.timeout_secs,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);
        if !output.status.success() {
            warn!(%command, exit_code, "command failed");
        }

        let mut result = ToolOutput::text(format!("{stdout}{stderr}").trim().to_string());
        result.title = description.to_string();
        result
            .metadata
            .insert("exit_code".into(), serde_json::json!(exit_code));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::allow_all_context;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let tool = BashTool::new();
        let mut ctx = allow_all_context();
        let input = serde_json::json!({
            "command": "echo hello",
            "description": "say hello"
        });
        let out = tool
            .execute(input.as_object().unwrap(), &mut ctx)
            .await
            .unwrap();
        assert_eq!(out.output, "hello");
        assert_eq!(out.title, "say hello");
        assert_eq!(out.metadata.get("exit_code"), Some(&serde_json::json!(0)));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_in_metadata() {
        let tool = BashTool::new();
        let mut ctx = allow_all_context();
        let input = serde_json::json!({"command": "exit 3", "description": ""});
        let out = tool
            .execute(input.as_object().unwrap(), &mut ctx)
            .await
            .unwrap();
        assert_eq!(out.metadata.get("exit_code"), Some(&serde_json::json!(3)));
    }

    #[tokio::test]
    async fn long_command_times_out() {
        let tool = BashTool::with_timeout(1);
        let mut ctx = allow_all_context();
        let input = serde_json::json!({"command": "sleep 10", "description": ""});
        let err = tool
            .execute(input.as_object().unwrap(), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { timeout_secs: 1, .. }));
    }

    #[tokio::test]
    async fn missing_command_is_invalid_arguments() {
        let tool = BashTool::new();
        let mut ctx = allow_all_context();
        let input = serde_json::json!({"description": "oops"});
        let err = tool
            .execute(input.as_object().unwrap(), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
