//! Read tool — file contents with line numbers.

use async_trait::async_trait;

use clawsmith_core::error::ToolError;
use clawsmith_core::tool::{Tool, ToolContext, ToolOutput};

use crate::resolve_path;

pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Use this to examine code, configuration, \
         or any text file."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to read"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start reading from (1-indexed)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to read"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(
        &self,
        input: &serde_json::Map<String, serde_json::Value>,
        ctx: &mut ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let file_path = input
            .get("file_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("missing 'file_path'".into()))?;
        let offset = input
            .get("offset")
            .and_then(|v| v.as_u64())
            .unwrap_or(1)
            .max(1) as usize;
        let limit = input.get("limit").and_then(|v| v.as_u64()).map(|v| v as usize);

        ctx.ask_permission("read", &[file_path.to_string()], None)
            .await?;

        let path = resolve_path(&ctx.working_dir, file_path);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "read".into(),
                    reason: format!("file not found: {}", path.display()),
                });
            }
            Err(e) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "read".into(),
                    reason: e.to_string(),
                });
            }
        };

        let lines: Vec<&str> = content.lines().collect();
        let start = offset - 1;
        let end = limit.map_or(lines.len(), |l| start.saturating_add(l).min(lines.len()));
        let selected: &[&str] = if start < lines.len() {
            &lines[start..end]
        } else {
            &[]
        };

        let numbered: Vec<String> = selected
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:6}|{}", start + i + 1, line.trim_end()))
            .collect();

        let mut out = ToolOutput::text(numbered.join("\n"));
        out.title = path.display().to_string();
        out.metadata
            .insert("total_lines".into(), serde_json::json!(lines.len()));
        Ok(out)
    }
}
