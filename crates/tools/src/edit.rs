//! Edit tool — exact-match search and replace, or file creation.

use async_trait::async_trait;
use tracing::debug;

use clawsmith_core::error::ToolError;
use clawsmith_core::tool::{Tool, ToolContext, ToolOutput};

use crate::resolve_path;

pub struct EditTool;

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Edit a file by replacing text. Provide the exact text to find and the \
         text to replace it with. If the file doesn't exist and old_string is \
         empty, a new file will be created."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file to edit"
                },
                "old_string": {
                    "type": "string",
                    "description": "The exact text to find and replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "The text to replace it with"
                }
            },
            "required": ["file_path", "old_string", "new_string"]
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
        let old_string = input
            .get("old_string")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("missing 'old_string'".into()))?;
        let new_string = input
            .get("new_string")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("missing 'new_string'".into()))?;

        let mut metadata = serde_json::Map::new();
        metadata.insert("file".into(), serde_json::json!(file_path));
        metadata.insert(
            "operation".into(),
            serde_json::json!(if old_string.is_empty() { "create" } else { "edit" }),
        );
        ctx.ask_permission("edit", &[file_path.to_string()], Some(&metadata))
            .await?;

        let path = resolve_path(&ctx.working_dir, file_path);
        let io_err = |e: std::io::Error| ToolError::ExecutionFailed {
            tool_name: "edit".into(),
            reason: e.to_string(),
        };

        // Empty old_string creates the file, parents included.
        if old_string.is_empty() {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
            tokio::fs::write(&path, new_string).await.map_err(io_err)?;
            debug!(path = %path.display(), "created file");
            let mut out = ToolOutput::text(format!("Created file: {}", path.display()));
            out.title = path.display().to_string();
            out.metadata = metadata;
            return Ok(out);
        }

        let content = tokio::fs::read_to_string(&path).await.map_err(io_err)?;

        let count = content.matches(old_string).count();
        if count == 0 {
            return Err(ToolError::ExecutionFailed {
                tool_name: "edit".into(),
                reason: format!("old_string not found in {}", path.display()),
            });
        }
        if count > 1 {
            return Err(ToolError::ExecutionFailed {
                tool_name: "edit".into(),
                reason: format!(
                    "found {count} matches; provide more context in old_string \
                     to identify a unique match"
                ),
            });
        }

        let updated = content.replacen(old_string, new_string, 1);
        tokio::fs::write(&path, updated).await.map_err(io_err)?;
        debug!(path = %path.display(), "applied edit");

        let mut out = ToolOutput::text("Edit applied successfully.");
        out.title = path.display().to_string();
        out.metadata = metadata;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context_in;

    #[tokio::test]
    async fn empty_old_string_creates_file_with_parents() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context_in(dir.path());
        let input = serde_json::json!({
            "file_path": "sub/dir/new.txt",
            "old_string": "",
            "new_string": "content"
        });
        let out = EditTool
            .execute(input.as_object().unwrap(), &mut ctx)
            .await
            .unwrap();
        assert!(out.output.starts_with("Created file:"));
        let written = std::fs::read_to_string(dir.path().join("sub/dir/new.txt")).unwrap();
        assert_eq!(written, "content");
    }

    #[tokio::test]
    async fn unique_match_is_replaced_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "aaa\nmarker\nbbb\n").unwrap();
        let mut ctx = context_in(dir.path());
        let input = serde_json::json!({
            "file_path": "f.txt",
            "old_string": "marker",
            "new_string": "replaced"
        });
        EditTool
            .execute(input.as_object().unwrap(), &mut ctx)
            .await
            .unwrap();
        let content = std::fs::read_to_string(dir.path().join("f.txt")).unwrap();
        assert_eq!(content, "aaa\nreplaced\nbbb\n");
    }

    #[tokio::test]
    async fn missing_old_string_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "nothing here").unwrap();
        let mut ctx = context_in(dir.path());
        let input = serde_json::json!({
            "file_path": "f.txt",
            "old_string": "absent",
            "new_string": "x"
        });
        let err = EditTool
            .execute(input.as_object().unwrap(), &mut ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn ambiguous_match_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "dup\ndup\n").unwrap();
        let mut ctx = context_in(dir.path());
        let input = serde_json::json!({
            "file_path": "f.txt",
            "old_string": "dup",
            "new_string": "x"
        });
        let err = EditTool
            .execute(input.as_object().unwrap(), &mut ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("2 matches"));
        // File is untouched.
        let content = std::fs::read_to_string(dir.path().join("f.txt")).unwrap();
        assert_eq!(content, "dup\ndup\n");
    }
}
