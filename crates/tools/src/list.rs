//! List tool — directory contents, directories before files.

use async_trait::async_trait;

use clawsmith_core::error::ToolError;
use clawsmith_core::tool::{Tool, ToolContext, ToolOutput};

use crate::resolve_path;

pub struct ListTool;

#[async_trait]
impl Tool for ListTool {
    fn name(&self) -> &str {
        "list"
    }

    fn description(&self) -> &str {
        "List files and directories in a path. Similar to 'ls -la' but \
         formatted for AI consumption."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory path to list (default: current directory)"
                }
            }
        })
    }

    async fn execute(
        &self,
        input: &serde_json::Map<String, serde_json::Value>,
        ctx: &mut ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let path_arg = input
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(".");

        ctx.ask_permission("list", &[path_arg.to_string()], None)
            .await?;

        let path = resolve_path(&ctx.working_dir, path_arg);
        let io_err = |e: std::io::Error| ToolError::ExecutionFailed {
            tool_name: "list".into(),
            reason: e.to_string(),
        };

        let mut names: Vec<(bool, String)> = Vec::new();
        let mut entries = tokio::fs::read_dir(&path).await.map_err(io_err)?;
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let name = entry.file_name().to_string_lossy().to_string();
            // Hidden entries are skipped.
            if name.starts_with('.') {
                continue;
            }
            let is_dir = entry
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            names.push((is_dir, name));
        }
        // Directories first, each group alphabetical.
        names.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let lines: Vec<String> = names
            .iter()
            .map(|(is_dir, name)| {
                if *is_dir {
                    format!("📁 {name}")
                } else {
                    format!("📄 {name}")
                }
            })
            .collect();

        let mut out = ToolOutput::text(if lines.is_empty() {
            "Empty directory".to_string()
        } else {
            lines.join("\n")
        });
        out.title = path.display().to_string();
        out.metadata
            .insert("count".into(), serde_json::json!(names.len()));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context_in;

    #[tokio::test]
    async fn directories_come_first_and_hidden_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("zdir")).unwrap();
        std::fs::write(dir.path().join("afile.txt"), "").unwrap();
        std::fs::write(dir.path().join(".hidden"), "").unwrap();
        let mut ctx = context_in(dir.path());
        let input = serde_json::json!({});
        let out = ListTool
            .execute(input.as_object().unwrap(), &mut ctx)
            .await
            .unwrap();
        assert_eq!(out.output, "📁 zdir\n📄 afile.txt");
        assert_eq!(out.metadata.get("count"), Some(&serde_json::json!(2)));
    }

    #[tokio::test]
    async fn empty_directory_has_placeholder_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context_in(dir.path());
        let input = serde_json::json!({});
        let out = ListTool
            .execute(input.as_object().unwrap(), &mut ctx)
            .await
            .unwrap();
        assert_eq!(out.output, "Empty directory");
    }
}
