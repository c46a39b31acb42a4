//! Glob tool — find files matching a pattern under the working directory.

use async_trait::async_trait;

use clawsmith_core::error::ToolError;
use clawsmith_core::tool::{Tool, ToolContext, ToolOutput};

const MAX_RESULTS: usize = 100;

pub struct GlobTool;

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern. Use this to discover files in the \
         project."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern to match files (e.g., '**/*.py', 'src/**/*.ts')"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(
        &self,
        input: &serde_json::Map<String, serde_json::Value>,
        ctx: &mut ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let pattern = input
            .get("pattern")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("missing 'pattern'".into()))?;

        ctx.ask_permission("glob", &[pattern.to_string()], None)
            .await?;

        let full_pattern = ctx.working_dir.join(pattern);
        let full_pattern = full_pattern.to_string_lossy();
        let paths = ::glob::glob(&full_pattern)
            .map_err(|e| ToolError::InvalidArguments(format!("bad glob pattern: {e}")))?;

        let matches: Vec<String> = paths
            .filter_map(|entry| entry.ok())
            .map(|p| {
                p.strip_prefix(&ctx.working_dir)
                    .map(|rel| rel.display().to_string())
                    .unwrap_or_else(|_| p.display().to_string())
            })
            .collect();

        let truncated = matches.len() > MAX_RESULTS;
        let mut lines: Vec<String> = matches.iter().take(MAX_RESULTS).cloned().collect();
        if truncated {
            lines.push(format!(
                "... and {} more files",
                matches.len() - MAX_RESULTS
            ));
        }

        let mut out = ToolOutput::text(if lines.is_empty() {
            "No files found".to_string()
        } else {
            lines.join("\n")
        });
        out.title = format!("glob: {pattern}");
        out.metadata
            .insert("count".into(), serde_json::json!(matches.len()));
        out.metadata
            .insert("truncated".into(), serde_json::json!(truncated));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::context_in;

    #[tokio::test]
    async fn matches_are_relative_to_the_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/b.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/c.txt"), "").unwrap();
        let mut ctx = context_in(dir.path());
        let input = serde_json::json!({"pattern": "src/*.rs"});
        let out = GlobTool
            .execute(input.as_object().unwrap(), &mut ctx)
            .await
            .unwrap();
        assert_eq!(out.output, "src/a.rs\nsrc/b.rs");
        assert_eq!(out.metadata.get("truncated"), Some(&serde_json::json!(false)));
    }

    #[tokio::test]
    async fn no_matches_reports_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context_in(dir.path());
        let input = serde_json::json!({"pattern": "*.zig"});
        let out = GlobTool
            .execute(input.as_object().unwrap(), &mut ctx)
            .await
            .unwrap();
        assert_eq!(out.output, "No files found");
    }
}
