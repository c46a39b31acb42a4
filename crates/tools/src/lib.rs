//! Built-in tool implementations for clawsmith.
//!
//! Tools give the agent the ability to act on the local machine: run
//! shell commands, read and edit files, list directories, search by
//! glob pattern, and ask the user for clarification. Every tool checks
//! its permission through the context before doing anything.

use std::path::{Path, PathBuf};

pub mod ask_user;
pub mod bash;
pub mod edit;
pub mod glob;
pub mod list;
pub mod read;

pub use ask_user::{AskUserTool, QuestionPrompt, StdinPrompt};
pub use bash::BashTool;
pub use edit::EditTool;
pub use glob::GlobTool;
pub use list::ListTool;
pub use read::ReadTool;

use clawsmith_core::tool::ToolRegistry;

/// Resolve a tool path argument: absolute paths stand, relative paths
/// are anchored at the working directory.
pub(crate) fn resolve_path(working_dir: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        working_dir.join(p)
    }
}

/// Create a registry with all built-in tools, prompting on stdin where
/// a tool needs terminal input.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(BashTool::new()));
    registry.register(Box::new(ReadTool));
    registry.register(Box::new(EditTool));
    registry.register(Box::new(ListTool));
    registry.register(Box::new(GlobTool));
    registry.register(Box::new(AskUserTool::default()));
    registry
}
