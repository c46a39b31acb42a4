pub mod chat;
pub mod run;
pub mod sessions;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;

use clawsmith_agent::AgentLoop;
use clawsmith_core::agent::AgentConfig;
use clawsmith_core::tool::PermissionCheck;
use clawsmith_permission::{AskCallback, PermissionEngine};

use crate::terminal::{PrintObserver, TerminalRecovery};

/// Resolve the working directory argument to an absolute path,
/// creating it when it does not exist yet.
pub(crate) fn resolve_working_dir(directory: &str) -> anyhow::Result<PathBuf> {
    let path = PathBuf::from(directory);
    let path = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .context("cannot determine current directory")?
            .join(path)
    };
    if !path.exists() {
        eprintln!("  Creating directory: {}", path.display());
        std::fs::create_dir_all(&path)
            .with_context(|| format!("cannot create {}", path.display()))?;
    }
    anyhow::ensure!(path.is_dir(), "not a directory: {}", path.display());
    Ok(path)
}

/// First Ctrl+C requests a graceful stop of the running turn. The
/// second one exits the process.
pub(crate) fn spawn_ctrl_c(abort: Arc<AtomicBool>) {
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            if abort.swap(true, Ordering::Relaxed) {
                eprintln!("\n  Exiting.");
                std::process::exit(130);
            }
            eprintln!("\n  Interrupting... (Ctrl+C again to force quit)");
        }
    });
}

/// Assemble an agent loop for one turn: provider from the model string,
/// default tool registry, and a permission engine seeded with the
/// agent's rules on top of the defaults.
pub(crate) fn build_loop(
    agent: AgentConfig,
    model: &str,
    working_dir: PathBuf,
    abort: Arc<AtomicBool>,
    ask: Arc<dyn AskCallback>,
) -> anyhow::Result<AgentLoop> {
    let provider = clawsmith_providers::create_provider(model)
        .with_context(|| format!("cannot create provider for {model}"))?;

    let mut engine = PermissionEngine::with_defaults(ask);
    engine.merge_rules(agent.permissions.clone());
    let permission: Arc<dyn PermissionCheck> = Arc::new(engine);

    let tools = Arc::new(clawsmith_tools::default_registry());

    Ok(AgentLoop::new(
        Arc::from(provider),
        tools,
        permission,
        agent,
        working_dir,
        abort,
        Box::new(PrintObserver::new()),
        Arc::new(TerminalRecovery),
    ))
}
