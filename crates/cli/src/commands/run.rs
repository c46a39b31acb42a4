//! `clawsmith run` — execute a single prompt and exit.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::Context;

use clawsmith_core::message::FinishReason;
use clawsmith_core::session::Session;
use clawsmith_store::FileSessionStore;

use crate::terminal::TerminalAsk;

pub async fn run(
    prompt: &str,
    model: &str,
    agent_name: &str,
    directory: &str,
    session_id: Option<&str>,
) -> anyhow::Result<()> {
    let working_dir = super::resolve_working_dir(directory)?;
    let store = FileSessionStore::in_dir(&working_dir)?;

    let manager = clawsmith_core::agent::AgentManager::new(&working_dir.to_string_lossy());
    let agent = manager
        .get(agent_name)
        .with_context(|| format!("unknown agent: {agent_name}"))?
        .clone();

    let mut session = match session_id {
        Some(id) => store
            .get(id)
            .with_context(|| format!("cannot load session {id}"))?,
        None => Session::new(&agent.name, model),
    };

    let abort = Arc::new(AtomicBool::new(false));
    super::spawn_ctrl_c(abort.clone());

    let mut agent_loop = super::build_loop(
        agent,
        model,
        working_dir,
        abort,
        Arc::new(TerminalAsk),
    )?;

    let reason = agent_loop.run_turn(&mut session, prompt, model).await;
    store.save(&session)?;
    println!();

    match reason {
        FinishReason::Stop | FinishReason::ToolCalls => {}
        FinishReason::Error => {
            let detail = session
                .last_assistant()
                .and_then(|m| m.error.clone())
                .unwrap_or_else(|| "unknown error".to_string());
            anyhow::bail!("turn failed: {detail}");
        }
        other => eprintln!("  Finished: {other}"),
    }
    eprintln!("  Session saved: {}", session.id);
    Ok(())
}
