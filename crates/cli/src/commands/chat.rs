//! `clawsmith chat` — interactive conversation mode.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;

use clawsmith_core::agent::AgentManager;
use clawsmith_core::session::Session;
use clawsmith_store::FileSessionStore;

use crate::terminal::{self, TerminalAsk};

const HELP: &str = "\
Commands:
  /help        - Show this help
  /agent       - Cycle agent (build/plan/explore)
  /clear       - Start a fresh conversation
  /sessions    - List saved sessions
  /load <id>   - Load a previous session
  /delete <id> - Delete a session
  /info        - Show current session info
  /quit        - Exit
";

pub async fn run(
    model: &str,
    agent_name: &str,
    directory: &str,
    session_id: Option<&str>,
) -> anyhow::Result<()> {
    let working_dir = super::resolve_working_dir(directory)?;
    let store = FileSessionStore::in_dir(&working_dir)?;
    let manager = AgentManager::new(&working_dir.to_string_lossy());

    let mut model = model.to_string();
    let mut agent_name = agent_name.to_string();
    let mut session = match session_id {
        Some(id) => {
            let s = store
                .get(id)
                .with_context(|| format!("cannot load session {id}"))?;
            agent_name = s.agent.clone();
            model = s.model.clone();
            s
        }
        None => Session::new(&agent_name, &model),
    };

    let abort = Arc::new(AtomicBool::new(false));
    super::spawn_ctrl_c(abort.clone());

    println!();
    println!("  clawsmith — interactive mode");
    println!("  model: {model}   agent: {agent_name}   dir: {}", working_dir.display());
    println!("  Type a message, or /help for commands.");
    println!();

    loop {
        print!("you > ");
        let _ = std::io::stdout().flush();
        let input = match terminal::read_line().await {
            Ok(line) => line,
            Err(_) => break,
        };
        if input.is_empty() {
            continue;
        }

        if let Some(rest) = input.strip_prefix('/') {
            let mut parts = rest.splitn(2, char::is_whitespace);
            let cmd = parts.next().unwrap_or_default();
            let arg = parts.next().map(str::trim).unwrap_or_default();

            match cmd {
                "quit" | "exit" => break,
                "help" => print!("{HELP}"),
                "clear" => {
                    session = Session::new(&agent_name, &model);
                    println!("  Conversation cleared.");
                }
                "agent" | "a" => {
                    let names: Vec<String> =
                        manager.list().iter().map(|a| a.name.clone()).collect();
                    let idx = names.iter().position(|n| *n == agent_name);
                    agent_name = match idx {
                        Some(i) => names[(i + 1) % names.len()].clone(),
                        None => manager.default_agent().name.clone(),
                    };
                    session.agent = agent_name.clone();
                    println!("  Switched to agent: {agent_name}");
                }
                "model" => {
                    if arg.is_empty() {
                        println!("  Current model: {model}");
                    } else {
                        model = arg.to_string();
                        session.model = model.clone();
                        println!("  Switched to model: {model}");
                    }
                }
                "sessions" => match store.list() {
                    Ok(sessions) => super::sessions::print_table(&sessions, Some(&session.id)),
                    Err(e) => println!("  Error: {e}"),
                },
                "load" => {
                    if arg.is_empty() {
                        println!("  Usage: /load <session_id>");
                        continue;
                    }
                    match store.get(arg) {
                        Ok(loaded) => {
                            agent_name = loaded.agent.clone();
                            model = loaded.model.clone();
                            println!(
                                "  Loaded session {} ({} messages)",
                                loaded.id,
                                loaded.messages.len()
                            );
                            session = loaded;
                        }
                        Err(e) => println!("  Error: {e}"),
                    }
                }
                "delete" => {
                    if arg.is_empty() {
                        println!("  Usage: /delete <session_id>");
                        continue;
                    }
                    if session.id.contains(arg) {
                        println!("  Cannot delete the current session. Use /clear instead.");
                        continue;
                    }
                    match store.delete(arg) {
                        Ok(()) => println!("  Deleted."),
                        Err(e) => println!("  Error: {e}"),
                    }
                }
                "info" => {
                    println!("  id:       {}", session.id);
                    println!("  title:    {}", session.title);
                    println!("  agent:    {}", session.agent);
                    println!("  model:    {}", session.model);
                    println!("  messages: {}", session.messages.len());
                    println!("  updated:  {}", session.updated_at.format("%Y-%m-%d %H:%M:%S"));
                }
                _ => println!("  Unknown command: /{cmd} (try /help)"),
            }
            continue;
        }

        let agent = match manager.get(&agent_name) {
            Some(a) => a.clone(),
            None => manager.default_agent().clone(),
        };

        abort.store(false, Ordering::Relaxed);

        let mut agent_loop = match super::build_loop(
            agent,
            &model,
            working_dir.clone(),
            abort.clone(),
            Arc::new(TerminalAsk),
        ) {
            Ok(l) => l,
            Err(e) => {
                println!("  Error: {e}");
                continue;
            }
        };

        let reason = agent_loop.run_turn(&mut session, &input, &model).await;
        println!();
        if abort.load(Ordering::Relaxed) {
            println!("  Interrupted.");
        }
        tracing::debug!(%reason, "turn done");
        if let Err(e) = store.save(&session) {
            println!("  Error saving session: {e}");
        }
    }

    if !session.messages.is_empty() {
        store.save(&session)?;
        println!("  Session saved: {}", session.id);
    }
    println!("  Goodbye!");
    Ok(())
}
