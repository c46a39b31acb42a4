//! `clawsmith sessions` — inspect and manage saved sessions.

use clawsmith_core::message::{Message, Part, ToolState};
use clawsmith_core::session::Session;
use clawsmith_store::FileSessionStore;

fn store() -> anyhow::Result<FileSessionStore> {
    let cwd = std::env::current_dir()?;
    Ok(FileSessionStore::in_dir(&cwd)?)
}

pub fn list() -> anyhow::Result<()> {
    let sessions = store()?.list()?;
    if sessions.is_empty() {
        println!("  No sessions found.");
        return Ok(());
    }
    print_table(&sessions, None);
    Ok(())
}

pub(crate) fn print_table(sessions: &[Session], current: Option<&str>) {
    println!("  {:<7} {:<32} {:<8} {:>8}  {}", "ID", "TITLE", "AGENT", "MSGS", "UPDATED");
    for session in sessions.iter().take(20) {
        let marker = if current == Some(session.id.as_str()) {
            "→"
        } else {
            " "
        };
        let title = if session.title.chars().count() > 30 {
            let head: String = session.title.chars().take(27).collect();
            format!("{head}...")
        } else {
            session.title.clone()
        };
        println!(
            "{marker} {:<7} {:<32} {:<8} {:>8}  {}",
            session.id,
            title,
            session.agent,
            session.messages.len(),
            session.updated_at.format("%m-%d %H:%M")
        );
    }
}

pub fn show(id: &str) -> anyhow::Result<()> {
    let session = store()?.get(id)?;
    println!("  Session {} ({} / {})", session.id, session.agent, session.model);
    println!();
    for message in &session.messages {
        match message {
            Message::User(m) => {
                println!("you > {}", m.text());
            }
            Message::Assistant(m) => {
                for part in &m.parts {
                    match part {
                        Part::Text { text, .. } => println!("{text}"),
                        Part::Reasoning { .. } => {}
                        Part::Tool { call } => {
                            let status = match call.state {
                                ToolState::Completed => "ok",
                                ToolState::Error => "error",
                                ToolState::Running => "running",
                                ToolState::Pending => "pending",
                            };
                            println!("  ⚙ {} [{status}]", call.tool_name);
                        }
                    }
                }
                if let Some(err) = &m.error {
                    println!("  ✗ {err}");
                }
            }
        }
        println!();
    }
    Ok(())
}

pub fn delete(id: &str) -> anyhow::Result<()> {
    store()?.delete(id)?;
    println!("  Deleted session matching '{id}'.");
    Ok(())
}
