//! Terminal-facing implementations of the interactive traits: permission
//! prompts, stream error recovery, and streaming output display.

use std::collections::HashMap;
use std::io::Write;

use async_trait::async_trait;

use clawsmith_agent::{EditStreamPreview, RecoveryAction, RecoveryPrompt, StreamObserver};
use clawsmith_permission::{AskCallback, AskDecision};

/// Read one line from stdin without blocking the runtime.
pub(crate) async fn read_line() -> std::io::Result<String> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok(line.trim().to_string())
    })
    .await
    .map_err(|e| std::io::Error::other(e.to_string()))?
}

/// Asks permission questions on the terminal.
pub struct TerminalAsk;

#[async_trait]
impl AskCallback for TerminalAsk {
    async fn ask(
        &self,
        permission: &str,
        target: &str,
        metadata: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> AskDecision {
        println!();
        println!("  Permission required: {permission}");
        println!("  Target: {target}");
        if let Some(meta) = metadata
            && let Some(op) = meta.get("operation").and_then(|v| v.as_str())
        {
            println!("  Operation: {op}");
        }
        loop {
            print!("  Allow? [y]es / [n]o / [a]lways > ");
            let _ = std::io::stdout().flush();
            let answer = match read_line().await {
                Ok(line) => line.to_lowercase(),
                Err(_) => return AskDecision::Deny,
            };
            match answer.as_str() {
                "y" | "yes" => return AskDecision::Allow,
                "n" | "no" | "" => return AskDecision::Deny,
                "a" | "always" => return AskDecision::Always,
                _ => println!("  Please answer y, n or a."),
            }
        }
    }
}

/// Offers retry/skip/abort on the terminal after a stream failure.
pub struct TerminalRecovery;

#[async_trait]
impl RecoveryPrompt for TerminalRecovery {
    async fn recover(&self, error: &str) -> RecoveryAction {
        println!();
        println!("  Stream error: {error}");
        loop {
            print!("  [r]etry / [s]kip / [a]bort > ");
            let _ = std::io::stdout().flush();
            let answer = match read_line().await {
                Ok(line) => line.to_lowercase(),
                Err(_) => return RecoveryAction::Abort,
            };
            match answer.as_str() {
                "r" | "retry" => return RecoveryAction::Retry,
                "s" | "skip" => return RecoveryAction::Skip,
                "a" | "abort" | "" => return RecoveryAction::Abort,
                _ => println!("  Please answer r, s or a."),
            }
        }
    }
}

/// Prints assistant output as it streams. Edit tool calls get a live
/// preview of the file content being generated instead of raw JSON.
#[derive(Default)]
pub struct PrintObserver {
    previews: HashMap<String, Preview>,
    printed_text: bool,
}

struct Preview {
    inner: EditStreamPreview,
    frame_lines: usize,
}

impl PrintObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn redraw(preview: &mut Preview) {
        let frame = preview.inner.render();
        let mut out = std::io::stdout().lock();
        if preview.frame_lines > 0 {
            // Move back over the previous frame and clear it.
            let _ = write!(out, "\x1b[{}A\r\x1b[J", preview.frame_lines);
        }
        let _ = writeln!(out, "{frame}");
        let _ = out.flush();
        preview.frame_lines = frame.lines().count() + 1;
    }
}

impl StreamObserver for PrintObserver {
    fn on_text(&mut self, fragment: &str) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "{fragment}");
        let _ = out.flush();
        self.printed_text = true;
    }

    fn on_tool_call(&mut self, _id: &str, name: &str) {
        if self.printed_text {
            println!();
            self.printed_text = false;
        }
        println!("  ⚙ {name}");
    }

    fn on_tool_call_delta(&mut self, id: &str, name: &str, args_delta: &str) {
        if name != "edit" {
            return;
        }
        let preview = self.previews.entry(id.to_string()).or_insert(Preview {
            inner: EditStreamPreview::new(),
            frame_lines: 0,
        });
        preview.inner.feed(args_delta);
        Self::redraw(preview);
    }

    fn on_error(&mut self, message: &str) {
        if self.printed_text {
            println!();
            self.printed_text = false;
        }
        eprintln!("  ✗ {message}");
    }
}
