//! Live preview of an edit tool call while its arguments stream in.
//!
//! The model emits the edit tool's arguments as raw JSON fragments. This
//! state machine scans those fragments character by character, finds the
//! `new_string` value and decodes it on the fly, keeping a sliding
//! window of the last few completed lines for display. It never waits
//! for the JSON to be complete or valid.

use std::collections::VecDeque;

/// Lines kept in the sliding window.
const WINDOW_SIZE: usize = 5;
/// Longer lines are truncated for display.
const MAX_LINE_DISPLAY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Scanning for the `"new_string"` key followed by a colon.
    SearchingKey,
    /// Key found, waiting for the opening quote of the value.
    BeforeValue,
    /// Inside the string value.
    InString,
    /// Value ended at an unescaped quote.
    Done,
}

/// Incremental decoder for the edit tool's `new_string` argument.
pub struct EditStreamPreview {
    state: State,
    /// Raw JSON seen so far, used for file_path lookup.
    raw: String,
    /// Characters scanned so far while searching for the key. Built per
    /// character so the key is only matched once fully consumed.
    key_buffer: String,
    escape_next: bool,
    /// Pending `\uXXXX` hex digits, present only mid-escape.
    unicode_digits: Option<String>,
    line_buffer: String,
    /// (line number, content) pairs, capped at WINDOW_SIZE.
    window: VecDeque<(usize, String)>,
    line_count: usize,
    char_count: usize,
    file_path: Option<String>,
}

impl Default for EditStreamPreview {
    fn default() -> Self {
        Self::new()
    }
}

impl EditStreamPreview {
    pub fn new() -> Self {
        Self {
            state: State::SearchingKey,
            raw: String::new(),
            key_buffer: String::new(),
            escape_next: false,
            unicode_digits: None,
            line_buffer: String::new(),
            window: VecDeque::new(),
            line_count: 0,
            char_count: 0,
            file_path: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn char_count(&self) -> usize {
        self.char_count
    }

    pub fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }

    /// Feed the next raw JSON fragment.
    pub fn feed(&mut self, delta: &str) {
        if delta.is_empty() || self.state == State::Done {
            return;
        }
        if self.file_path.is_none() {
            self.raw.push_str(delta);
            self.file_path = extract_string_field(&self.raw, "file_path");
            if self.file_path.is_some() {
                self.raw.clear();
            }
        }
        for ch in delta.chars() {
            self.process_char(ch);
            if self.state == State::Done {
                break;
            }
        }
    }

    fn process_char(&mut self, ch: char) {
        if let Some(digits) = &mut self.unicode_digits {
            digits.push(ch);
            if digits.len() == 4 {
                let decoded = u32::from_str_radix(digits, 16)
                    .ok()
                    .and_then(char::from_u32);
                self.unicode_digits = None;
                if let Some(c) = decoded {
                    self.line_buffer.push(c);
                }
                self.char_count += 1;
            }
            return;
        }

        if self.escape_next {
            self.escape_next = false;
            if self.state == State::InString {
                match ch {
                    'n' => {
                        // A newline counts as one character.
                        self.char_count += 1;
                        self.emit_line();
                    }
                    't' => {
                        self.line_buffer.push_str("    ");
                        self.char_count += 1;
                    }
                    'r' => {}
                    'u' => self.unicode_digits = Some(String::with_capacity(4)),
                    '"' | '\\' | '/' => {
                        self.line_buffer.push(ch);
                        self.char_count += 1;
                    }
                    other => {
                        self.line_buffer.push(other);
                        self.char_count += 1;
                    }
                }
            }
            return;
        }
        if ch == '\\' {
            self.escape_next = true;
            return;
        }

        match self.state {
            State::SearchingKey => {
                self.key_buffer.push(ch);
                if let Some((_, after)) = self.key_buffer.rsplit_once("\"new_string\"")
                    && after.contains(':')
                {
                    self.state = State::BeforeValue;
                    self.key_buffer.clear();
                }
            }
            State::BeforeValue => {
                if ch == '"' {
                    self.state = State::InString;
                }
            }
            State::InString => {
                if ch == '"' {
                    // Unescaped quote ends the value.
                    self.emit_final_line();
                    self.state = State::Done;
                } else {
                    self.line_buffer.push(ch);
                    self.char_count += 1;
                }
            }
            State::Done => {}
        }
    }

    fn emit_line(&mut self) {
        self.line_count += 1;
        let line = std::mem::take(&mut self.line_buffer);
        self.window.push_back((self.line_count, line));
        if self.window.len() > WINDOW_SIZE {
            self.window.pop_front();
        }
    }

    fn emit_final_line(&mut self) {
        if !self.line_buffer.is_empty() {
            self.emit_line();
        }
    }

    /// Render the current window as plain text, one framed block.
    pub fn render(&self) -> String {
        let path = self.file_path.as_deref().unwrap_or("unknown");
        let mut out = String::new();
        out.push_str(&format!(
            "   ┌─ writing: {} ({} lines, {} chars)\n",
            path, self.line_count, self.char_count
        ));
        if self.line_count > WINDOW_SIZE {
            out.push_str(&format!(
                "   │ ... ({} lines elided) ...\n",
                self.line_count - WINDOW_SIZE
            ));
        }
        for (num, content) in &self.window {
            out.push_str(&format!("   │ {:4} │ {}\n", num, truncate(content)));
        }
        if !self.line_buffer.is_empty() {
            out.push_str(&format!(
                "   │ {:4} │ {}▌\n",
                self.line_count + 1,
                truncate(&self.line_buffer)
            ));
        }
        out.push_str("   └─────────────────────────────────────────");
        out
    }
}

fn truncate(line: &str) -> String {
    if line.chars().count() > MAX_LINE_DISPLAY {
        let cut: String = line.chars().take(MAX_LINE_DISPLAY).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}

/// Pull a complete string field out of a possibly-truncated JSON buffer.
fn extract_string_field(raw: &str, key: &str) -> Option<String> {
    let needle = format!("\"{key}\"");
    let after = &raw[raw.find(&needle)? + needle.len()..];
    let after = after.trim_start();
    let after = after.strip_prefix(':')?.trim_start();
    let after = after.strip_prefix('"')?;
    let mut value = String::new();
    let mut escaped = false;
    for ch in after.chars() {
        if escaped {
            match ch {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                other => value.push(other),
            }
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == '"' {
            return Some(value);
        } else {
            value.push(ch);
        }
    }
    // Closing quote not seen yet.
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(preview: &mut EditStreamPreview, json: &str, chunk: usize) {
        let chars: Vec<char> = json.chars().collect();
        for piece in chars.chunks(chunk) {
            preview.feed(&piece.iter().collect::<String>());
        }
    }

    #[test]
    fn decodes_new_string_lines() {
        let mut p = EditStreamPreview::new();
        let json = r#"{"file_path": "src/lib.rs", "old_string": "", "new_string": "fn main() {\n    println!(\"hi\");\n}\n"}"#;
        feed_all(&mut p, json, 3);
        assert!(p.is_done());
        assert_eq!(p.line_count(), 3);
        assert_eq!(p.file_path(), Some("src/lib.rs"));
        let rendered = p.render();
        assert!(rendered.contains("fn main() {"));
        assert!(rendered.contains("println!(\"hi\");"));
    }

    #[test]
    fn window_keeps_only_recent_lines() {
        let mut p = EditStreamPreview::new();
        let body: String = (1..=9).map(|i| format!("line{i}\\n")).collect();
        let json = format!(r#"{{"new_string": "{body}"}}"#);
        feed_all(&mut p, &json, 1);
        assert_eq!(p.line_count(), 9);
        let rendered = p.render();
        assert!(rendered.contains("(4 lines elided)"));
        assert!(!rendered.contains("line4\n"));
        assert!(rendered.contains("line5"));
        assert!(rendered.contains("line9"));
    }

    #[test]
    fn escape_sequences_are_decoded() {
        let mut p = EditStreamPreview::new();
        let json = r#"{"new_string": "a\tb\\c\/d\rA"}"#;
        feed_all(&mut p, json, 2);
        assert!(p.is_done());
        let rendered = p.render();
        assert!(rendered.contains("a    b\\c/dA"));
    }

    #[test]
    fn value_ends_at_unescaped_quote() {
        let mut p = EditStreamPreview::new();
        p.feed(r#"{"new_string": "say \"hi\"", "old_string": "ignored"}"#);
        assert!(p.is_done());
        let rendered = p.render();
        assert!(rendered.contains("say \"hi\""));
        assert!(!rendered.contains("ignored"));
    }

    #[test]
    fn incomplete_stream_shows_in_progress_line() {
        let mut p = EditStreamPreview::new();
        p.feed(r#"{"new_string": "first\nsecond is still go"#);
        assert!(!p.is_done());
        assert_eq!(p.line_count(), 1);
        let rendered = p.render();
        assert!(rendered.contains("second is still go▌"));
    }

    #[test]
    fn content_before_key_is_not_previewed() {
        let mut p = EditStreamPreview::new();
        p.feed(r#"{"old_string": "do not show", "new_string": "show this"}"#);
        assert!(p.is_done());
        let rendered = p.render();
        assert!(rendered.contains("show this"));
        assert!(!rendered.contains("do not show"));
    }
}
