//! Ask-user tool — the model asks the user a set of questions.

use async_trait::async_trait;
use tracing::warn;

use clawsmith_core::error::ToolError;
use clawsmith_core::tool::{Tool, ToolContext, ToolOutput};

/// Presents one question to the user and returns the selected options.
/// The CLI implements this against the terminal; tests use canned
/// answers.
#[async_trait]
pub trait QuestionPrompt: Send + Sync {
    async fn ask(
        &self,
        index: usize,
        question: &str,
        multi: bool,
        options: &[String],
    ) -> Vec<String>;
}

/// Reads numeric selections from stdin.
pub struct StdinPrompt;

#[async_trait]
impl QuestionPrompt for StdinPrompt {
    async fn ask(
        &self,
        index: usize,
        question: &str,
        multi: bool,
        options: &[String],
    ) -> Vec<String> {
        println!("\nQ{index}. {question}");
        for (i, opt) in options.iter().enumerate() {
            println!("  {}. {opt}", i + 1);
        }
        if multi {
            println!("Select options (comma-separated numbers):");
        } else {
            println!("Select one option (number):");
        }

        let options = options.to_vec();
        let line = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
            line
        })
        .await
        .unwrap_or_default();

        let mut selected = Vec::new();
        for part in line.split(',') {
            if let Ok(i) = part.trim().parse::<usize>()
                && (1..=options.len()).contains(&i)
            {
                selected.push(options[i - 1].clone());
                if !multi {
                    break;
                }
            }
        }
        selected
    }
}

pub struct AskUserTool {
    prompt: Box<dyn QuestionPrompt>,
}

impl AskUserTool {
    pub fn new(prompt: Box<dyn QuestionPrompt>) -> Self {
        Self { prompt }
    }
}

impl Default for AskUserTool {
    fn default() -> Self {
        Self::new(Box::new(StdinPrompt))
    }
}

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &str {
        "ask_user"
    }

    fn description(&self) -> &str {
        "Use this when you need to confirm uncertain content or user \
         preferences. Ask the user a set of questions (single or multi-choice) \
         and return answers. Questions will be asked one by one in the terminal."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Optional title for the questionnaire"
                },
                "questions": {
                    "type": "array",
                    "description": "List of questions to ask",
                    "items": {
                        "type": "object",
                        "properties": {
                            "question": {
                                "type": "string",
                                "description": "The question text"
                            },
                            "type": {
                                "type": "string",
                                "enum": ["single", "multi"],
                                "description": "single or multi choice"
                            },
                            "options": {
                                "type": "array",
                                "items": {"type": "string"},
                                "description": "List of options"
                            }
                        },
                        "required": ["question", "type", "options"]
                    }
                }
            },
            "required": ["questions"]
        })
    }

    async fn execute(
        &self,
        input: &serde_json::Map<String, serde_json::Value>,
        _ctx: &mut ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let title = input
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let questions = input
            .get("questions")
            .and_then(|v| v.as_array())
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("no questions provided".into()))?;

        let mut answers = Vec::new();
        let mut summary_lines = Vec::new();
        for (idx, q) in questions.iter().enumerate() {
            let question = q
                .get("question")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .trim()
                .to_string();
            let multi = q.get("type").and_then(|v| v.as_str()) == Some("multi");
            let options: Vec<String> = q
                .get("options")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|o| o.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();

            if question.is_empty() || options.is_empty() {
                warn!(index = idx + 1, "skipping malformed question");
                answers.push(serde_json::json!({
                    "question": question,
                    "selected": [],
                    "error": "invalid_question"
                }));
                continue;
            }

            let selected = self.prompt.ask(idx + 1, &question, multi, &options).await;
            summary_lines.push(if selected.is_empty() {
                format!("- {question}: (no selection)")
            } else {
                format!("- {question}: {}", selected.join(", "))
            });
            answers.push(serde_json::json!({
                "question": question,
                "type": if multi { "multi" } else { "single" },
                "selected": selected
            }));
        }

        let count = answers.len();
        let result = serde_json::json!({
            "title": title,
            "answers": answers,
            "summary": summary_lines.join("\n")
        });

        let mut out = ToolOutput::text(result.to_string());
        out.title = if title.is_empty() {
            "ask_user_result".to_string()
        } else {
            title.to_string()
        };
        out.metadata.insert("count".into(), serde_json::json!(count));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::allow_all_context;

    struct FirstOption;

    #[async_trait]
    impl QuestionPrompt for FirstOption {
        async fn ask(
            &self,
            _index: usize,
            _question: &str,
            _multi: bool,
            options: &[String],
        ) -> Vec<String> {
            options.first().cloned().into_iter().collect()
        }
    }

    #[tokio::test]
    async fn answers_fold_into_json_summary() {
        let tool = AskUserTool::new(Box::new(FirstOption));
        let mut ctx = allow_all_context();
        let input = serde_json::json!({
            "title": "Setup",
            "questions": [
                {"question": "Language?", "type": "single", "options": ["Rust", "Go"]},
                {"question": "License?", "type": "single", "options": ["MIT"]}
            ]
        });
        let out = tool
            .execute(input.as_object().unwrap(), &mut ctx)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out.output).unwrap();
        assert_eq!(parsed["answers"][0]["selected"][0], "Rust");
        assert!(parsed["summary"].as_str().unwrap().contains("License?: MIT"));
        assert_eq!(out.title, "Setup");
    }

    #[tokio::test]
    async fn empty_questions_are_invalid() {
        let tool = AskUserTool::new(Box::new(FirstOption));
        let mut ctx = allow_all_context();
        let input = serde_json::json!({"questions": []});
        let err = tool
            .execute(input.as_object().unwrap(), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn malformed_question_is_recorded_not_fatal() {
        let tool = AskUserTool::new(Box::new(FirstOption));
        let mut ctx = allow_all_context();
        let input = serde_json::json!({
            "questions": [
                {"question": "", "type": "single", "options": ["a"]},
                {"question": "Real?", "type": "single", "options": ["yes"]}
            ]
        });
        let out = tool
            .execute(input.as_object().unwrap(), &mut ctx)
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out.output).unwrap();
        assert_eq!(parsed["answers"][0]["error"], "invalid_question");
        assert_eq!(parsed["answers"][1]["selected"][0], "yes");
    }
}
