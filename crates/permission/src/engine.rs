use std::sync::Arc;

use async_trait::async_trait;
use globset::GlobBuilder;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use clawsmith_core::{PermissionAction, PermissionCheck, PermissionError, PermissionRule};

/// What the user decided when asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskDecision {
    Allow,
    Deny,
    /// Allow and remember for the rest of the session.
    Always,
}

/// Prompts the user for a permission decision. The CLI implements this
/// against the terminal; tests implement it with canned answers.
#[async_trait]
pub trait AskCallback: Send + Sync {
    async fn ask(
        &self,
        permission: &str,
        target: &str,
        metadata: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> AskDecision;
}

/// Denies everything it is asked about. Used when no interactive
/// callback is available (subagents, non-interactive runs).
pub struct DenyAsk;

#[async_trait]
impl AskCallback for DenyAsk {
    async fn ask(
        &self,
        _permission: &str,
        _target: &str,
        _metadata: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> AskDecision {
        AskDecision::Deny
    }
}

/// Conservative ruleset applied when an agent defines none.
pub fn default_rules() -> Vec<PermissionRule> {
    vec![
        PermissionRule::allow("*", "*"),
        PermissionRule::ask("bash", "rm *"),
        PermissionRule::ask("bash", "sudo *"),
        PermissionRule::ask("edit", "*.env"),
        PermissionRule::ask("edit", "*.env.*"),
        PermissionRule::ask("doom_loop", "*"),
    ]
}

fn pattern_matches(pattern: &str, target: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    // Shell-style matching where `*` crosses path separators.
    match GlobBuilder::new(pattern).build() {
        Ok(glob) => glob.compile_matcher().is_match(target),
        Err(err) => {
            warn!(pattern, %err, "invalid permission pattern, treating as non-match");
            false
        }
    }
}

/// Evaluates tool invocations against configured and runtime-approved
/// rules. Shared across concurrent tool executions via `Arc`.
pub struct PermissionEngine {
    rules: Vec<PermissionRule>,
    approved: Mutex<Vec<PermissionRule>>,
    ask: Arc<dyn AskCallback>,
}

impl PermissionEngine {
    pub fn new(rules: Vec<PermissionRule>, ask: Arc<dyn AskCallback>) -> Self {
        Self {
            rules,
            approved: Mutex::new(Vec::new()),
            ask,
        }
    }

    pub fn with_defaults(ask: Arc<dyn AskCallback>) -> Self {
        Self::new(default_rules(), ask)
    }

    /// Decide the action for one permission/target pair. Scans rules
    /// newest-first so later rules override earlier ones; runtime
    /// approvals are newer than anything configured.
    pub async fn evaluate(&self, permission: &str, target: &str) -> PermissionAction {
        let approved = self.approved.lock().await;
        for rule in approved.iter().rev().chain(self.rules.iter().rev()) {
            // The scope is a glob too, so a rule scoped `bash*` covers
            // the `bash` permission.
            if (rule.permission == permission || pattern_matches(&rule.permission, permission))
                && pattern_matches(&rule.pattern, target)
            {
                debug!(
                    permission,
                    target,
                    pattern = %rule.pattern,
                    action = ?rule.action,
                    "permission rule matched"
                );
                return rule.action;
            }
        }
        PermissionAction::Ask
    }

    /// Evaluate every target and prompt where required. Returns an error
    /// as soon as any target is denied or rejected.
    pub async fn check(
        &self,
        permission: &str,
        targets: &[String],
        metadata: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<(), PermissionError> {
        for target in targets {
            match self.evaluate(permission, target).await {
                PermissionAction::Allow => {}
                PermissionAction::Deny => {
                    return Err(PermissionError::Denied {
                        permission: permission.to_string(),
                        pattern: target.clone(),
                    });
                }
                PermissionAction::Ask => {
                    match self.ask.ask(permission, target, metadata).await {
                        AskDecision::Allow => {}
                        AskDecision::Always => {
                            self.approved
                                .lock()
                                .await
                                .push(PermissionRule::allow(permission, target.clone()));
                        }
                        AskDecision::Deny => {
                            return Err(PermissionError::Rejected {
                                permission: permission.to_string(),
                                pattern: target.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Append a rule; because the scan is newest-first it overrides any
    /// earlier rule for the same targets.
    pub fn add_rule(&mut self, rule: PermissionRule) {
        self.rules.push(rule);
    }

    pub fn merge_rules(&mut self, rules: impl IntoIterator<Item = PermissionRule>) {
        self.rules.extend(rules);
    }

    pub fn rules(&self) -> &[PermissionRule] {
        &self.rules
    }
}

#[async_trait]
impl PermissionCheck for PermissionEngine {
    async fn check(
        &self,
        permission: &str,
        targets: &[String],
        metadata: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<(), PermissionError> {
        PermissionEngine::check(self, permission, targets, metadata).await
    }
}
