//! Agent configuration and the agent registry.
//!
//! An `AgentConfig` is immutable after construction. Multiple agents
//! coexist in an `AgentManager` keyed by name; three builtins cover the
//! common workflows (`build`, `plan`, `explore`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::permission::PermissionRule;

/// Whether the agent is driven by the user or spawned by another agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    #[default]
    Primary,
    Subagent,
}

/// Configuration for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub mode: AgentMode,
    /// Default `provider/model` when the session does not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub permissions: Vec<PermissionRule>,
    /// Maximum loop steps per turn.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_steps() -> u32 {
    50
}

fn default_temperature() -> f32 {
    0.7
}

const BUILD_PROMPT: &str = r#"You are an expert software engineer with deep knowledge of programming languages, frameworks, and best practices.

You have access to tools that allow you to read, edit, and create files, as well as execute bash commands.

## Guidelines

1. **Understand First**: Before making changes, read relevant files to understand the codebase structure and conventions.
2. **Make Minimal Changes**: Only modify what's necessary to accomplish the task. Don't refactor unrelated code.
3. **Explain Your Actions**: Briefly explain what you're doing and why before using tools.
4. **Handle Errors Gracefully**: If a tool fails, analyze the error and try a different approach.
5. **Verify Your Work**: After making changes, consider running tests or checking that the code works as expected.

## Working Directory

You are working in: {working_dir}

## Current Date

{current_date}
"#;

const PLAN_PROMPT: &str = r#"You are a senior software architect focused ONLY on analysis and planning.

You must NOT execute tools that modify files. Your job is to reason, ask questions, and produce a plan.

## Strict Rules

- You may call ask_user for clarification when needed.
- You may use read/glob/list to inspect files (read-only tools).
- Do NOT call edit.
- If information is missing, ask the user first.
- Only after clarification, provide a plan.

## Output Format

When planning, respond with:
1. **Assumptions**
2. **Plan** (numbered steps)
3. **Risks & Edge Cases**
4. **Testing Suggestions**

## Working Directory

You are working in: {working_dir}
"#;

/// The default full-access development agent. Destructive shell commands
/// and dotenv edits still require confirmation.
pub fn build_agent(working_dir: &str) -> AgentConfig {
    let prompt = BUILD_PROMPT
        .replace("{working_dir}", working_dir)
        .replace(
            "{current_date}",
            &chrono::Utc::now().date_naive().to_string(),
        );
    AgentConfig {
        name: "build".into(),
        description: Some("Default agent for development work with full access".into()),
        mode: AgentMode::Primary,
        model: None,
        system_prompt: Some(prompt),
        permissions: vec![
            PermissionRule::allow("*", "*"),
            PermissionRule::ask("bash", "rm -rf *"),
            PermissionRule::ask("bash", "sudo *"),
            PermissionRule::ask("edit", "*.env"),
        ],
        max_steps: 50,
        temperature: 0.7,
    }
}

/// Read-only analysis agent.
pub fn plan_agent(working_dir: &str) -> AgentConfig {
    AgentConfig {
        name: "plan".into(),
        description: Some("Read-only agent for analysis and planning".into()),
        mode: AgentMode::Primary,
        model: None,
        system_prompt: Some(PLAN_PROMPT.replace("{working_dir}", working_dir)),
        permissions: vec![
            PermissionRule::allow("read", "*"),
            PermissionRule::allow("glob", "*"),
            PermissionRule::allow("list", "*"),
            PermissionRule::deny("edit", "*"),
            PermissionRule::ask("bash", "*"),
        ],
        max_steps: 30,
        temperature: 0.5,
    }
}

/// Fast read-only subagent for exploring codebases.
pub fn explore_agent() -> AgentConfig {
    AgentConfig {
        name: "explore".into(),
        description: Some("Fast agent for exploring codebases".into()),
        mode: AgentMode::Subagent,
        model: None,
        system_prompt: None,
        permissions: vec![
            PermissionRule::allow("read", "*"),
            PermissionRule::allow("glob", "*"),
            PermissionRule::allow("list", "*"),
            PermissionRule::allow("bash", "grep *"),
            PermissionRule::allow("bash", "find *"),
            PermissionRule::deny("edit", "*"),
        ],
        max_steps: 20,
        temperature: 0.3,
    }
}

/// Registry of agent configurations keyed by name.
pub struct AgentManager {
    agents: HashMap<String, AgentConfig>,
}

impl AgentManager {
    pub fn new(working_dir: &str) -> Self {
        let mut agents = HashMap::new();
        agents.insert("build".to_string(), build_agent(working_dir));
        agents.insert("plan".to_string(), plan_agent(working_dir));
        agents.insert("explore".to_string(), explore_agent());
        Self { agents }
    }

    pub fn get(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.get(name)
    }

    /// Register a custom agent, replacing a builtin of the same name.
    pub fn register(&mut self, agent: AgentConfig) {
        self.agents.insert(agent.name.clone(), agent);
    }

    pub fn list(&self) -> Vec<&AgentConfig> {
        self.agents.values().collect()
    }

    pub fn default_agent(&self) -> &AgentConfig {
        &self.agents["build"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::PermissionAction;

    #[test]
    fn builtin_agents_are_registered() {
        let mgr = AgentManager::new("/tmp/project");
        assert!(mgr.get("build").is_some());
        assert!(mgr.get("plan").is_some());
        assert!(mgr.get("explore").is_some());
        assert_eq!(mgr.default_agent().name, "build");
    }

    #[test]
    fn build_prompt_interpolates_working_dir() {
        let agent = build_agent("/home/dev/proj");
        let prompt = agent.system_prompt.unwrap();
        assert!(prompt.contains("/home/dev/proj"));
        assert!(!prompt.contains("{working_dir}"));
    }

    #[test]
    fn plan_agent_denies_edit() {
        let agent = plan_agent(".");
        let edit_rule = agent
            .permissions
            .iter()
            .find(|r| r.permission == "edit")
            .unwrap();
        assert_eq!(edit_rule.action, PermissionAction::Deny);
        assert_eq!(agent.mode, AgentMode::Primary);
    }

    #[test]
    fn explore_is_a_subagent() {
        assert_eq!(explore_agent().mode, AgentMode::Subagent);
    }

    #[test]
    fn custom_agent_replaces_builtin() {
        let mut mgr = AgentManager::new(".");
        let mut custom = explore_agent();
        custom.name = "build".into();
        custom.max_steps = 5;
        mgr.register(custom);
        assert_eq!(mgr.get("build").unwrap().max_steps, 5);
    }
}
