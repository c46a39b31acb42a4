//! Permission rule value objects.
//!
//! Rules are immutable once created. The evaluation engine lives in the
//! `clawsmith-permission` crate; this module only defines the data model
//! so rules can travel with sessions and agent configs.

use serde::{Deserialize, Serialize};

/// What to do when a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    Allow,
    Deny,
    Ask,
}

/// A single authorization rule: scope + target pattern + action.
///
/// `permission` names the category of action ("bash", "edit", "*", …);
/// `pattern` is a shell glob matched against the concrete target (command
/// text, file path, glob pattern). `*` matches any string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    pub permission: String,
    pub pattern: String,
    pub action: PermissionAction,
}

impl PermissionRule {
    pub fn new(
        permission: impl Into<String>,
        pattern: impl Into<String>,
        action: PermissionAction,
    ) -> Self {
        Self {
            permission: permission.into(),
            pattern: pattern.into(),
            action,
        }
    }

    pub fn allow(permission: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(permission, pattern, PermissionAction::Allow)
    }

    pub fn deny(permission: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(permission, pattern, PermissionAction::Deny)
    }

    pub fn ask(permission: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(permission, pattern, PermissionAction::Ask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_serialization_roundtrip() {
        let rule = PermissionRule::ask("bash", "rm *");
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains(r#""action":"ask""#));
        let back: PermissionRule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rule);
    }
}
