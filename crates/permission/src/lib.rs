//! Pattern-based permission engine.
//!
//! Every tool invocation names a permission (usually the tool name) and
//! one or more targets (a command line, a file path). Rules pair a
//! permission with a shell-style glob pattern and an action. The last
//! matching rule wins, with approvals granted at runtime taking
//! precedence over configured rules. When nothing matches, the engine
//! asks.

pub mod engine;

pub use engine::{default_rules, AskCallback, AskDecision, DenyAsk, PermissionEngine};
