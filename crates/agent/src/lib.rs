//! The clawsmith agent runtime.
//!
//! `loop_runner` drives conversation turns; `assembler` folds provider
//! streams into step results; `retry` governs backoff for transient
//! provider failures; `preview` renders edit arguments while they are
//! still streaming in.

pub mod assembler;
pub mod loop_runner;
pub mod preview;
pub mod retry;

pub use assembler::{assemble, AssembledResponse, NullObserver, StreamObserver};
pub use loop_runner::{AbortRecovery, AgentLoop, RecoveryAction, RecoveryPrompt};
pub use preview::EditStreamPreview;
pub use retry::{classify, classify_text, ErrorClass, RetryConfig, RetryGovernor, STREAM_IDLE_TIMEOUT};
