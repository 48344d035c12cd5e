//! Core error type for the dispatch engine.
//!
//! `DispatchError` covers the terminal error classes the CLI maps to exit
//! codes. Per-invocation failures (non-zero exit, timeout, unparsable
//! output) are carried inside `InvocationResult` as an `InvocationError`
//! so callers can aggregate them instead of aborting.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown agent: {0}")]
    AgentNotFound(String),

    #[error("Agent failed: {0}")]
    Agent(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("All agents failed: {0}")]
    AllAgentsFailed(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl DispatchError {
    /// Process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            DispatchError::Agent(_) | DispatchError::Io(_) => 1,
            DispatchError::Config(_) => 2,
            DispatchError::Validation(_) => 3,
            DispatchError::AgentNotFound(_) => 4,
            DispatchError::Timeout(_) => 5,
            DispatchError::AllAgentsFailed(_) => 6,
        }
    }

    /// Whether a caller may reasonably retry the operation.
    pub fn retriable(&self) -> bool {
        matches!(self, DispatchError::Timeout(_))
    }
}

// ---------------------------------------------------------------------------
// Per-invocation failures
// ---------------------------------------------------------------------------

/// Classification of a single failed agent invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The process exited non-zero.
    Process,
    /// The process exceeded its time budget and was killed.
    Timeout,
    /// The process output could not be parsed in the declared format.
    Parse,
    /// The process could not be spawned at all.
    Spawn,
}

impl FailureKind {
    /// Timeouts and non-zero exits are transient agent conditions; spawn
    /// and parse failures indicate a broken setup and are not worth
    /// retrying unchanged.
    pub fn retriable(&self) -> bool {
        matches!(self, FailureKind::Process | FailureKind::Timeout)
    }
}

/// Machine-readable failure attached to an `InvocationResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationError {
    pub kind: FailureKind,
    pub message: String,
    pub retriable: bool,
}

impl InvocationError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            retriable: kind.retriable(),
            message: message.into(),
        }
    }

    /// Promote this per-call failure to a terminal error (for exit codes).
    pub fn to_dispatch_error(&self) -> DispatchError {
        match self.kind {
            FailureKind::Timeout => DispatchError::Timeout(self.message.clone()),
            _ => DispatchError::Agent(self.message.clone()),
        }
    }
}

impl std::fmt::Display for InvocationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}
