//! Dispatch Core — domain logic for orchestrating external agent CLIs.
//!
//! This crate contains everything the `dispatch` binary does minus the
//! terminal surface: agent configuration, process dispatch, parallel
//! fan-out, workflow execution, session persistence, and plan-driven
//! loops. It has no CLI dependency, making it usable from:
//!
//! - The `dispatch` CLI (via `dispatch-cli`)
//! - Integration tests driving orchestration directly
//! - Other tools embedding agent orchestration

pub mod agent;
pub mod config;
pub mod error;
pub mod fanout;
pub mod loops;
pub mod session;
pub mod template;
pub mod workflow;

// Convenience re-exports
pub use agent::{Dispatcher, InvocationResult, InvokeMode, InvokeOptions};
pub use config::ConfigStore;
pub use error::{DispatchError, FailureKind, InvocationError};
pub use fanout::{dispatch_all, FanOutOptions, FanOutReport, PromptSource};
pub use loops::{LoopController, LoopOptions, LoopReport, StopReason};
pub use session::{SessionRecord, SessionStore};
pub use workflow::{WorkflowDefinition, WorkflowExecutor, WorkflowRun};
