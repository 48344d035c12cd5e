//! YAML schema types for workflow definitions.
//!
//! A workflow YAML defines a multi-step agent pipeline:
//!
//! ```yaml
//! name: "Review Pipeline"
//! description: "Analyze a request, cross-review, then summarize"
//! on_failure: abort   # abort | continue
//!
//! steps:
//!   - name: analyze
//!     agent: claude
//!     prompt: "Analyze this change request: {{input}}"
//!
//!   - name: review
//!     parallel: [claude, gemini]
//!     prompt: "Review this analysis: {{analyze}}"
//!     require_all: true
//!
//!   - name: summarize
//!     agent: claude
//!     prompt: |
//!       Merge these reviews into one verdict.
//!       Claude: {{review.claude}}
//!       Gemini: {{review.gemini}}
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// Top-level workflow definition loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// What a step failure does to the rest of the run
    #[serde(default)]
    pub on_failure: OnFailure,

    /// Ordered list of workflow steps
    pub steps: Vec<WorkflowStep>,
}

/// What to do when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    /// Stop the workflow immediately (default)
    #[default]
    Abort,
    /// Keep running steps whose dependencies still succeeded
    Continue,
}

/// A single step in the pipeline.
///
/// Exactly one of `agent` or `parallel` must be set; validation
/// enforces this before anything runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step name (unique within the workflow, used for output references)
    pub name: String,

    /// Single-agent step: the agent to invoke
    #[serde(default)]
    pub agent: Option<String>,

    /// Parallel step: agents or groups to fan out to
    #[serde(default)]
    pub parallel: Option<Vec<String>>,

    /// Prompt template shared by every agent in the step
    #[serde(default)]
    pub prompt: Option<String>,

    /// Per-agent prompt templates (parallel steps only)
    #[serde(default)]
    pub prompts: Option<HashMap<String, String>>,

    /// Parallel steps: fail the step unless every agent succeeded
    #[serde(default)]
    pub require_all: bool,

    /// Timeout in seconds, overriding the configured default
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl WorkflowStep {
    /// Whether this is a fan-out step.
    pub fn is_parallel(&self) -> bool {
        self.parallel.is_some()
    }
}

impl WorkflowDefinition {
    /// Parse a workflow definition from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, DispatchError> {
        serde_yaml::from_str(yaml)
            .map_err(|e| DispatchError::Config(format!("Failed to parse workflow YAML: {}", e)))
    }

    /// Load a workflow definition from a file path.
    pub fn from_file(path: &str) -> Result<Self, DispatchError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DispatchError::Config(format!("Failed to read workflow file '{}': {}", path, e))
        })?;
        Self::from_yaml(&content)
    }

    /// Look up a step by name.
    pub fn step(&self, name: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_workflow() {
        let yaml = r#"
name: "Single Step"
steps:
  - name: analyze
    agent: claude
    prompt: "Analyze: {{input}}"
"#;
        let wf = WorkflowDefinition::from_yaml(yaml).unwrap();
        assert_eq!(wf.name, "Single Step");
        assert_eq!(wf.on_failure, OnFailure::Abort);
        assert_eq!(wf.steps.len(), 1);
        assert_eq!(wf.steps[0].agent.as_deref(), Some("claude"));
        assert!(!wf.steps[0].is_parallel());
    }

    #[test]
    fn test_parse_full_workflow() {
        let yaml = r#"
name: "Review Pipeline"
description: "Cross review"
on_failure: continue
steps:
  - name: analyze
    agent: claude
    prompt: "Analyze: {{input}}"
    timeout: 120
  - name: review
    parallel: [claude, gemini]
    prompts:
      claude: "Review as Claude: {{analyze}}"
      gemini: "Review as Gemini: {{analyze}}"
    require_all: true
  - name: summarize
    agent: claude
    prompt: "Merge: {{review.claude}} / {{review.gemini}}"
"#;
        let wf = WorkflowDefinition::from_yaml(yaml).unwrap();
        assert_eq!(wf.on_failure, OnFailure::Continue);
        assert_eq!(wf.steps.len(), 3);
        assert_eq!(wf.steps[0].timeout, Some(120));
        assert!(wf.steps[1].is_parallel());
        assert!(wf.steps[1].require_all);
        assert_eq!(
            wf.steps[1].prompts.as_ref().unwrap().get("gemini").unwrap(),
            "Review as Gemini: {{analyze}}"
        );
        assert!(wf.step("summarize").is_some());
        assert!(wf.step("missing").is_none());
    }

    #[test]
    fn test_bad_on_failure_rejected() {
        let yaml = r#"
name: "Bad"
on_failure: explode
steps:
  - name: one
    agent: claude
    prompt: "p"
"#;
        let err = WorkflowDefinition::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, DispatchError::Config(_)));
    }
}
