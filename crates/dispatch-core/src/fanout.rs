//! Parallel fan-out of one prompt (or per-agent prompts) to many agents.
//!
//! All invocations start concurrently. Default collection is
//! best-effort: every agent runs to completion and the report carries
//! one entry per agent. With `fail_fast` the first failure aborts the
//! run; in-flight children are killed when their futures drop. Results
//! are keyed by agent name so output is deterministic regardless of
//! completion order.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde::Serialize;

use crate::agent::{Dispatcher, InvocationResult, InvokeMode, InvokeOptions};
use crate::error::DispatchError;

/// Prompt assignment for a fan-out.
#[derive(Debug, Clone)]
pub enum PromptSource {
    /// Every agent receives the same prompt.
    Shared(String),
    /// Each agent receives its own prompt; coverage is checked up front.
    PerAgent(HashMap<String, String>),
}

impl PromptSource {
    fn for_agent(&self, name: &str) -> Option<&str> {
        match self {
            PromptSource::Shared(prompt) => Some(prompt),
            PromptSource::PerAgent(prompts) => prompts.get(name).map(|s| s.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FanOutOptions {
    pub invoke: InvokeOptions,
    /// Abort remaining invocations on the first failure.
    pub fail_fast: bool,
    /// Report success only when every agent succeeded.
    pub require_all: bool,
}

/// Outcome of one fan-out, keyed by agent name.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutReport {
    /// Agents the fan-out was asked to run, in request order.
    pub agents: Vec<String>,
    /// One entry per finished invocation. Under `fail_fast`, agents
    /// aborted before finishing have no entry.
    pub results: BTreeMap<String, InvocationResult>,
    pub success: bool,
    pub duration_ms: u64,
}

impl FanOutReport {
    /// True when every requested agent finished and failed.
    pub fn all_failed(&self) -> bool {
        !self.agents.is_empty()
            && self
                .agents
                .iter()
                .all(|name| self.results.get(name).map(|r| !r.success).unwrap_or(false))
    }
}

/// Invoke every agent concurrently and collect their results.
///
/// Unknown agents and missing per-agent prompts fail before anything
/// spawns.
pub async fn dispatch_all(
    dispatcher: &Dispatcher,
    agents: &[String],
    prompts: &PromptSource,
    opts: &FanOutOptions,
) -> Result<FanOutReport, DispatchError> {
    if agents.is_empty() {
        return Err(DispatchError::Validation(
            "No agents to dispatch".to_string(),
        ));
    }
    for name in agents {
        dispatcher.config().agent(name)?;
        if prompts.for_agent(name).is_none() {
            return Err(DispatchError::Validation(format!(
                "No prompt given for agent '{}'",
                name
            )));
        }
    }

    tracing::info!(
        "[FanOut] Dispatching {} agent(s): {}",
        agents.len(),
        agents.join(", ")
    );
    let started = Instant::now();

    let mut tasks = FuturesUnordered::new();
    for name in agents {
        let name = name.clone();
        let prompt = prompts
            .for_agent(&name)
            .map(|s| s.to_string())
            .unwrap_or_default();
        let invoke_opts = opts.invoke.clone();
        tasks.push(async move {
            let result = dispatcher
                .invoke(&name, &prompt, InvokeMode::Start, &invoke_opts)
                .await;
            (name, result)
        });
    }

    let mut results: BTreeMap<String, InvocationResult> = BTreeMap::new();
    let mut aborted = false;
    while let Some((name, result)) = tasks.next().await {
        let result = result?;
        let failed = !result.success;
        results.insert(name.clone(), result);
        if failed && opts.fail_fast {
            tracing::warn!("[FanOut] '{}' failed, aborting remaining invocations", name);
            aborted = true;
            // Dropping the stream cancels in-flight futures; their
            // children are reaped via kill_on_drop.
            drop(tasks);
            break;
        }
        tracing::debug!("[FanOut] '{}' finished ({}/{})", name, results.len(), agents.len());
    }

    let complete = !aborted && results.len() == agents.len();
    let any_failed = results.values().any(|r| !r.success);
    let success = if opts.fail_fast || opts.require_all {
        complete && !any_failed
    } else {
        results.values().any(|r| r.success)
    };

    Ok(FanOutReport {
        agents: agents.to_vec(),
        results,
        success,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::session::SessionStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn dispatcher() -> (tempfile::TempDir, Dispatcher) {
        let tmp = tempfile::tempdir().unwrap();
        let config = Arc::new(
            ConfigStore::from_toml(
                r#"
[agents.echo]
start = "echo {{prompt}}"

[agents.cat]
start = "cat"

[agents.bad]
start = "false"

[agents.slow]
start = "sleep 30"
"#,
            )
            .unwrap(),
        );
        let sessions = Arc::new(SessionStore::new(tmp.path().join("sessions")));
        (tmp, Dispatcher::new(config, sessions))
    }

    fn opts(fail_fast: bool, require_all: bool) -> FanOutOptions {
        FanOutOptions {
            invoke: InvokeOptions {
                session_id: SessionStore::generate_id(),
                timeout: Duration::from_secs(10),
            },
            fail_fast,
            require_all,
        }
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_shared_prompt_reaches_every_agent() {
        let (_tmp, dispatcher) = dispatcher();
        let report = dispatch_all(
            &dispatcher,
            &names(&["echo", "cat"]),
            &PromptSource::Shared("same task".to_string()),
            &opts(false, false),
        )
        .await
        .unwrap();

        assert!(report.success);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.results["echo"].text, "same task");
        assert_eq!(report.results["cat"].text, "same task");
    }

    #[tokio::test]
    async fn test_best_effort_keeps_going_past_failure() {
        let (_tmp, dispatcher) = dispatcher();
        let report = dispatch_all(
            &dispatcher,
            &names(&["bad", "echo"]),
            &PromptSource::Shared("task".to_string()),
            &opts(false, false),
        )
        .await
        .unwrap();

        assert!(report.success);
        assert_eq!(report.results.len(), 2);
        assert!(!report.results["bad"].success);
        assert!(report.results["echo"].success);
        assert!(!report.all_failed());
    }

    #[tokio::test]
    async fn test_require_all_fails_on_any_failure() {
        let (_tmp, dispatcher) = dispatcher();
        let report = dispatch_all(
            &dispatcher,
            &names(&["bad", "echo"]),
            &PromptSource::Shared("task".to_string()),
            &opts(false, true),
        )
        .await
        .unwrap();

        assert!(!report.success);
        assert_eq!(report.results.len(), 2);
    }

    #[tokio::test]
    async fn test_all_failed_detected() {
        let (_tmp, dispatcher) = dispatcher();
        let report = dispatch_all(
            &dispatcher,
            &names(&["bad"]),
            &PromptSource::Shared("task".to_string()),
            &opts(false, false),
        )
        .await
        .unwrap();

        assert!(!report.success);
        assert!(report.all_failed());
    }

    #[tokio::test]
    async fn test_fail_fast_aborts_inflight_agents() {
        let (_tmp, dispatcher) = dispatcher();
        let started = Instant::now();
        let report = dispatch_all(
            &dispatcher,
            &names(&["slow", "bad"]),
            &PromptSource::Shared("task".to_string()),
            &opts(true, false),
        )
        .await
        .unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!report.success);
        assert!(report.results.contains_key("bad"));
        assert!(!report.results.contains_key("slow"));
        // Aborted agents never finished, so this is not an all-failed run.
        assert!(!report.all_failed());
    }

    #[tokio::test]
    async fn test_per_agent_prompts() {
        let (_tmp, dispatcher) = dispatcher();
        let mut prompts = HashMap::new();
        prompts.insert("echo".to_string(), "for echo".to_string());
        prompts.insert("cat".to_string(), "for cat".to_string());
        let report = dispatch_all(
            &dispatcher,
            &names(&["echo", "cat"]),
            &PromptSource::PerAgent(prompts),
            &opts(false, false),
        )
        .await
        .unwrap();

        assert_eq!(report.results["echo"].text, "for echo");
        assert_eq!(report.results["cat"].text, "for cat");
    }

    #[tokio::test]
    async fn test_missing_per_agent_prompt_fails_before_spawn() {
        let (_tmp, dispatcher) = dispatcher();
        let mut prompts = HashMap::new();
        prompts.insert("echo".to_string(), "only one".to_string());
        let err = dispatch_all(
            &dispatcher,
            &names(&["echo", "cat"]),
            &PromptSource::PerAgent(prompts),
            &opts(false, false),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DispatchError::Validation(_)));
        assert!(err.to_string().contains("cat"));
    }

    #[tokio::test]
    async fn test_unknown_agent_fails_before_spawn() {
        let (_tmp, dispatcher) = dispatcher();
        let err = dispatch_all(
            &dispatcher,
            &names(&["echo", "ghost"]),
            &PromptSource::Shared("task".to_string()),
            &opts(false, false),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DispatchError::AgentNotFound(_)));
    }
}
