//! `dispatch continue` — send a follow-up prompt into a stored session.

use std::time::Duration;

use dispatch_core::{DispatchError, Dispatcher, InvokeMode, InvokeOptions};

use crate::output::{self, OutputMode};

pub async fn run(
    dispatcher: &Dispatcher,
    mode: OutputMode,
    session_id: &str,
    prompt: Option<String>,
    agent: Option<String>,
    timeout: Option<u64>,
) -> Result<(), DispatchError> {
    let prompt = super::resolve_prompt(prompt)?;
    let agent = match agent {
        Some(name) => name,
        None => sole_agent(dispatcher, session_id).await?,
    };

    let opts = InvokeOptions {
        session_id: session_id.to_string(),
        timeout: timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| dispatcher.config().timeout()),
    };

    let result = dispatcher
        .invoke(&agent, &prompt, InvokeMode::Continue, &opts)
        .await?;
    output::render_invocation(mode, &result);

    match &result.error {
        Some(error) => Err(error.to_dispatch_error()),
        None => Ok(()),
    }
}

/// Pick the agent to resume when `--agent` was not given. Only works
/// when the session holds exactly one handle.
async fn sole_agent(dispatcher: &Dispatcher, session_id: &str) -> Result<String, DispatchError> {
    let record = dispatcher
        .sessions()
        .load(session_id)
        .await?
        .ok_or_else(|| {
            DispatchError::Validation(format!("No session found with id '{}'", session_id))
        })?;

    let mut agents: Vec<&String> = record.agents.keys().collect();
    agents.sort();
    match agents.as_slice() {
        [] => Err(DispatchError::Validation(format!(
            "Session '{}' has no stored agent handles",
            session_id
        ))),
        [only] => Ok(only.to_string()),
        many => Err(DispatchError::Validation(format!(
            "Session '{}' has handles for several agents ({}); pick one with --agent",
            session_id,
            many.iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}
