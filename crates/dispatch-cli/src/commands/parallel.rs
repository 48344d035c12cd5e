//! `dispatch parallel` — fan one prompt out to several agents at once.

use std::time::Duration;

use dispatch_core::{
    dispatch_all, DispatchError, Dispatcher, FanOutOptions, InvokeOptions, PromptSource,
    SessionStore,
};

use crate::output::{self, OutputMode};

pub async fn run(
    dispatcher: &Dispatcher,
    mode: OutputMode,
    agents: Option<Vec<String>>,
    prompt: Option<String>,
    fail_fast: bool,
    require_all: bool,
    timeout: Option<u64>,
) -> Result<(), DispatchError> {
    let prompt = super::resolve_prompt(prompt)?;
    // Empty list falls back to settings.default_agents; groups expand here too.
    let names = dispatcher
        .config()
        .expand_agents(&agents.unwrap_or_default())?;

    let session_id = SessionStore::generate_id();
    let opts = FanOutOptions {
        invoke: InvokeOptions {
            session_id: session_id.clone(),
            timeout: timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| dispatcher.config().timeout()),
        },
        fail_fast,
        require_all,
    };

    let report = dispatch_all(dispatcher, &names, &PromptSource::Shared(prompt), &opts).await?;
    output::render_fan_out(mode, &report);

    if report.success {
        if mode.is_text() {
            eprintln!("Session: {}", session_id);
        }
        return Ok(());
    }
    if report.all_failed() {
        return Err(DispatchError::AllAgentsFailed(format!(
            "All {} agent(s) failed",
            report.agents.len()
        )));
    }
    let failed: Vec<&str> = report
        .results
        .iter()
        .filter(|(_, r)| !r.success)
        .map(|(name, _)| name.as_str())
        .collect();
    Err(DispatchError::Agent(format!(
        "{} agent(s) failed: {}",
        failed.len(),
        failed.join(", ")
    )))
}
