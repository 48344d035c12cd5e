//! `dispatch agent` — invoke one configured agent with a prompt.

use std::time::Duration;

use dispatch_core::{DispatchError, Dispatcher, InvokeMode, InvokeOptions, SessionStore};

use crate::output::{self, OutputMode};

pub async fn run(
    dispatcher: &Dispatcher,
    mode: OutputMode,
    name: &str,
    prompt: Option<String>,
    session: Option<String>,
    timeout: Option<u64>,
) -> Result<(), DispatchError> {
    let prompt = super::resolve_prompt(prompt)?;

    let opts = InvokeOptions {
        session_id: session.unwrap_or_else(SessionStore::generate_id),
        timeout: timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| dispatcher.config().timeout()),
    };

    let result = dispatcher
        .invoke(name, &prompt, InvokeMode::Start, &opts)
        .await?;
    output::render_invocation(mode, &result);

    if mode.is_text() && result.success {
        eprintln!("Session: {}", result.session_id);
    }

    match &result.error {
        Some(error) => Err(error.to_dispatch_error()),
        None => Ok(()),
    }
}
