//! `dispatch loop` — run one agent repeatedly until its plan file has
//! no unchecked tasks left.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dispatch_core::loops::read_status;
use dispatch_core::{DispatchError, Dispatcher, LoopController, LoopOptions, StopReason};

use crate::output::{self, OutputMode};

#[allow(clippy::too_many_arguments)]
pub async fn run(
    dispatcher: &Dispatcher,
    mode: OutputMode,
    agent: &str,
    prompt: &str,
    plan: &str,
    validate: bool,
    max_iterations: u32,
    timeout: Option<u64>,
    log: Option<String>,
) -> Result<(), DispatchError> {
    let plan_path = PathBuf::from(plan);

    if validate {
        return validate_only(dispatcher, mode, agent, Path::new(prompt), &plan_path);
    }

    let log_path = match log {
        Some(path) => PathBuf::from(path),
        None => default_log_path(&plan_path),
    };

    let opts = LoopOptions {
        agent: agent.to_string(),
        prompt_path: PathBuf::from(prompt),
        plan_path,
        max_iterations,
        timeout: timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| dispatcher.config().timeout()),
        log_path,
    };

    let mut controller = LoopController::new(dispatcher.clone());
    controller.set_progress(mode.is_text());

    let report = controller.run(&opts).await?;
    output::render_loop(mode, &report);

    match report.stop_reason {
        StopReason::PlanComplete => Ok(()),
        StopReason::MaxIterations => Err(DispatchError::Agent(format!(
            "Iteration cap of {} reached with {} task(s) still open",
            max_iterations, report.tasks_remaining
        ))),
        StopReason::Error => Err(DispatchError::Agent(report.last_error.unwrap_or_else(
            || "Loop stopped on an unrecoverable error".to_string(),
        ))),
    }
}

/// Check the loop inputs without invoking anything: the agent must be
/// configured, the prompt file readable, and the plan file parsable.
fn validate_only(
    dispatcher: &Dispatcher,
    mode: OutputMode,
    agent: &str,
    prompt_path: &Path,
    plan_path: &Path,
) -> Result<(), DispatchError> {
    let definition = dispatcher.config().agent(agent)?;
    std::fs::read_to_string(prompt_path).map_err(|e| {
        DispatchError::Config(format!(
            "Failed to read prompt file '{}': {}",
            prompt_path.display(),
            e
        ))
    })?;
    let status = read_status(plan_path)?;

    match mode {
        OutputMode::Text => {
            println!("✅ Loop inputs are valid");
            println!("   Agent: {}", definition.name);
            println!("   Plan: {} task(s), {} open", status.total, status.incomplete());
        }
        OutputMode::Json => output::print_json(&verdict(&definition.name, status)),
        OutputMode::StreamJson => output::print_event("summary", &verdict(&definition.name, status)),
    }
    Ok(())
}

fn verdict(agent: &str, status: dispatch_core::loops::PlanStatus) -> serde_json::Value {
    serde_json::json!({
        "valid": true,
        "agent": agent,
        "tasksTotal": status.total,
        "tasksRemaining": status.incomplete(),
    })
}

/// Default log path: the plan file name with an `.iterations.jsonl`
/// suffix in place of its extension.
fn default_log_path(plan: &Path) -> PathBuf {
    let stem = plan.file_stem().and_then(|s| s.to_str()).unwrap_or("plan");
    plan.with_file_name(format!("{}.iterations.jsonl", stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_path_replaces_extension() {
        assert_eq!(
            default_log_path(Path::new("/work/plan.md")),
            PathBuf::from("/work/plan.iterations.jsonl")
        );
    }

    #[test]
    fn test_default_log_path_without_extension() {
        assert_eq!(
            default_log_path(Path::new("tasks")),
            PathBuf::from("tasks.iterations.jsonl")
        );
    }
}
