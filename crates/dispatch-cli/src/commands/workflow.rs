//! `dispatch workflow` — run, validate, and inspect YAML workflows.

use std::time::Duration;

use dispatch_core::workflow::{validate, StepRecord, WorkflowDefinition, WorkflowExecutor};
use dispatch_core::{DispatchError, Dispatcher};

use crate::output::{self, OutputMode};

/// What to do with the loaded workflow.
#[derive(Debug, Clone)]
pub enum WorkflowAction {
    /// Execute it; with `extract_step` set, only that step and its
    /// dependencies run.
    Run { extract_step: Option<String> },
    /// Check the file and agent references, then stop.
    Validate,
    /// Resolve every prompt with stand-in outputs, spawning nothing.
    DryRun,
    /// Print each step's agents and dependencies.
    Describe,
}

pub async fn run(
    dispatcher: &Dispatcher,
    mode: OutputMode,
    file: &str,
    input: Option<String>,
    timeout: Option<u64>,
    action: WorkflowAction,
) -> Result<(), DispatchError> {
    let workflow = WorkflowDefinition::from_file(file)?;

    match action {
        WorkflowAction::Validate => validate_only(dispatcher, mode, file, &workflow),
        WorkflowAction::DryRun => dry_run(dispatcher, mode, &workflow, input.as_deref()),
        WorkflowAction::Describe => describe(dispatcher, mode, &workflow),
        WorkflowAction::Run { extract_step } => {
            execute(
                dispatcher,
                mode,
                &workflow,
                input.as_deref(),
                timeout,
                extract_step,
            )
            .await
        }
    }
}

async fn execute(
    dispatcher: &Dispatcher,
    mode: OutputMode,
    workflow: &WorkflowDefinition,
    input: Option<&str>,
    timeout: Option<u64>,
    extract_step: Option<String>,
) -> Result<(), DispatchError> {
    if mode.is_text() {
        println!("📄 Loaded workflow: {}", workflow.name);
        println!(
            "   {} step(s), on_failure: {}",
            workflow.steps.len(),
            on_failure_label(workflow)
        );
        println!();
    }

    let mut executor = WorkflowExecutor::new(dispatcher.clone());
    // Extracted runs report only the target step; dependencies are not
    // narrated either.
    executor.set_progress(mode.is_text() && extract_step.is_none());
    if let Some(secs) = timeout {
        executor.set_default_timeout(Duration::from_secs(secs));
    }

    let run = match extract_step {
        Some(target) => {
            let run = executor
                .execute_step_with_deps(workflow, &target, input)
                .await?;
            if mode.is_text() {
                for step in &run.steps {
                    print_step_output(step);
                }
            }
            run
        }
        None => executor.execute(workflow, input).await?,
    };

    output::render_workflow(mode, &run);

    if run.success {
        Ok(())
    } else {
        let failed: Vec<&str> = run
            .steps
            .iter()
            .filter(|s| s.error.is_some())
            .map(|s| s.name.as_str())
            .collect();
        Err(DispatchError::Agent(format!(
            "Workflow '{}' failed (failed steps: {})",
            run.name,
            if failed.is_empty() {
                "none".to_string()
            } else {
                failed.join(", ")
            }
        )))
    }
}

/// Validate the definition without executing anything.
fn validate_only(
    dispatcher: &Dispatcher,
    mode: OutputMode,
    file: &str,
    workflow: &WorkflowDefinition,
) -> Result<(), DispatchError> {
    validate(workflow, dispatcher.config())?;

    match mode {
        OutputMode::Json => {
            output::print_json(&verdict(file, workflow));
            return Ok(());
        }
        OutputMode::StreamJson => {
            output::print_event("summary", &verdict(file, workflow));
            return Ok(());
        }
        OutputMode::Text => {}
    }

    println!("✅ Workflow '{}' is valid", workflow.name);
    println!("   File: {}", file);
    println!("   Steps: {}", workflow.steps.len());
    println!("   On failure: {}", on_failure_label(workflow));

    for (i, step) in workflow.steps.iter().enumerate() {
        let agents = match (&step.agent, &step.parallel) {
            (Some(agent), _) => format!("agent: {}", agent),
            (None, Some(parallel)) => format!("parallel: {}", parallel.join(", ")),
            (None, None) => "no agent".to_string(),
        };
        println!("   {}. {} ({})", i + 1, step.name, agents);
    }

    Ok(())
}

fn dry_run(
    dispatcher: &Dispatcher,
    mode: OutputMode,
    workflow: &WorkflowDefinition,
    input: Option<&str>,
) -> Result<(), DispatchError> {
    let executor = WorkflowExecutor::new(dispatcher.clone());
    let planned = executor.dry_run(workflow, input)?;

    match mode {
        OutputMode::Json => {
            output::print_json(&planned);
            return Ok(());
        }
        OutputMode::StreamJson => {
            for invocation in &planned {
                output::print_event("planned", invocation);
            }
            return Ok(());
        }
        OutputMode::Text => {}
    }

    println!(
        "Dry run of '{}': {} invocation(s)",
        workflow.name,
        planned.len()
    );
    for invocation in &planned {
        println!("\n── {} / {} ──", invocation.step, invocation.agent);
        println!("{}", invocation.prompt);
    }
    Ok(())
}

fn describe(
    dispatcher: &Dispatcher,
    mode: OutputMode,
    workflow: &WorkflowDefinition,
) -> Result<(), DispatchError> {
    let executor = WorkflowExecutor::new(dispatcher.clone());
    let steps = executor.describe(workflow)?;

    match mode {
        OutputMode::Json => {
            output::print_json(&steps);
            return Ok(());
        }
        OutputMode::StreamJson => {
            output::print_event(
                "summary",
                &serde_json::json!({ "workflow": workflow.name, "steps": steps }),
            );
            return Ok(());
        }
        OutputMode::Text => {}
    }

    println!("Workflow '{}': {} step(s)", workflow.name, steps.len());
    for (i, step) in steps.iter().enumerate() {
        let shape = if step.parallel { "parallel" } else { "single" };
        let deps = if step.depends_on.is_empty() {
            "none".to_string()
        } else {
            step.depends_on.join(", ")
        };
        println!(
            "   {}. {} [{}] agents: {} (depends on: {})",
            i + 1,
            step.name,
            shape,
            step.agents.join(", "),
            deps
        );
    }
    Ok(())
}

/// Print an extracted step's output the way a single invocation would.
fn print_step_output(step: &StepRecord) {
    if let Some(output) = &step.output {
        println!("{}", output);
    }
    if let Some(outputs) = &step.outputs {
        for (agent, text) in outputs {
            println!("── {} ──", agent);
            println!("{}", text);
        }
    }
}

fn verdict(file: &str, workflow: &WorkflowDefinition) -> serde_json::Value {
    serde_json::json!({
        "file": file,
        "name": workflow.name,
        "valid": true,
        "steps": workflow.steps.len(),
    })
}

fn on_failure_label(workflow: &WorkflowDefinition) -> &'static str {
    match workflow.on_failure {
        dispatch_core::workflow::OnFailure::Abort => "abort",
        dispatch_core::workflow::OnFailure::Continue => "continue",
    }
}
