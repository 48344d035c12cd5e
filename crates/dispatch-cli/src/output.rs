//! Rendering of command results.
//!
//! Every command supports three renderings selected with `--output`:
//! `text` for humans (the default), `json` for one pretty-printed
//! object, and `stream-json` for line-delimited JSON, one event per
//! line. The JSON shapes are the serialized result structs from
//! dispatch-core, so they stay stable across commands.

use clap::ValueEnum;
use serde::Serialize;

use dispatch_core::{FanOutReport, InvocationResult, LoopReport, StopReason, WorkflowRun};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-readable text on stdout, diagnostics on stderr.
    Text,
    /// One pretty-printed JSON object on stdout.
    Json,
    /// Line-delimited JSON events on stdout.
    StreamJson,
}

impl OutputMode {
    /// True when human decorations (progress, tables, emoji) belong on
    /// stdout. Machine modes keep stdout parsable.
    pub fn is_text(&self) -> bool {
        matches!(self, OutputMode::Text)
    }
}

/// Pretty-prints any serializable value to stdout.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

/// Prints one compact JSON line tagged with a `type` field.
pub fn print_event<T: Serialize>(tag: &str, value: &T) {
    match serde_json::to_value(value) {
        Ok(mut value) => {
            if let Some(object) = value.as_object_mut() {
                object.insert("type".to_string(), tag.into());
            }
            println!("{}", value);
        }
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

/// Renders a single invocation. In text mode a successful reply goes
/// to stdout verbatim; failures are left to the caller's error path.
pub fn render_invocation(mode: OutputMode, result: &InvocationResult) {
    match mode {
        OutputMode::Text => {
            if result.success {
                println!("{}", result.text);
            }
        }
        OutputMode::Json => print_json(result),
        OutputMode::StreamJson => print_event("result", result),
    }
}

/// Renders a fan-out report as one section per agent.
pub fn render_fan_out(mode: OutputMode, report: &FanOutReport) {
    match mode {
        OutputMode::Json => print_json(report),
        OutputMode::StreamJson => {
            for name in &report.agents {
                if let Some(result) = report.results.get(name) {
                    print_event("result", result);
                }
            }
            print_event(
                "summary",
                &serde_json::json!({
                    "agents": report.agents,
                    "success": report.success,
                    "durationMs": report.duration_ms,
                }),
            );
        }
        OutputMode::Text => {
            for name in &report.agents {
                println!("── {} ──", name);
                match report.results.get(name) {
                    Some(result) if result.success => println!("{}\n", result.text),
                    Some(result) => {
                        let reason = result
                            .error
                            .as_ref()
                            .map(|e| e.message.clone())
                            .unwrap_or_else(|| "unknown failure".to_string());
                        println!("(failed: {})\n", reason);
                    }
                    None => println!("(not run)\n"),
                }
            }
            let succeeded = report.results.values().filter(|r| r.success).count();
            println!(
                "{} {}/{} agent(s) succeeded in {}ms",
                if report.success { "✅" } else { "❌" },
                succeeded,
                report.agents.len(),
                report.duration_ms
            );
        }
    }
}

/// Renders a workflow run footer. Per-step progress is printed live by
/// the executor in text mode, so this only summarizes the outcome.
pub fn render_workflow(mode: OutputMode, run: &WorkflowRun) {
    match mode {
        OutputMode::Json => print_json(run),
        OutputMode::StreamJson => {
            for step in &run.steps {
                print_event("step", step);
            }
            print_event(
                "summary",
                &serde_json::json!({
                    "name": run.name,
                    "success": run.success,
                    "sessionId": run.session_id,
                    "durationMs": run.duration_ms,
                }),
            );
        }
        OutputMode::Text => {
            if run.success {
                println!(
                    "\n✅ Workflow '{}' completed in {}ms (session: {})",
                    run.name, run.duration_ms, run.session_id
                );
                return;
            }
            let failed: Vec<&str> = run
                .steps
                .iter()
                .filter(|s| s.error.is_some())
                .map(|s| s.name.as_str())
                .collect();
            println!(
                "\n❌ Workflow '{}' failed after {}ms (failed steps: {})",
                run.name,
                run.duration_ms,
                if failed.is_empty() {
                    "none".to_string()
                } else {
                    failed.join(", ")
                }
            );
        }
    }
}

/// Renders a loop report footer.
pub fn render_loop(mode: OutputMode, report: &LoopReport) {
    match mode {
        OutputMode::Json => print_json(report),
        OutputMode::StreamJson => print_event("summary", report),
        OutputMode::Text => match report.stop_reason {
            StopReason::PlanComplete => println!(
                "\n🎉 Plan complete: {}/{} task(s) done after {} iteration(s) ({}ms)",
                report.tasks_total - report.tasks_remaining,
                report.tasks_total,
                report.iterations,
                report.duration_ms
            ),
            StopReason::MaxIterations => println!(
                "\n❌ Iteration cap reached with {} of {} task(s) still open",
                report.tasks_remaining, report.tasks_total
            ),
            StopReason::Error => println!(
                "\n❌ Loop stopped after {} iteration(s): {}",
                report.iterations,
                report.last_error.as_deref().unwrap_or("unknown error")
            ),
        },
    }
}
