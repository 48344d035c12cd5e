//! Loop Controller — drives one agent against a plan file until done.
//!
//! Each iteration re-reads the prompt and plan from disk, so edits made
//! between iterations (by the agent or by hand) take effect on the next
//! pass. The loop stops before spawning anything once every checkbox is
//! complete, and a record of every iteration is appended to a JSONL log.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::agent::{Dispatcher, InvokeMode, InvokeOptions};
use crate::error::DispatchError;
use crate::loops::plan::{read_status, PlanStatus};
use crate::session::SessionStore;

/// Inputs for one loop run.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    pub agent: String,
    pub prompt_path: PathBuf,
    pub plan_path: PathBuf,
    pub max_iterations: u32,
    pub timeout: Duration,
    pub log_path: PathBuf,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every checkbox in the plan is complete.
    PlanComplete,
    /// The iteration cap was reached with work remaining.
    MaxIterations,
    /// A non-retriable failure or an unreadable file ended the loop.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationOutcome {
    Success,
    Failure,
    Timeout,
}

/// One line of the iteration log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub outcome: IterationOutcome,
    pub duration_ms: u64,
    pub tasks_total: usize,
    pub tasks_remaining: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final report for one loop run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopReport {
    pub agent: String,
    pub iterations: u32,
    pub stop_reason: StopReason,
    pub tasks_total: usize,
    pub tasks_remaining: usize,
    pub session_id: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// JSONL append-only writer for iteration records.
#[derive(Debug, Clone)]
pub struct IterationLog {
    path: PathBuf,
}

impl IterationLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single JSON line.
    pub async fn append(&self, record: &IterationRecord) -> Result<(), DispatchError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    DispatchError::Io(format!(
                        "Failed to create log directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let json = serde_json::to_string(record)
            .map_err(|e| DispatchError::Io(format!("Failed to serialize iteration: {}", e)))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                DispatchError::Io(format!(
                    "Failed to open log file '{}': {}",
                    self.path.display(),
                    e
                ))
            })?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| DispatchError::Io(format!("Failed to write log: {}", e)))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| DispatchError::Io(format!("Failed to write log: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| DispatchError::Io(format!("Failed to write log: {}", e)))?;
        Ok(())
    }

    /// Append a record, logging errors but never failing the loop.
    pub async fn append_safe(&self, record: &IterationRecord) {
        if let Err(e) = self.append(record).await {
            tracing::warn!("[IterationLog] Failed to write record: {}", e);
        }
    }
}

/// Runs the plan-driven convergence loop.
pub struct LoopController {
    dispatcher: Dispatcher,
    progress: bool,
}

impl LoopController {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            progress: false,
        }
    }

    pub fn set_progress(&mut self, progress: bool) {
        self.progress = progress;
    }

    /// Run iterations until the plan completes, the cap is hit, or a
    /// non-retriable failure occurs. Retriable failures (timeouts,
    /// non-zero exits) consume an iteration and keep going.
    pub async fn run(&self, opts: &LoopOptions) -> Result<LoopReport, DispatchError> {
        self.dispatcher.config().agent(&opts.agent)?;
        let base_prompt = std::fs::read_to_string(&opts.prompt_path).map_err(|e| {
            DispatchError::Config(format!(
                "Failed to read prompt file '{}': {}",
                opts.prompt_path.display(),
                e
            ))
        })?;
        let initial = read_status(&opts.plan_path)?;

        let log = IterationLog::new(&opts.log_path);
        let session_id = SessionStore::generate_id();
        let started = Instant::now();
        tracing::info!(
            "[Loop:{}] Starting: {} of {} task(s) open (cap: {}, session: {})",
            opts.agent,
            initial.incomplete(),
            initial.total,
            opts.max_iterations,
            session_id
        );

        let mut iterations: u32 = 0;
        let mut last_error: Option<String> = None;
        let mut status = initial;
        let stop_reason = loop {
            // Re-read both files: the agent rewrites the plan, and the
            // operator may rewrite the prompt mid-run.
            let prompt = match std::fs::read_to_string(&opts.prompt_path) {
                Ok(prompt) => prompt,
                Err(e) => {
                    last_error = Some(format!(
                        "Failed to read prompt file '{}': {}",
                        opts.prompt_path.display(),
                        e
                    ));
                    break StopReason::Error;
                }
            };
            status = match read_status(&opts.plan_path) {
                Ok(status) => status,
                Err(e) => {
                    last_error = Some(e.to_string());
                    break StopReason::Error;
                }
            };

            if status.is_complete() {
                break StopReason::PlanComplete;
            }
            if iterations >= opts.max_iterations {
                break StopReason::MaxIterations;
            }
            iterations += 1;

            if self.progress {
                println!(
                    "── Iteration {}/{} ({} task(s) open) ──",
                    iterations,
                    opts.max_iterations,
                    status.incomplete()
                );
            }

            let full_prompt = build_iteration_prompt(&prompt, &opts.plan_path, status);
            let mode = if self.continue_possible(&session_id, opts).await {
                InvokeMode::Continue
            } else {
                InvokeMode::Start
            };
            let invoke_opts = InvokeOptions {
                session_id: session_id.clone(),
                timeout: opts.timeout,
            };
            let iteration_started = Instant::now();
            let result = self
                .dispatcher
                .invoke(&opts.agent, &full_prompt, mode, &invoke_opts)
                .await?;

            let after = read_status(&opts.plan_path).unwrap_or(status);
            let error = result.error.clone();
            let record = IterationRecord {
                iteration: iterations,
                timestamp: Utc::now(),
                agent: opts.agent.clone(),
                outcome: match &error {
                    None => IterationOutcome::Success,
                    Some(e) if e.kind == crate::error::FailureKind::Timeout => {
                        IterationOutcome::Timeout
                    }
                    Some(_) => IterationOutcome::Failure,
                },
                duration_ms: iteration_started.elapsed().as_millis() as u64,
                tasks_total: after.total,
                tasks_remaining: after.incomplete(),
                error: error.as_ref().map(|e| e.message.clone()),
            };
            log.append_safe(&record).await;

            if self.progress {
                match &record.outcome {
                    IterationOutcome::Success => {
                        println!("   ✅ {} task(s) remaining", record.tasks_remaining)
                    }
                    _ => println!(
                        "   ❌ {}",
                        record.error.as_deref().unwrap_or("unknown failure")
                    ),
                }
                println!();
            }

            if let Some(error) = error {
                last_error = Some(error.message.clone());
                if !error.retriable {
                    break StopReason::Error;
                }
                tracing::warn!(
                    "[Loop:{}] Iteration {} failed (retriable): {}",
                    opts.agent,
                    iterations,
                    error.message
                );
            } else {
                last_error = None;
            }
        };

        tracing::info!(
            "[Loop:{}] Stopped after {} iteration(s): {:?}",
            opts.agent,
            iterations,
            stop_reason
        );

        Ok(LoopReport {
            agent: opts.agent.clone(),
            iterations,
            stop_reason,
            tasks_total: status.total,
            tasks_remaining: status.incomplete(),
            session_id,
            duration_ms: started.elapsed().as_millis() as u64,
            last_error,
        })
    }

    /// Continue only when the agent can resume and a handle is stored.
    async fn continue_possible(&self, session_id: &str, opts: &LoopOptions) -> bool {
        let has_continue = self
            .dispatcher
            .config()
            .agent(&opts.agent)
            .map(|a| a.continue_command.is_some())
            .unwrap_or(false);
        if !has_continue {
            return false;
        }
        matches!(
            self.dispatcher.sessions().get(session_id, &opts.agent).await,
            Ok(Some(_))
        )
    }
}

fn build_iteration_prompt(base: &str, plan_path: &Path, status: PlanStatus) -> String {
    format!(
        "{}\n\n\
         The plan file is at '{}'. {} of {} task(s) are incomplete.\n\
         Work on the next incomplete task: the first line matching '- [ ]'.\n\
         Complete exactly one task, then edit the plan file to mark it '- [x]'.\n\
         Do not start any other task.",
        base.trim_end(),
        plan_path.display(),
        status.incomplete(),
        status.total,
    )
}
