//! Workflow Executor — runs a workflow definition step by step.
//!
//! The executor:
//! 1. Validates the definition against the agent config
//! 2. Resolves each step's prompt templates from earlier outputs
//! 3. Runs single steps sequentially and parallel steps as one fan-out
//! 4. Poisons steps whose dependencies failed instead of running them
//! 5. Stops at the first failure when `on_failure` is `abort`
//!
//! Agent failures stay inside the run report. A hard `Err` means the
//! run itself could not proceed (bad definition, unknown agent, broken
//! session store).

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::agent::{Dispatcher, InvokeMode, InvokeOptions};
use crate::error::DispatchError;
use crate::fanout::{dispatch_all, FanOutOptions, PromptSource};
use crate::session::SessionStore;
use crate::template::{resolve, TemplateEnv};
use crate::workflow::graph::{dependency_closure, step_dependencies, validate};
use crate::workflow::schema::{OnFailure, WorkflowDefinition, WorkflowStep};

/// Where a step ended up after the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Never ran: an earlier failure aborted the workflow first.
    Pending,
    Succeeded,
    Failed,
}

/// Result of one step.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub name: String,
    pub state: StepState,
    /// Single-agent step output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Parallel step outputs, successful agents only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<BTreeMap<String, String>>,
    pub duration_ms: u64,
    /// Failure detail; set on partial parallel success too.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of executing the entire workflow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub name: String,
    pub success: bool,
    pub session_id: String,
    pub duration_ms: u64,
    pub steps: Vec<StepRecord>,
}

/// One would-be invocation from a dry run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedInvocation {
    pub step: String,
    pub agent: String,
    pub prompt: String,
}

/// Static shape of one step, for `describe`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDescription {
    pub name: String,
    pub parallel: bool,
    pub agents: Vec<String>,
    pub depends_on: Vec<String>,
}

/// The workflow executor engine.
pub struct WorkflowExecutor {
    dispatcher: Dispatcher,
    /// Print step progress to stdout while running.
    progress: bool,
    /// Overrides the configured timeout for steps without their own.
    default_timeout: Option<Duration>,
}

impl WorkflowExecutor {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            progress: false,
            default_timeout: None,
        }
    }

    pub fn set_progress(&mut self, progress: bool) {
        self.progress = progress;
    }

    pub fn set_default_timeout(&mut self, timeout: Duration) {
        self.default_timeout = Some(timeout);
    }

    /// Execute a workflow definition.
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        input: Option<&str>,
    ) -> Result<WorkflowRun, DispatchError> {
        validate(workflow, self.dispatcher.config())?;

        let session_id = SessionStore::generate_id();
        let started = Instant::now();
        tracing::info!(
            "[Workflow:{}] Starting {} step(s) (session: {})",
            workflow.name,
            workflow.steps.len(),
            session_id
        );

        let mut env = TemplateEnv::new();
        env.set_text("input", input.unwrap_or_default());

        let mut records: Vec<StepRecord> = Vec::new();
        let mut failed_steps: HashSet<String> = HashSet::new();
        let mut aborted = false;

        for (i, step) in workflow.steps.iter().enumerate() {
            if aborted {
                records.push(StepRecord {
                    name: step.name.clone(),
                    state: StepState::Pending,
                    output: None,
                    outputs: None,
                    duration_ms: 0,
                    error: None,
                });
                continue;
            }

            if self.progress {
                println!(
                    "── Step {}/{}: {} ──",
                    i + 1,
                    workflow.steps.len(),
                    step.name
                );
            }

            let record = self
                .execute_step(step, &session_id, &mut env, &failed_steps)
                .await?;

            if self.progress {
                match record.state {
                    StepState::Succeeded => match &record.error {
                        Some(partial) => println!("   ✅ Success (partial: {})", partial),
                        None => println!("   ✅ Success"),
                    },
                    StepState::Failed => println!(
                        "   ❌ Failed: {}",
                        record.error.as_deref().unwrap_or("unknown")
                    ),
                    StepState::Pending => {}
                }
                println!();
            }

            if record.state == StepState::Failed {
                failed_steps.insert(step.name.clone());
                if workflow.on_failure == OnFailure::Abort {
                    aborted = true;
                }
            }
            records.push(record);
        }

        let success = records.iter().all(|r| r.state == StepState::Succeeded);
        tracing::info!(
            "[Workflow:{}] {} in {}ms",
            workflow.name,
            if success { "Completed" } else { "Failed" },
            started.elapsed().as_millis()
        );

        Ok(WorkflowRun {
            name: workflow.name.clone(),
            success,
            session_id,
            duration_ms: started.elapsed().as_millis() as u64,
            steps: records,
        })
    }

    /// Execute a single step against the accumulated environment.
    async fn execute_step(
        &self,
        step: &WorkflowStep,
        session_id: &str,
        env: &mut TemplateEnv,
        failed_steps: &HashSet<String>,
    ) -> Result<StepRecord, DispatchError> {
        // Poison instead of running when anything upstream failed.
        for dep in step_dependencies(step)? {
            if failed_steps.contains(&dep) {
                return Ok(StepRecord {
                    name: step.name.clone(),
                    state: StepState::Failed,
                    output: None,
                    outputs: None,
                    duration_ms: 0,
                    error: Some(format!("Dependency step '{}' failed", dep)),
                });
            }
        }

        let timeout = step
            .timeout
            .map(Duration::from_secs)
            .or(self.default_timeout)
            .unwrap_or_else(|| self.dispatcher.config().timeout());
        let opts = InvokeOptions {
            session_id: session_id.to_string(),
            timeout,
        };
        let started = Instant::now();

        if let Some(agent) = &step.agent {
            let prompt = match resolve(step.prompt.as_deref().unwrap_or_default(), env) {
                Ok(prompt) => prompt,
                Err(e) => return Ok(failed_record(step, started, e.to_string())),
            };

            let result = self
                .dispatcher
                .invoke(agent, &prompt, InvokeMode::Start, &opts)
                .await?;
            if result.success {
                env.set_text(&step.name, result.text.clone());
                return Ok(StepRecord {
                    name: step.name.clone(),
                    state: StepState::Succeeded,
                    output: Some(result.text),
                    outputs: None,
                    duration_ms: started.elapsed().as_millis() as u64,
                    error: None,
                });
            }
            let message = result
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "unknown failure".to_string());
            return Ok(failed_record(step, started, message));
        }

        // Parallel step: one fan-out, best-effort collection.
        let agents = self
            .dispatcher
            .config()
            .expand_agents(step.parallel.as_deref().unwrap_or_default())?;
        let prompts = match &step.prompts {
            Some(per_agent) => {
                let mut resolved = std::collections::HashMap::new();
                for agent in &agents {
                    let template = per_agent.get(agent).map(|s| s.as_str()).unwrap_or_default();
                    match resolve(template, env) {
                        Ok(prompt) => resolved.insert(agent.clone(), prompt),
                        Err(e) => return Ok(failed_record(step, started, e.to_string())),
                    };
                }
                PromptSource::PerAgent(resolved)
            }
            None => match resolve(step.prompt.as_deref().unwrap_or_default(), env) {
                Ok(prompt) => PromptSource::Shared(prompt),
                Err(e) => return Ok(failed_record(step, started, e.to_string())),
            },
        };

        let report = dispatch_all(
            &self.dispatcher,
            &agents,
            &prompts,
            &FanOutOptions {
                invoke: opts,
                fail_fast: false,
                require_all: step.require_all,
            },
        )
        .await?;

        let mut outputs: BTreeMap<String, String> = BTreeMap::new();
        let mut failures: Vec<String> = Vec::new();
        for (agent, result) in &report.results {
            if result.success {
                outputs.insert(agent.clone(), result.text.clone());
            } else {
                let reason = result
                    .error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "unknown failure".to_string());
                failures.push(format!("{}: {}", agent, reason));
            }
        }
        env.set_map(&step.name, outputs.clone());

        Ok(StepRecord {
            name: step.name.clone(),
            state: if report.success {
                StepState::Succeeded
            } else {
                StepState::Failed
            },
            output: None,
            outputs: Some(outputs),
            duration_ms: started.elapsed().as_millis() as u64,
            error: if failures.is_empty() {
                None
            } else {
                Some(failures.join("; "))
            },
        })
    }

    /// Run only `target` and the steps it transitively depends on.
    ///
    /// Dependencies execute internally; the returned run reports just
    /// the target step.
    pub async fn execute_step_with_deps(
        &self,
        workflow: &WorkflowDefinition,
        target: &str,
        input: Option<&str>,
    ) -> Result<WorkflowRun, DispatchError> {
        validate(workflow, self.dispatcher.config())?;
        let wanted = dependency_closure(workflow, target)?;
        let subset = WorkflowDefinition {
            name: format!("{} [{}]", workflow.name, target),
            description: workflow.description.clone(),
            on_failure: workflow.on_failure,
            steps: workflow
                .steps
                .iter()
                .filter(|s| wanted.contains(&s.name))
                .cloned()
                .collect(),
        };
        let mut run = self.execute(&subset, input).await?;
        run.steps.retain(|record| record.name == target);
        Ok(run)
    }

    /// Resolve every prompt with stand-in outputs, spawning nothing.
    pub fn dry_run(
        &self,
        workflow: &WorkflowDefinition,
        input: Option<&str>,
    ) -> Result<Vec<PlannedInvocation>, DispatchError> {
        validate(workflow, self.dispatcher.config())?;

        let mut env = TemplateEnv::new();
        env.set_text("input", input.unwrap_or("<input>"));

        let mut planned = Vec::new();
        for step in &workflow.steps {
            if let Some(agent) = &step.agent {
                planned.push(PlannedInvocation {
                    step: step.name.clone(),
                    agent: agent.clone(),
                    prompt: resolve(step.prompt.as_deref().unwrap_or_default(), &env)?,
                });
                env.set_text(&step.name, format!("<output of {}>", step.name));
                continue;
            }

            let agents = self
                .dispatcher
                .config()
                .expand_agents(step.parallel.as_deref().unwrap_or_default())?;
            let mut stand_ins = BTreeMap::new();
            for agent in &agents {
                let template = match &step.prompts {
                    Some(per_agent) => per_agent.get(agent).map(|s| s.as_str()).unwrap_or_default(),
                    None => step.prompt.as_deref().unwrap_or_default(),
                };
                planned.push(PlannedInvocation {
                    step: step.name.clone(),
                    agent: agent.clone(),
                    prompt: resolve(template, &env)?,
                });
                stand_ins.insert(
                    agent.clone(),
                    format!("<output of {}.{}>", step.name, agent),
                );
            }
            env.set_map(&step.name, stand_ins);
        }
        Ok(planned)
    }

    /// Static description of each step after validation.
    pub fn describe(
        &self,
        workflow: &WorkflowDefinition,
    ) -> Result<Vec<StepDescription>, DispatchError> {
        validate(workflow, self.dispatcher.config())?;

        workflow
            .steps
            .iter()
            .map(|step| {
                let agents = match (&step.agent, &step.parallel) {
                    (Some(agent), _) => vec![agent.clone()],
                    (None, Some(parallel)) => {
                        self.dispatcher.config().expand_agents(parallel)?
                    }
                    (None, None) => Vec::new(),
                };
                Ok(StepDescription {
                    name: step.name.clone(),
                    parallel: step.is_parallel(),
                    agents,
                    depends_on: step_dependencies(step)?,
                })
            })
            .collect()
    }
}

fn failed_record(step: &WorkflowStep, started: Instant, error: String) -> StepRecord {
    StepRecord {
        name: step.name.clone(),
        state: StepState::Failed,
        output: None,
        outputs: None,
        duration_ms: started.elapsed().as_millis() as u64,
        error: Some(error),
    }
}
