//! Agent dispatcher — spawns configured agent CLIs and collects replies.
//!
//! Process-level failures (spawn, timeout, non-zero exit, unparsable
//! output) come back inside `InvocationResult` with `success: false` so
//! fan-out and workflow callers can keep going. Only dispatch-level
//! mistakes are `Err`: unknown agent, missing session handle, a broken
//! command template.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::agent::command::{build_command, CommandPlan, InvokeMode};
use crate::agent::output::parse_output;
use crate::config::ConfigStore;
use crate::error::{DispatchError, FailureKind, InvocationError};
use crate::session::SessionStore;

/// Options shared by every invocation path.
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    /// Dispatch session id the result is filed under.
    pub session_id: String,
    /// Wall-clock budget for the child process.
    pub timeout: Duration,
}

/// Outcome of one agent invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub agent: String,
    pub success: bool,
    /// Extracted reply text, or raw stdout when extraction failed.
    pub text: String,
    pub session_id: String,
    /// Native handle the agent's CLI reported, when it reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_session_id: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<InvocationError>,
}

/// Spawns agents defined in the config and records session handles.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: Arc<ConfigStore>,
    sessions: Arc<SessionStore>,
}

impl Dispatcher {
    pub fn new(config: Arc<ConfigStore>, sessions: Arc<SessionStore>) -> Self {
        Self { config, sessions }
    }

    /// Build a dispatcher whose session store lives where the config says.
    pub fn from_config(config: Arc<ConfigStore>) -> Self {
        let sessions = Arc::new(SessionStore::new(config.session_dir()));
        Self::new(config, sessions)
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Run one agent to completion and return its reply.
    ///
    /// In `Continue` mode the stored native handle for
    /// `(session_id, agent)` is substituted into the continue command;
    /// invoking continue without a stored handle is an error.
    pub async fn invoke(
        &self,
        agent_name: &str,
        prompt: &str,
        mode: InvokeMode,
        opts: &InvokeOptions,
    ) -> Result<InvocationResult, DispatchError> {
        let agent = self.config.agent(agent_name)?;

        let handle = match mode {
            InvokeMode::Start => None,
            InvokeMode::Continue => Some(
                self.sessions
                    .get(&opts.session_id, agent_name)
                    .await?
                    .ok_or_else(|| {
                        DispatchError::Validation(format!(
                            "Session '{}' has no stored handle for agent '{}'",
                            opts.session_id, agent_name
                        ))
                    })?,
            ),
        };

        let plan = build_command(agent, mode, prompt, handle.as_deref())?;
        tracing::info!(
            "[Dispatcher:{}] Spawning '{}' (timeout: {}s)",
            agent_name,
            plan.program,
            opts.timeout.as_secs()
        );
        tracing::debug!("[Dispatcher:{}] argv: {:?}", agent_name, plan.args);

        let started = Instant::now();
        let run = run_process(&plan, opts.timeout).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let run = match run {
            Ok(run) => run,
            Err(error) => {
                tracing::warn!("[Dispatcher:{}] {}", agent_name, error.message);
                return Ok(InvocationResult {
                    agent: agent_name.to_string(),
                    success: false,
                    text: String::new(),
                    session_id: opts.session_id.clone(),
                    agent_session_id: None,
                    duration_ms,
                    error: Some(error),
                });
            }
        };

        if !run.status.success() {
            let stderr = run.stderr.trim();
            let message = format!(
                "Exited with {}: {}",
                run.status,
                if stderr.is_empty() {
                    "(no stderr)"
                } else {
                    stderr
                }
            );
            tracing::warn!("[Dispatcher:{}] {}", agent_name, message);
            return Ok(InvocationResult {
                agent: agent_name.to_string(),
                success: false,
                text: run.stdout.trim().to_string(),
                session_id: opts.session_id.clone(),
                agent_session_id: None,
                duration_ms,
                error: Some(InvocationError::new(FailureKind::Process, message)),
            });
        }

        let parsed = match parse_output(agent.format, &run.stdout) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!("[Dispatcher:{}] {}", agent_name, error.message);
                return Ok(InvocationResult {
                    agent: agent_name.to_string(),
                    success: false,
                    text: run.stdout.trim().to_string(),
                    session_id: opts.session_id.clone(),
                    agent_session_id: None,
                    duration_ms,
                    error: Some(error),
                });
            }
        };

        if parsed.agent_reported_error {
            return Ok(InvocationResult {
                agent: agent_name.to_string(),
                success: false,
                text: parsed.text.clone(),
                session_id: opts.session_id.clone(),
                agent_session_id: parsed.native_session_id,
                duration_ms,
                error: Some(InvocationError::new(FailureKind::Process, parsed.text)),
            });
        }

        if let Some(native) = &parsed.native_session_id {
            self.sessions
                .put(&opts.session_id, agent_name, native)
                .await?;
        }

        tracing::info!(
            "[Dispatcher:{}] Completed in {}ms ({} chars)",
            agent_name,
            duration_ms,
            parsed.text.len()
        );

        Ok(InvocationResult {
            agent: agent_name.to_string(),
            success: true,
            text: parsed.text,
            session_id: opts.session_id.clone(),
            agent_session_id: parsed.native_session_id,
            duration_ms,
            error: None,
        })
    }
}

struct ProcessRun {
    status: std::process::ExitStatus,
    stdout: String,
    stderr: String,
}

/// Spawn the planned command, feed stdin, and wait with a timeout.
///
/// On timeout the child is killed before the error is returned.
/// `kill_on_drop` covers the cancellation path: a dropped invocation
/// future reaps its child instead of leaking it.
async fn run_process(plan: &CommandPlan, timeout: Duration) -> Result<ProcessRun, InvocationError> {
    let mut cmd = Command::new(&plan.program);
    cmd.args(&plan.args);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        InvocationError::new(
            FailureKind::Spawn,
            format!(
                "Failed to spawn '{}' - is it installed? Error: {}",
                plan.program, e
            ),
        )
    })?;

    // Deliver the prompt (or EOF) on stdin. A write error means the
    // child already died, which the exit status will report.
    let stdin = child.stdin.take();
    if let Some(mut stdin) = stdin {
        if let Some(payload) = &plan.stdin_payload {
            let _ = stdin.write_all(payload.as_bytes()).await;
        }
        let _ = stdin.shutdown().await;
    }

    let stdout_task = child.stdout.take().map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = String::new();
            let _ = pipe.read_to_string(&mut buf).await;
            buf
        })
    });
    let stderr_task = child.stderr.take().map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = String::new();
            let _ = pipe.read_to_string(&mut buf).await;
            buf
        })
    });

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            return Err(InvocationError::new(
                FailureKind::Spawn,
                format!("Failed to wait on '{}': {}", plan.program, e),
            ));
        }
        Err(_) => {
            let _ = child.kill().await;
            return Err(InvocationError::new(
                FailureKind::Timeout,
                format!("Timed out after {}s", timeout.as_secs()),
            ));
        }
    };

    let stdout = match stdout_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };
    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    Ok(ProcessRun {
        status,
        stdout,
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;

    fn dispatcher(config_toml: &str) -> (tempfile::TempDir, Dispatcher) {
        let tmp = tempfile::tempdir().unwrap();
        let config = Arc::new(ConfigStore::from_toml(config_toml).unwrap());
        let sessions = Arc::new(SessionStore::new(tmp.path().join("sessions")));
        (tmp, Dispatcher::new(config, sessions))
    }

    fn opts() -> InvokeOptions {
        InvokeOptions {
            session_id: SessionStore::generate_id(),
            timeout: Duration::from_secs(10),
        }
    }

    #[tokio::test]
    async fn test_invoke_echo_agent() {
        let (_tmp, dispatcher) = dispatcher(
            r#"
[agents.echo]
start = "echo {{prompt}}"
"#,
        );
        let result = dispatcher
            .invoke("echo", "hello world", InvokeMode::Start, &opts())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.text, "hello world");
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_invoke_prompt_over_stdin() {
        let (_tmp, dispatcher) = dispatcher(
            r#"
[agents.cat]
start = "cat"
"#,
        );
        let result = dispatcher
            .invoke("cat", "from stdin", InvokeMode::Start, &opts())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.text, "from stdin");
    }

    #[tokio::test]
    async fn test_invoke_nonzero_exit_is_soft_failure() {
        let (_tmp, dispatcher) = dispatcher(
            r#"
[agents.fail]
start = "false"
"#,
        );
        let result = dispatcher
            .invoke("fail", "anything", InvokeMode::Start, &opts())
            .await
            .unwrap();
        assert!(!result.success);
        let error = result.error.unwrap();
        assert_eq!(error.kind, FailureKind::Process);
        assert!(error.retriable);
    }

    #[tokio::test]
    async fn test_invoke_missing_binary_is_spawn_failure() {
        let (_tmp, dispatcher) = dispatcher(
            r#"
[agents.ghost]
start = "dispatch-test-no-such-binary {{prompt}}"
"#,
        );
        let result = dispatcher
            .invoke("ghost", "hi", InvokeMode::Start, &opts())
            .await
            .unwrap();
        assert!(!result.success);
        let error = result.error.unwrap();
        assert_eq!(error.kind, FailureKind::Spawn);
        assert!(!error.retriable);
    }

    #[tokio::test]
    async fn test_invoke_timeout_kills_child() {
        let (_tmp, dispatcher) = dispatcher(
            r#"
[agents.slow]
start = "sleep 30"
"#,
        );
        let mut opts = opts();
        opts.timeout = Duration::from_millis(100);
        let started = Instant::now();
        let result = dispatcher
            .invoke("slow", "hi", InvokeMode::Start, &opts)
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!result.success);
        assert_eq!(result.error.unwrap().kind, FailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_invoke_unknown_agent_is_hard_error() {
        let (_tmp, dispatcher) = dispatcher(
            r#"
[agents.echo]
start = "echo {{prompt}}"
"#,
        );
        let err = dispatcher
            .invoke("nope", "hi", InvokeMode::Start, &opts())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn test_continue_without_stored_handle_fails() {
        let (_tmp, dispatcher) = dispatcher(
            r#"
[agents.echo]
start = "echo {{prompt}}"
continue = "echo {{session}} {{prompt}}"
"#,
        );
        let err = dispatcher
            .invoke("echo", "more", InvokeMode::Continue, &opts())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[tokio::test]
    async fn test_session_handle_stored_and_reused() {
        let (_tmp, dispatcher) = dispatcher(
            r#"
[agents.fake]
start = "echo {\"type\":\"result\",\"result\":\"started\",\"session_id\":\"native-7\"}"
continue = "echo {\"type\":\"result\",\"result\":\"resumed:{{session}}\"}"
format = "stream-json"
"#,
        );
        let opts = opts();

        let result = dispatcher
            .invoke("fake", "go", InvokeMode::Start, &opts)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.agent_session_id.as_deref(), Some("native-7"));
        assert_eq!(
            dispatcher
                .sessions()
                .get(&opts.session_id, "fake")
                .await
                .unwrap()
                .as_deref(),
            Some("native-7")
        );

        // Continue substitutes the stored handle into the command.
        let result = dispatcher
            .invoke("fake", "more", InvokeMode::Continue, &opts)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.text, "resumed:native-7");
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = InvocationResult {
            agent: "a".to_string(),
            success: true,
            text: "t".to_string(),
            session_id: "s".to_string(),
            agent_session_id: None,
            duration_ms: 5,
            error: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"sessionId\""));
        assert!(json.contains("\"durationMs\""));
        assert!(!json.contains("\"error\""));
        assert!(!json.contains("\"agentSessionId\""));
    }

    #[test]
    fn test_output_format_passthrough() {
        // Formats are carried on the definition, not re-detected.
        let config = ConfigStore::from_toml(
            r#"
[agents.j]
start = "j"
format = "json"
"#,
        )
        .unwrap();
        assert_eq!(config.agent("j").unwrap().format, OutputFormat::Json);
    }
}
