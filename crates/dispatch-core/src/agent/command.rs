//! Command construction for agent processes.
//!
//! A command template like `claude -p {{prompt}}` is split on whitespace
//! first, then `{{prompt}}` and `{{session}}` are substituted per token,
//! so a prompt with spaces stays a single argv entry and never passes
//! through a shell. Templates without `{{prompt}}` receive the prompt on
//! stdin instead.

use crate::config::{AgentDefinition, OutputFormat};
use crate::error::DispatchError;

pub const PROMPT_PLACEHOLDER: &str = "{{prompt}}";
pub const SESSION_PLACEHOLDER: &str = "{{session}}";

/// Whether an invocation starts a fresh conversation or resumes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeMode {
    Start,
    Continue,
}

/// A fully resolved process invocation, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPlan {
    pub program: String,
    pub args: Vec<String>,
    /// Prompt payload for stdin when the template has no `{{prompt}}`.
    pub stdin_payload: Option<String>,
}

/// Build the argv for one agent invocation.
pub fn build_command(
    agent: &AgentDefinition,
    mode: InvokeMode,
    prompt: &str,
    session_handle: Option<&str>,
) -> Result<CommandPlan, DispatchError> {
    let template = match mode {
        InvokeMode::Start => agent.start.as_str(),
        InvokeMode::Continue => agent.continue_command.as_deref().ok_or_else(|| {
            DispatchError::Validation(format!(
                "Agent '{}' has no continue command; it cannot resume sessions",
                agent.name
            ))
        })?,
    };

    let template = resolve_env_vars(template);
    let wants_prompt = template.contains(PROMPT_PLACEHOLDER);
    let wants_session = template.contains(SESSION_PLACEHOLDER);

    if wants_session && session_handle.is_none() {
        return Err(DispatchError::Validation(format!(
            "Command for agent '{}' references {} but no session handle is available",
            agent.name, SESSION_PLACEHOLDER
        )));
    }

    let mut tokens: Vec<String> = Vec::new();
    for token in template.split_whitespace() {
        tokens.push(fill_token(token, prompt, session_handle));
    }
    for flag in &agent.flags {
        tokens.push(resolve_env_vars(flag));
    }

    if tokens.is_empty() {
        return Err(DispatchError::Config(format!(
            "Agent '{}' has an empty command template",
            agent.name
        )));
    }

    let program = tokens.remove(0);
    Ok(CommandPlan {
        program,
        args: tokens,
        stdin_payload: if wants_prompt {
            None
        } else {
            Some(prompt.to_string())
        },
    })
}

/// Substitute both placeholders in one pass over the template token.
/// Substituted values are copied verbatim and never rescanned, so a
/// prompt containing the literal text `{{session}}` stays intact.
fn fill_token(token: &str, prompt: &str, session_handle: Option<&str>) -> String {
    let mut out = String::with_capacity(token.len());
    let mut rest = token;
    loop {
        let prompt_hit = rest
            .find(PROMPT_PLACEHOLDER)
            .map(|at| (at, PROMPT_PLACEHOLDER, prompt));
        let session_hit = session_handle.and_then(|handle| {
            rest.find(SESSION_PLACEHOLDER)
                .map(|at| (at, SESSION_PLACEHOLDER, handle))
        });
        let next = match (prompt_hit, session_hit) {
            (Some(p), Some(s)) => Some(if s.0 < p.0 { s } else { p }),
            (p, s) => p.or(s),
        };
        let (at, placeholder, value) = match next {
            Some(hit) => hit,
            None => break,
        };
        out.push_str(&rest[..at]);
        out.push_str(value);
        rest = &rest[at + placeholder.len()..];
    }
    out.push_str(rest);
    out
}

/// Resolve environment variable references in a string.
/// Supports `${ENV_VAR}` and `${ENV_VAR:-default}` syntax.
pub fn resolve_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_expr = &caps[1];
        if let Some(idx) = var_expr.find(":-") {
            let var_name = &var_expr[..idx];
            let default_val = &var_expr[idx + 2..];
            std::env::var(var_name).unwrap_or_else(|_| default_val.to_string())
        } else {
            std::env::var(var_expr).unwrap_or_else(|_| format!("${{{}}}", var_expr))
        }
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(start: &str, continue_command: Option<&str>) -> AgentDefinition {
        AgentDefinition {
            name: "claude".to_string(),
            start: start.to_string(),
            continue_command: continue_command.map(|s| s.to_string()),
            format: OutputFormat::Text,
            flags: vec![],
        }
    }

    #[test]
    fn test_prompt_stays_one_arg() {
        let plan = build_command(
            &agent("claude -p {{prompt}}", None),
            InvokeMode::Start,
            "hello world",
            None,
        )
        .unwrap();
        assert_eq!(plan.program, "claude");
        assert_eq!(plan.args, vec!["-p", "hello world"]);
        assert_eq!(plan.stdin_payload, None);
    }

    #[test]
    fn test_prompt_embedded_in_token() {
        let plan = build_command(
            &agent("run --prompt={{prompt}}", None),
            InvokeMode::Start,
            "a b",
            None,
        )
        .unwrap();
        assert_eq!(plan.args, vec!["--prompt=a b"]);
    }

    #[test]
    fn test_stdin_fallback_without_placeholder() {
        let plan = build_command(&agent("mycli run", None), InvokeMode::Start, "task", None).unwrap();
        assert_eq!(plan.program, "mycli");
        assert_eq!(plan.args, vec!["run"]);
        assert_eq!(plan.stdin_payload.as_deref(), Some("task"));
    }

    #[test]
    fn test_continue_substitutes_session_handle() {
        let plan = build_command(
            &agent("claude -p {{prompt}}", Some("claude --resume {{session}} -p {{prompt}}")),
            InvokeMode::Continue,
            "go on",
            Some("sess-42"),
        )
        .unwrap();
        assert_eq!(plan.args, vec!["--resume", "sess-42", "-p", "go on"]);
    }

    #[test]
    fn test_prompt_containing_session_placeholder_stays_verbatim() {
        let plan = build_command(
            &agent(
                "claude -p {{prompt}}",
                Some("claude --resume {{session}} -p {{prompt}}"),
            ),
            InvokeMode::Continue,
            "explain the literal token {{session}} please",
            Some("native-9"),
        )
        .unwrap();
        assert_eq!(
            plan.args,
            vec![
                "--resume",
                "native-9",
                "-p",
                "explain the literal token {{session}} please"
            ]
        );
    }

    #[test]
    fn test_continue_without_template_fails() {
        let err = build_command(
            &agent("claude -p {{prompt}}", None),
            InvokeMode::Continue,
            "go on",
            Some("sess-42"),
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
        assert!(err.to_string().contains("no continue command"));
    }

    #[test]
    fn test_session_placeholder_without_handle_fails() {
        let err = build_command(
            &agent("claude --resume {{session}}", None),
            InvokeMode::Start,
            "p",
            None,
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[test]
    fn test_flags_appended_after_template() {
        let mut def = agent("claude -p {{prompt}}", None);
        def.flags = vec!["--model".to_string(), "opus".to_string()];
        let plan = build_command(&def, InvokeMode::Start, "hi", None).unwrap();
        assert_eq!(plan.args, vec!["-p", "hi", "--model", "opus"]);
    }

    #[test]
    fn test_env_vars_resolved_in_template() {
        std::env::set_var("DISPATCH_TEST_BIN", "/opt/bin/claude");
        let plan = build_command(
            &agent("${DISPATCH_TEST_BIN} -p {{prompt}}", None),
            InvokeMode::Start,
            "hi",
            None,
        )
        .unwrap();
        assert_eq!(plan.program, "/opt/bin/claude");
        std::env::remove_var("DISPATCH_TEST_BIN");

        let plan = build_command(
            &agent("${DISPATCH_MISSING_BIN:-claude} -p {{prompt}}", None),
            InvokeMode::Start,
            "hi",
            None,
        )
        .unwrap();
        assert_eq!(plan.program, "claude");
    }
}
