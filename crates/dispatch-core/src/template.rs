//! Prompt template resolution.
//!
//! Templates reference the run input as `{{input}}`, an earlier step's
//! output as `{{step}}`, and one agent's slice of a parallel step as
//! `{{step.agent}}`. Literal braces are written doubled: `{{{{` renders
//! as `{{` and `}}}}` as `}}`.

use std::collections::{BTreeMap, HashMap};

use crate::error::DispatchError;

/// A value a placeholder can resolve to.
#[derive(Debug, Clone)]
pub enum TemplateValue {
    /// Output of a single-agent step, or the run input.
    Text(String),
    /// Per-agent outputs of a parallel step.
    Map(BTreeMap<String, String>),
}

/// Named values available to a template.
#[derive(Debug, Clone, Default)]
pub struct TemplateEnv {
    values: HashMap<String, TemplateValue>,
}

impl TemplateEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_text(&mut self, name: &str, value: impl Into<String>) {
        self.values
            .insert(name.to_string(), TemplateValue::Text(value.into()));
    }

    pub fn set_map(&mut self, name: &str, value: BTreeMap<String, String>) {
        self.values
            .insert(name.to_string(), TemplateValue::Map(value));
    }

    pub fn get(&self, name: &str) -> Option<&TemplateValue> {
        self.values.get(name)
    }

    fn known_names(&self) -> String {
        let mut names: Vec<&str> = self.values.keys().map(|s| s.as_str()).collect();
        names.sort();
        if names.is_empty() {
            "none".to_string()
        } else {
            names.join(", ")
        }
    }
}

/// Resolve every placeholder in `template` against `env`.
///
/// Unknown or malformed references fail the whole resolution; a prompt
/// is never sent to an agent with a placeholder left in it.
pub fn resolve(template: &str, env: &TemplateEnv) -> Result<String, DispatchError> {
    let mut out = String::with_capacity(template.len());
    let mut i = 0;
    while i < template.len() {
        let rest = &template[i..];
        if rest.starts_with("{{{{") {
            out.push_str("{{");
            i += 4;
        } else if rest.starts_with("}}}}") {
            out.push_str("}}");
            i += 4;
        } else if rest.starts_with("{{") {
            let close = rest[2..].find("}}").ok_or_else(|| {
                DispatchError::Validation(format!(
                    "Unclosed placeholder in template: '{}'",
                    truncate(rest, 40)
                ))
            })?;
            let name = rest[2..2 + close].trim();
            out.push_str(&lookup(name, env)?);
            i += 2 + close + 2;
        } else if let Some(ch) = rest.chars().next() {
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    Ok(out)
}

fn lookup(name: &str, env: &TemplateEnv) -> Result<String, DispatchError> {
    if name.is_empty() {
        return Err(DispatchError::Validation(
            "Empty placeholder '{{}}' in template".to_string(),
        ));
    }

    if let Some((base, field)) = name.split_once('.') {
        return match env.get(base) {
            Some(TemplateValue::Map(outputs)) => outputs.get(field).cloned().ok_or_else(|| {
                let mut agents: Vec<&str> = outputs.keys().map(|s| s.as_str()).collect();
                agents.sort();
                DispatchError::Validation(format!(
                    "Placeholder '{}' names no output of step '{}' (available: {})",
                    name,
                    base,
                    agents.join(", ")
                ))
            }),
            Some(TemplateValue::Text(_)) => Err(DispatchError::Validation(format!(
                "Placeholder '{}' uses dotted form but '{}' is not a parallel step",
                name, base
            ))),
            None => Err(DispatchError::Validation(format!(
                "Unknown placeholder '{}' (known: {})",
                name,
                env.known_names()
            ))),
        };
    }

    match env.get(name) {
        Some(TemplateValue::Text(text)) => Ok(text.clone()),
        Some(TemplateValue::Map(outputs)) => {
            let mut agents: Vec<&str> = outputs.keys().map(|s| s.as_str()).collect();
            agents.sort();
            Err(DispatchError::Validation(format!(
                "'{}' is a parallel step; reference one agent's output as '{}.<agent>' ({})",
                name,
                name,
                agents.join(", ")
            )))
        }
        None => Err(DispatchError::Validation(format!(
            "Unknown placeholder '{}' (known: {})",
            name,
            env.known_names()
        ))),
    }
}

/// List every placeholder name in `template` without resolving it.
///
/// Escaped braces are skipped. Used to check references before a run.
pub fn collect_refs(template: &str) -> Result<Vec<String>, DispatchError> {
    let mut refs = Vec::new();
    let mut i = 0;
    while i < template.len() {
        let rest = &template[i..];
        if rest.starts_with("{{{{") || rest.starts_with("}}}}") {
            i += 4;
        } else if rest.starts_with("{{") {
            let close = rest[2..].find("}}").ok_or_else(|| {
                DispatchError::Validation(format!(
                    "Unclosed placeholder in template: '{}'",
                    truncate(rest, 40)
                ))
            })?;
            refs.push(rest[2..2 + close].trim().to_string());
            i += 2 + close + 2;
        } else if let Some(ch) = rest.chars().next() {
            i += ch.len_utf8();
        }
    }
    Ok(refs)
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> TemplateEnv {
        let mut env = TemplateEnv::new();
        env.set_text("input", "fix the bug");
        env.set_text("analyze", "root cause found");
        let mut reviews = BTreeMap::new();
        reviews.insert("claude".to_string(), "LGTM".to_string());
        reviews.insert("gemini".to_string(), "needs work".to_string());
        env.set_map("review", reviews);
        env
    }

    #[test]
    fn test_resolve_input_and_step() {
        let out = resolve("Task: {{input}}\nContext: {{analyze}}", &env()).unwrap();
        assert_eq!(out, "Task: fix the bug\nContext: root cause found");
    }

    #[test]
    fn test_resolve_dotted_parallel_ref() {
        let out = resolve("Claude said: {{review.claude}}", &env()).unwrap();
        assert_eq!(out, "Claude said: LGTM");
    }

    #[test]
    fn test_resolve_trims_inner_whitespace() {
        let out = resolve("{{ input }}", &env()).unwrap();
        assert_eq!(out, "fix the bug");
    }

    #[test]
    fn test_escaped_braces() {
        let out = resolve("json uses {{{{ and }}}} around {{input}}", &env()).unwrap();
        assert_eq!(out, "json uses {{ and }} around fix the bug");
    }

    #[test]
    fn test_resolution_idempotent() {
        let env = env();
        let once = resolve("Task: {{input}}, verdict: {{review.claude}}", &env).unwrap();
        let twice = resolve(&once, &env).unwrap();
        assert_eq!(twice, once);
        assert_eq!(once, "Task: fix the bug, verdict: LGTM");
    }

    #[test]
    fn test_substituted_braces_not_reexpanded() {
        let mut env = TemplateEnv::new();
        env.set_text("input", "the real value");
        env.set_text("plan", "next, send {{input}} to the agent");
        // The value's braces land verbatim even though 'input' resolves.
        let out = resolve("Step says: {{plan}}", &env).unwrap();
        assert_eq!(out, "Step says: next, send {{input}} to the agent");
    }

    #[test]
    fn test_unknown_placeholder_fails() {
        let err = resolve("{{missing}}", &env()).unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_bare_ref_to_parallel_step_lists_agents() {
        let err = resolve("{{review}}", &env()).unwrap_err();
        assert!(err.to_string().contains("claude, gemini"));
    }

    #[test]
    fn test_dotted_ref_to_single_step_fails() {
        let err = resolve("{{analyze.claude}}", &env()).unwrap_err();
        assert!(err.to_string().contains("not a parallel step"));
    }

    #[test]
    fn test_dotted_ref_unknown_agent_fails() {
        let err = resolve("{{review.codex}}", &env()).unwrap_err();
        assert!(err.to_string().contains("available: claude, gemini"));
    }

    #[test]
    fn test_unclosed_placeholder_fails() {
        let err = resolve("before {{input", &env()).unwrap_err();
        assert!(err.to_string().contains("Unclosed"));
    }

    #[test]
    fn test_collect_refs() {
        let refs = collect_refs("{{input}} then {{review.claude}} not {{{{this}}}}").unwrap();
        assert_eq!(refs, vec!["input", "review.claude"]);
    }
}
