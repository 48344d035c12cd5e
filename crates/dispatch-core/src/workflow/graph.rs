//! Structural validation of workflow definitions.
//!
//! Every rule here runs before any process spawns: step names are
//! unique, each step is either single-agent or parallel, prompts cover
//! their agents, and template references only point at strictly earlier
//! steps. A valid workflow is therefore a DAG that sequential execution
//! can always satisfy.

use std::collections::{HashMap, HashSet};

use crate::config::ConfigStore;
use crate::error::DispatchError;
use crate::template::collect_refs;
use crate::workflow::schema::{WorkflowDefinition, WorkflowStep};

/// The run input placeholder available to every step.
pub const INPUT_REF: &str = "input";

/// Check a workflow against the agent configuration.
pub fn validate(def: &WorkflowDefinition, config: &ConfigStore) -> Result<(), DispatchError> {
    if def.steps.is_empty() {
        return Err(DispatchError::Validation(
            "Workflow has no steps".to_string(),
        ));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for step in &def.steps {
        if step.name.is_empty() {
            return Err(DispatchError::Validation(
                "Step name cannot be empty".to_string(),
            ));
        }
        if step.name == INPUT_REF {
            return Err(DispatchError::Validation(format!(
                "'{}' is reserved and cannot be used as a step name",
                INPUT_REF
            )));
        }
        if step.name.contains('.') {
            return Err(DispatchError::Validation(format!(
                "Step name '{}' cannot contain '.'",
                step.name
            )));
        }
        if !seen.insert(&step.name) {
            return Err(DispatchError::Validation(format!(
                "Duplicate step name '{}'",
                step.name
            )));
        }
    }

    // Expanded agent list per parallel step, for dotted-reference checks.
    let mut parallel_agents: HashMap<&str, Vec<String>> = HashMap::new();

    for (index, step) in def.steps.iter().enumerate() {
        check_shape(step, config, &mut parallel_agents)?;
        check_refs(def, index, &parallel_agents)?;
    }

    Ok(())
}

fn check_shape<'a>(
    step: &'a WorkflowStep,
    config: &ConfigStore,
    parallel_agents: &mut HashMap<&'a str, Vec<String>>,
) -> Result<(), DispatchError> {
    match (&step.agent, &step.parallel) {
        (Some(agent), None) => {
            config.agent(agent)?;
            if step.prompt.is_none() {
                return Err(DispatchError::Validation(format!(
                    "Step '{}' needs a prompt",
                    step.name
                )));
            }
            if step.prompts.is_some() {
                return Err(DispatchError::Validation(format!(
                    "Single-agent step '{}' cannot use per-agent prompts",
                    step.name
                )));
            }
        }
        (None, Some(parallel)) => {
            if parallel.is_empty() {
                return Err(DispatchError::Validation(format!(
                    "Step '{}' has an empty parallel list",
                    step.name
                )));
            }
            let expanded = config.expand_agents(parallel)?;
            match (&step.prompt, &step.prompts) {
                (Some(_), None) => {}
                (None, Some(prompts)) => {
                    for key in prompts.keys() {
                        if !expanded.contains(key) {
                            return Err(DispatchError::Validation(format!(
                                "Step '{}': prompts entry '{}' is not in the parallel list",
                                step.name, key
                            )));
                        }
                    }
                    for agent in &expanded {
                        if !prompts.contains_key(agent) {
                            return Err(DispatchError::Validation(format!(
                                "Step '{}': no prompt for agent '{}'",
                                step.name, agent
                            )));
                        }
                    }
                }
                _ => {
                    return Err(DispatchError::Validation(format!(
                        "Parallel step '{}' must set exactly one of 'prompt' or 'prompts'",
                        step.name
                    )));
                }
            }
            parallel_agents.insert(&step.name, expanded);
        }
        _ => {
            return Err(DispatchError::Validation(format!(
                "Step '{}' must set exactly one of 'agent' or 'parallel'",
                step.name
            )));
        }
    }
    Ok(())
}

fn check_refs(
    def: &WorkflowDefinition,
    index: usize,
    parallel_agents: &HashMap<&str, Vec<String>>,
) -> Result<(), DispatchError> {
    let step = &def.steps[index];
    let earlier: HashMap<&str, usize> = def
        .steps
        .iter()
        .take(index)
        .enumerate()
        .map(|(i, s)| (s.name.as_str(), i))
        .collect();
    let all_names: HashSet<&str> = def.steps.iter().map(|s| s.name.as_str()).collect();

    for reference in step_refs(step)? {
        let (base, field) = match reference.split_once('.') {
            Some((base, field)) => (base, Some(field)),
            None => (reference.as_str(), None),
        };

        if base == INPUT_REF {
            if field.is_some() {
                return Err(DispatchError::Validation(format!(
                    "Step '{}' references '{}' but '{}' has no per-agent outputs",
                    step.name, reference, INPUT_REF
                )));
            }
            continue;
        }

        if !earlier.contains_key(base) {
            if all_names.contains(base) {
                return Err(DispatchError::Validation(format!(
                    "Step '{}' references '{}' before it has run; forward or cyclic references are not allowed",
                    step.name, base
                )));
            }
            return Err(DispatchError::Validation(format!(
                "Step '{}' references unknown step '{}'",
                step.name, base
            )));
        }

        match (field, parallel_agents.get(base)) {
            (None, Some(_)) => {
                return Err(DispatchError::Validation(format!(
                    "Step '{}' references parallel step '{}' without naming an agent ('{}.<agent>')",
                    step.name, base, base
                )));
            }
            (Some(agent), Some(agents)) => {
                if !agents.contains(&agent.to_string()) {
                    return Err(DispatchError::Validation(format!(
                        "Step '{}' references '{}' but step '{}' only runs: {}",
                        step.name,
                        reference,
                        base,
                        agents.join(", ")
                    )));
                }
            }
            (Some(_), None) => {
                return Err(DispatchError::Validation(format!(
                    "Step '{}' references '{}' but step '{}' is not a parallel step",
                    step.name, reference, base
                )));
            }
            (None, None) => {}
        }
    }
    Ok(())
}

/// Every template reference a step makes, in order of appearance.
pub fn step_refs(step: &WorkflowStep) -> Result<Vec<String>, DispatchError> {
    let mut refs = Vec::new();
    if let Some(prompt) = &step.prompt {
        refs.extend(collect_refs(prompt)?);
    }
    if let Some(prompts) = &step.prompts {
        let mut keys: Vec<&String> = prompts.keys().collect();
        keys.sort();
        for key in keys {
            refs.extend(collect_refs(&prompts[key])?);
        }
    }
    Ok(refs)
}

/// Names of earlier steps a step depends on, deduplicated.
pub fn step_dependencies(step: &WorkflowStep) -> Result<Vec<String>, DispatchError> {
    let mut deps: Vec<String> = Vec::new();
    for reference in step_refs(step)? {
        let base = reference
            .split_once('.')
            .map(|(base, _)| base)
            .unwrap_or(&reference);
        if base != INPUT_REF && !deps.iter().any(|d| d == base) {
            deps.push(base.to_string());
        }
    }
    Ok(deps)
}

/// The target step plus everything it transitively depends on, in
/// definition order.
pub fn dependency_closure(
    def: &WorkflowDefinition,
    target: &str,
) -> Result<Vec<String>, DispatchError> {
    if def.step(target).is_none() {
        let names: Vec<&str> = def.steps.iter().map(|s| s.name.as_str()).collect();
        return Err(DispatchError::Validation(format!(
            "Workflow has no step '{}' (steps: {})",
            target,
            names.join(", ")
        )));
    }

    let mut wanted: HashSet<String> = HashSet::new();
    let mut frontier = vec![target.to_string()];
    while let Some(name) = frontier.pop() {
        if !wanted.insert(name.clone()) {
            continue;
        }
        if let Some(step) = def.step(&name) {
            frontier.extend(step_dependencies(step)?);
        }
    }

    Ok(def
        .steps
        .iter()
        .filter(|s| wanted.contains(&s.name))
        .map(|s| s.name.clone())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::schema::WorkflowDefinition;

    fn config() -> ConfigStore {
        ConfigStore::from_toml(
            r#"
[agents.claude]
start = "claude -p {{prompt}}"

[agents.gemini]
start = "gemini -p {{prompt}}"

[groups]
reviewers = ["claude", "gemini"]
"#,
        )
        .unwrap()
    }

    fn workflow(yaml: &str) -> WorkflowDefinition {
        WorkflowDefinition::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_valid_pipeline_passes() {
        let def = workflow(
            r#"
name: "ok"
steps:
  - name: analyze
    agent: claude
    prompt: "Analyze: {{input}}"
  - name: review
    parallel: [reviewers]
    prompt: "Review: {{analyze}}"
  - name: summarize
    agent: claude
    prompt: "{{review.claude}} vs {{review.gemini}}"
"#,
        );
        validate(&def, &config()).unwrap();
    }

    #[test]
    fn test_duplicate_step_names_rejected() {
        let def = workflow(
            r#"
name: "dup"
steps:
  - name: a
    agent: claude
    prompt: "one"
  - name: a
    agent: claude
    prompt: "two"
"#,
        );
        let err = validate(&def, &config()).unwrap_err();
        assert!(err.to_string().contains("Duplicate step name"));
    }

    #[test]
    fn test_step_needs_exactly_one_kind() {
        let both = workflow(
            r#"
name: "both"
steps:
  - name: a
    agent: claude
    parallel: [gemini]
    prompt: "p"
"#,
        );
        assert!(validate(&both, &config()).is_err());

        let neither = workflow(
            r#"
name: "neither"
steps:
  - name: a
    prompt: "p"
"#,
        );
        assert!(validate(&neither, &config()).is_err());
    }

    #[test]
    fn test_forward_reference_rejected() {
        let def = workflow(
            r#"
name: "fwd"
steps:
  - name: first
    agent: claude
    prompt: "uses {{second}}"
  - name: second
    agent: claude
    prompt: "fine {{input}}"
"#,
        );
        let err = validate(&def, &config()).unwrap_err();
        assert!(err.to_string().contains("forward or cyclic"));
    }

    #[test]
    fn test_self_reference_rejected() {
        let def = workflow(
            r#"
name: "self"
steps:
  - name: only
    agent: claude
    prompt: "{{only}}"
"#,
        );
        let err = validate(&def, &config()).unwrap_err();
        assert!(err.to_string().contains("forward or cyclic"));
    }

    #[test]
    fn test_bare_ref_to_parallel_step_rejected() {
        let def = workflow(
            r#"
name: "bare"
steps:
  - name: review
    parallel: [claude, gemini]
    prompt: "Review {{input}}"
  - name: merge
    agent: claude
    prompt: "{{review}}"
"#,
        );
        let err = validate(&def, &config()).unwrap_err();
        assert!(err.to_string().contains("without naming an agent"));
    }

    #[test]
    fn test_dotted_ref_to_single_step_rejected() {
        let def = workflow(
            r#"
name: "dotted"
steps:
  - name: analyze
    agent: claude
    prompt: "a {{input}}"
  - name: merge
    agent: claude
    prompt: "{{analyze.claude}}"
"#,
        );
        let err = validate(&def, &config()).unwrap_err();
        assert!(err.to_string().contains("not a parallel step"));
    }

    #[test]
    fn test_dotted_ref_to_agent_outside_step_rejected() {
        let def = workflow(
            r#"
name: "outside"
steps:
  - name: review
    parallel: [claude]
    prompt: "r {{input}}"
  - name: merge
    agent: claude
    prompt: "{{review.gemini}}"
"#,
        );
        let err = validate(&def, &config()).unwrap_err();
        assert!(err.to_string().contains("only runs"));
    }

    #[test]
    fn test_prompts_must_cover_expanded_group() {
        let def = workflow(
            r#"
name: "cover"
steps:
  - name: review
    parallel: [reviewers]
    prompts:
      claude: "only claude {{input}}"
"#,
        );
        let err = validate(&def, &config()).unwrap_err();
        assert!(err.to_string().contains("no prompt for agent 'gemini'"));
    }

    #[test]
    fn test_prompts_unknown_key_rejected() {
        let def = workflow(
            r#"
name: "unknown-key"
steps:
  - name: review
    parallel: [claude]
    prompts:
      claude: "ok {{input}}"
      codex: "who {{input}}"
"#,
        );
        let err = validate(&def, &config()).unwrap_err();
        assert!(err.to_string().contains("not in the parallel list"));
    }

    #[test]
    fn test_unknown_agent_rejected() {
        let def = workflow(
            r#"
name: "ghost"
steps:
  - name: a
    agent: codex
    prompt: "p"
"#,
        );
        let err = validate(&def, &config()).unwrap_err();
        assert!(matches!(err, DispatchError::AgentNotFound(_)));
    }

    #[test]
    fn test_reserved_input_name_rejected() {
        let def = workflow(
            r#"
name: "reserved"
steps:
  - name: input
    agent: claude
    prompt: "p"
"#,
        );
        let err = validate(&def, &config()).unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_dependency_closure_in_definition_order() {
        let def = workflow(
            r#"
name: "closure"
steps:
  - name: a
    agent: claude
    prompt: "{{input}}"
  - name: b
    agent: claude
    prompt: "{{a}}"
  - name: unrelated
    agent: claude
    prompt: "{{input}}"
  - name: c
    agent: claude
    prompt: "{{b}} and {{a}}"
"#,
        );
        let closure = dependency_closure(&def, "c").unwrap();
        assert_eq!(closure, vec!["a", "b", "c"]);

        let closure = dependency_closure(&def, "unrelated").unwrap();
        assert_eq!(closure, vec!["unrelated"]);

        assert!(dependency_closure(&def, "missing").is_err());
    }
}
