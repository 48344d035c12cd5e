//! `dispatch agents` — list configured agents, groups, and defaults.

use console::style;
use dispatch_core::config::OutputFormat;
use dispatch_core::{DispatchError, Dispatcher};

use crate::output::{self, OutputMode};

pub fn run(dispatcher: &Dispatcher, mode: OutputMode) -> Result<(), DispatchError> {
    let config = dispatcher.config();

    if !mode.is_text() {
        let agents: Vec<serde_json::Value> = config
            .agents()
            .iter()
            .map(|agent| {
                serde_json::json!({
                    "name": agent.name,
                    "format": agent.format,
                    "resumable": agent.continue_command.is_some(),
                })
            })
            .collect();
        let groups: serde_json::Map<String, serde_json::Value> = config
            .groups()
            .iter()
            .map(|(name, members)| ((*name).to_string(), serde_json::json!(members)))
            .collect();
        match mode {
            OutputMode::StreamJson => {
                for agent in &agents {
                    output::print_event("agent", agent);
                }
                output::print_event(
                    "summary",
                    &serde_json::json!({
                        "groups": groups,
                        "defaultAgents": config.settings().default_agents,
                    }),
                );
            }
            _ => output::print_json(&serde_json::json!({
                "agents": agents,
                "groups": groups,
                "defaultAgents": config.settings().default_agents,
            })),
        }
        return Ok(());
    }

    println!("{}", style("Configured agents").bold());
    println!("┌──────────────────┬──────────────┬───────────┐");
    println!("│ Name             │ Format       │ Resumable │");
    println!("├──────────────────┼──────────────┼───────────┤");
    for agent in config.agents() {
        println!(
            "│ {:<16} │ {:<12} │ {:<9} │",
            truncate(&agent.name, 16),
            format_label(agent.format),
            if agent.continue_command.is_some() {
                "yes"
            } else {
                "no"
            },
        );
    }
    println!("└──────────────────┴──────────────┴───────────┘");

    let groups = config.groups();
    if !groups.is_empty() {
        println!();
        println!("{}", style("Groups").bold());
        for (name, members) in groups {
            println!("   {} = {}", name, members.join(", "));
        }
    }

    let defaults = &config.settings().default_agents;
    if !defaults.is_empty() {
        println!();
        println!("Default agents: {}", defaults.join(", "));
    }

    Ok(())
}

fn format_label(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::StreamJson => "stream-json",
        OutputFormat::Json => "json",
        OutputFormat::Text => "text",
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
