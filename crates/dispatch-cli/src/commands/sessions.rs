//! `dispatch sessions` — list stored sessions and clean up stale ones.

use chrono::{DateTime, Utc};
use dialoguer::Confirm;
use dispatch_core::{DispatchError, Dispatcher};

use crate::output::{self, OutputMode};

pub async fn run(
    dispatcher: &Dispatcher,
    mode: OutputMode,
    cleanup: Option<u32>,
    yes: bool,
) -> Result<(), DispatchError> {
    match cleanup {
        Some(days) => cleanup_stale(dispatcher, mode, days, yes).await,
        None => list(dispatcher, mode).await,
    }
}

async fn list(dispatcher: &Dispatcher, mode: OutputMode) -> Result<(), DispatchError> {
    let records = dispatcher.sessions().list().await?;

    match mode {
        OutputMode::Json => {
            output::print_json(&records);
            return Ok(());
        }
        OutputMode::StreamJson => {
            for record in &records {
                output::print_event("session", record);
            }
            return Ok(());
        }
        OutputMode::Text => {}
    }

    if records.is_empty() {
        println!(
            "No stored sessions in '{}'",
            dispatcher.sessions().dir().display()
        );
        return Ok(());
    }

    println!("┌──────────────────────────────────────┬──────────────────────────┬──────────────┐");
    println!("│ Session                              │ Agents                   │ Last used    │");
    println!("├──────────────────────────────────────┼──────────────────────────┼──────────────┤");
    for record in &records {
        let mut agents: Vec<&str> = record.agents.keys().map(|s| s.as_str()).collect();
        agents.sort();
        println!(
            "│ {:<36} │ {:<24} │ {:<12} │",
            truncate(&record.session_id, 36),
            truncate(&agents.join(", "), 24),
            humanize_age(record.updated_at),
        );
    }
    println!("└──────────────────────────────────────┴──────────────────────────┴──────────────┘");
    Ok(())
}

async fn cleanup_stale(
    dispatcher: &Dispatcher,
    mode: OutputMode,
    days: u32,
    yes: bool,
) -> Result<(), DispatchError> {
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
    let records = dispatcher.sessions().list().await?;
    let stale = records.iter().filter(|r| r.updated_at < cutoff).count();

    if stale == 0 {
        match mode {
            OutputMode::Text => println!("No sessions older than {} day(s)", days),
            _ => report_removed(mode, &[], false),
        }
        return Ok(());
    }

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete {} session(s) older than {} day(s)?",
                stale, days
            ))
            .default(false)
            .interact()
            .unwrap_or(false);
        if !confirmed {
            match mode {
                OutputMode::Text => println!("Aborted"),
                _ => report_removed(mode, &[], true),
            }
            return Ok(());
        }
    }

    let removed = dispatcher.sessions().cleanup(i64::from(days)).await?;

    match mode {
        OutputMode::Text => {
            println!("✅ Removed {} session(s)", removed.len());
            for id in &removed {
                println!("   {}", id);
            }
        }
        _ => report_removed(mode, &removed, false),
    }
    Ok(())
}

/// One-object cleanup report for the machine modes.
fn report_removed(mode: OutputMode, removed: &[String], aborted: bool) {
    let mut report = serde_json::json!({ "removed": removed });
    if aborted {
        report["aborted"] = serde_json::Value::Bool(true);
    }
    match mode {
        OutputMode::Json => output::print_json(&report),
        _ => output::print_event("summary", &report),
    }
}

fn humanize_age(updated: DateTime<Utc>) -> String {
    let delta = Utc::now() - updated;
    if delta.num_days() >= 1 {
        format!("{}d ago", delta.num_days())
    } else if delta.num_hours() >= 1 {
        format!("{}h ago", delta.num_hours())
    } else if delta.num_minutes() >= 1 {
        format!("{}m ago", delta.num_minutes())
    } else {
        "just now".to_string()
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
