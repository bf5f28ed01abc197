use anyhow::{Context, Result};

use crate::commands::{open_project, print_json};

/// Correlation run history, oldest first.
pub fn list_runs_command(root: &str, json: bool) -> Result<()> {
    let ctx = open_project(root)?;
    let runs = ctx.db.list_runs().context("Failed to list correlation runs")?;

    if json {
        return print_json(&runs);
    }

    if runs.is_empty() {
        println!("No correlation runs recorded.");
        return Ok(());
    }
    for run in &runs {
        let record = &run.record;
        println!(
            "#{} {} [{}] entities: {} matched: {} events: {} ({})",
            run.id,
            record.label,
            record.status.as_str(),
            record.entities,
            record.matched,
            record.events,
            record.finished_at
        );
    }
    Ok(())
}

/// Events recorded for one run.
pub fn list_events_command(root: &str, run_id: i64, json: bool) -> Result<()> {
    let ctx = open_project(root)?;
    let events = ctx
        .db
        .list_events(run_id)
        .with_context(|| format!("Failed to list events for run {run_id}"))?;

    if json {
        return print_json(&events);
    }

    if events.is_empty() {
        println!("No events for run {run_id}.");
        return Ok(());
    }
    for event in &events {
        println!("{:<18} {:#010x} {}", event.kind.as_str(), event.address, event.message);
    }
    Ok(())
}
