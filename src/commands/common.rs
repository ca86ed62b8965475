use std::io::Write;

use anyhow::Result;
use serde_json::{Value, json};
use tabwriter::TabWriter;

use crate::jobs::service::Outcome;
use crate::progress::paint_status;
use crate::timefmt::format_unix_style;
use crate::transfer::{ComponentFailure, Conflict};

/// Renders the result of a deploy-style operation, either as a JSON envelope
/// or as human-readable summary lines.
pub fn render_outcome(
    label: &str,
    outcome: &Outcome,
    json: bool,
    concise: bool,
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&json_envelope(outcome))?);
        return Ok(());
    }

    println!("{} ID: {}", label, outcome.job_id);
    if let Some(entry) = &outcome.cached {
        if !entry.target_org.is_empty() {
            println!("Target org: {}", entry.target_org);
        }
        println!("Started: {}", format_unix_style(entry.created_at));
    }
    println!("Status: {}", paint_status(outcome.status));

    match &outcome.snapshot {
        Some(snapshot) => {
            if !concise {
                if snapshot.components_total > 0 {
                    println!(
                        "Components: {}/{} deployed, {} failed",
                        snapshot.components_deployed,
                        snapshot.components_total,
                        snapshot.components_failed
                    );
                }
                if snapshot.tests_total > 0 {
                    println!(
                        "Tests: {}/{} completed, {} failed",
                        snapshot.tests_completed, snapshot.tests_total, snapshot.tests_failed
                    );
                }
            }
            if !snapshot.failures.is_empty() {
                render_failures(&snapshot.failures)?;
            }
        }
        None => {
            if label == "Deploy" {
                println!(
                    "Run \"metadeploy deploy resume --job-id {}\" to resume watching the deploy.",
                    outcome.job_id
                );
            }
        }
    }

    Ok(())
}

fn json_envelope(outcome: &Outcome) -> Value {
    let mut envelope = json!({
        "id": outcome.job_id,
        "status": outcome.status.as_str(),
        "done": outcome.status.is_terminal(),
    });
    if let Some(snapshot) = &outcome.snapshot {
        envelope["components"] = json!({
            "total": snapshot.components_total,
            "deployed": snapshot.components_deployed,
            "failed": snapshot.components_failed,
        });
        envelope["tests"] = json!({
            "total": snapshot.tests_total,
            "completed": snapshot.tests_completed,
            "failed": snapshot.tests_failed,
        });
        if !snapshot.failures.is_empty() {
            envelope["failures"] = serde_json::to_value(&snapshot.failures).unwrap_or(Value::Null);
        }
    }
    envelope
}

/// Prints the components the org rejected as an aligned table.
pub fn render_failures(failures: &[ComponentFailure]) -> Result<()> {
    let mut buffer = Vec::new();
    {
        let mut writer = TabWriter::new(&mut buffer).padding(2);
        writeln!(&mut writer, "TYPE\tNAME\tPROBLEM")?;
        for failure in failures {
            writeln!(
                &mut writer,
                "{}\t{}\t{}",
                failure.component_type, failure.full_name, failure.problem
            )?;
        }
        writer.flush()?;
    }
    print!("{}", String::from_utf8(buffer)?);
    Ok(())
}

/// Prints the files that changed both locally and in the org.
pub fn render_conflicts(conflicts: &[Conflict]) -> Result<()> {
    println!("These files changed both locally and in the org:");
    let mut buffer = Vec::new();
    {
        let mut writer = TabWriter::new(&mut buffer).padding(2);
        writeln!(&mut writer, "NAME\tTYPE\tFILE PATH")?;
        for conflict in conflicts {
            writeln!(
                &mut writer,
                "{}\t{}\t{}",
                conflict.full_name, conflict.component_type, conflict.path
            )?;
        }
        writer.flush()?;
    }
    print!("{}", String::from_utf8(buffer)?);
    Ok(())
}
