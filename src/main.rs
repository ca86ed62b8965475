mod cli;
mod commands;
mod error;
mod jobs;
mod progress;
mod timefmt;
mod transfer;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;
use serde_json::json;

use crate::cli::{Cli, Command, DeployCommand, RetrieveCommand};
use crate::error::DeployError;
use crate::jobs::model::exit_code;
use crate::jobs::service::Outcome;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.command.json();
    match dispatch(cli) {
        Ok(outcome) => ExitCode::from(exit_code(outcome.status)),
        Err(err) => report_error(&err, json),
    }
}

fn dispatch(cli: Cli) -> Result<Outcome> {
    match cli.command {
        Command::Deploy(command) => match command {
            DeployCommand::Start(args) => commands::handle_start(args),
            DeployCommand::Validate(args) => commands::handle_validate(args),
            DeployCommand::Quick(args) => commands::handle_quick(args),
            DeployCommand::Resume(args) => commands::handle_resume(args),
            DeployCommand::Cancel(args) => commands::handle_cancel(args),
            DeployCommand::Report(args) => commands::handle_report(args),
        },
        Command::Retrieve(command) => match command {
            RetrieveCommand::Start(args) => commands::handle_retrieve(args),
        },
    }
}

/// Every fatal path ends here with a single structured error: a JSON envelope
/// in JSON mode, styled text otherwise. No stack traces either way.
fn report_error(err: &anyhow::Error, json: bool) -> ExitCode {
    let deploy_err = err.downcast_ref::<DeployError>();
    let (name, code) = match deploy_err {
        Some(known) => (known.name(), known.exit_code()),
        None => ("Error", 1),
    };

    if json {
        let mut envelope = json!({
            "name": name,
            "message": format!("{err:#}"),
            "exitCode": code,
        });
        if let Some(DeployError::ConflictsDetected { conflicts }) = deploy_err {
            envelope["conflicts"] = serde_json::to_value(conflicts).unwrap_or_default();
        }
        println!("{envelope}");
    } else {
        if let Some(DeployError::ConflictsDetected { conflicts }) = deploy_err {
            let _ = commands::common::render_conflicts(conflicts);
        }
        eprintln!("{} {err:#}", format!("Error ({name}):").red().bold());
    }

    ExitCode::from(code)
}
