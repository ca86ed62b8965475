use clap::{Args, Parser, Subcommand};

use crate::jobs::model::{DEFAULT_WAIT_MINUTES, TestLevel};

/// Top-level CLI definition for the `metadeploy` binary.
#[derive(Debug, Parser)]
#[command(
    name = "metadeploy",
    about = "Deploy, validate, and retrieve metadata against a target org",
    author,
    version,
    propagate_version = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Supported command groups for the CLI.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy metadata to an org and manage in-flight deploy jobs.
    #[command(subcommand)]
    Deploy(DeployCommand),
    /// Retrieve metadata from an org into the local project.
    #[command(subcommand)]
    Retrieve(RetrieveCommand),
}

impl Command {
    /// Whether the selected subcommand asked for JSON output.
    pub fn json(&self) -> bool {
        match self {
            Command::Deploy(command) => match command {
                DeployCommand::Start(args) => args.json,
                DeployCommand::Validate(args) => args.json,
                DeployCommand::Quick(args) => args.json,
                DeployCommand::Resume(args) => args.json,
                DeployCommand::Cancel(args) => args.json,
                DeployCommand::Report(args) => args.json,
            },
            Command::Retrieve(RetrieveCommand::Start(args)) => args.json,
        }
    }
}

/// Deploy job operations.
#[derive(Debug, Subcommand)]
pub enum DeployCommand {
    /// Start a new deploy to the target org.
    Start(StartArgs),
    /// Validate a deploy against the target org without saving changes.
    Validate(ValidateArgs),
    /// Deploy the unmodified artifact of a previously validated job.
    Quick(QuickArgs),
    /// Resume watching a deploy started by an earlier invocation.
    Resume(ResumeArgs),
    /// Cancel an in-flight deploy job.
    Cancel(CancelArgs),
    /// Check the current status of a deploy job.
    Report(ReportArgs),
}

/// Retrieve operations.
#[derive(Debug, Subcommand)]
pub enum RetrieveCommand {
    /// Start a retrieve from the target org.
    Start(RetrieveStartArgs),
}

/// Selectors describing which components an operation covers.
#[derive(Debug, Args)]
pub struct SelectorArgs {
    /// Source directories to include.
    #[arg(short = 'd', long = "source-dir", value_name = "DIR", num_args = 1..)]
    pub source_dir: Vec<String>,
    /// Manifest file describing the components to include.
    #[arg(
        short = 'x',
        long = "manifest",
        value_name = "FILE",
        conflicts_with = "source_dir"
    )]
    pub manifest: Option<String>,
    /// Individual metadata entries (e.g. ApexClass:Hello) to include.
    #[arg(
        short = 'm',
        long = "metadata",
        value_name = "ENTRY",
        num_args = 1..,
        conflicts_with_all = ["source_dir", "manifest"]
    )]
    pub metadata: Vec<String>,
}

/// Flags shared by commands that act on an existing job.
#[derive(Debug, Args)]
pub struct JobIdArgs {
    /// Job id (15 or 18 characters) of the deploy to act on.
    #[arg(short = 'i', long = "job-id", value_name = "ID")]
    pub job_id: Option<String>,
    /// Act on the most recently started deploy instead of a specific id.
    #[arg(short = 'r', long = "use-most-recent", conflicts_with = "job_id")]
    pub use_most_recent: bool,
}

/// Arguments for the `deploy start` subcommand.
#[derive(Debug, Args)]
pub struct StartArgs {
    #[command(flatten)]
    pub selectors: SelectorArgs,
    /// Username or alias of the target org.
    #[arg(short = 'o', long = "target-org", value_name = "ORG")]
    pub target_org: String,
    /// Test level the org should apply to the deploy.
    #[arg(short = 'l', long = "test-level", value_enum, value_name = "LEVEL")]
    pub test_level: Option<TestLevel>,
    /// Test classes to run when the test level is run-specified-tests.
    #[arg(short = 't', long = "tests", value_name = "TEST", num_args = 1..)]
    pub tests: Vec<String>,
    /// Override the API version used for the request.
    #[arg(short = 'a', long = "api-version", value_name = "VERSION")]
    pub api_version: Option<String>,
    /// Number of minutes to wait for the job to finish.
    #[arg(short = 'w', long, value_name = "MINUTES", default_value_t = DEFAULT_WAIT_MINUTES)]
    pub wait: u64,
    /// Exit as soon as the org accepts the request.
    #[arg(long = "async", conflicts_with = "wait")]
    pub run_async: bool,
    /// Validate only; changes are never saved to the org.
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    /// Deploy even when local files conflict with the org.
    #[arg(short = 'c', long = "ignore-conflicts")]
    pub ignore_conflicts: bool,
    /// Show extended output for every deployed component.
    #[arg(long, conflicts_with = "concise")]
    pub verbose: bool,
    /// Only show failures in the output.
    #[arg(long)]
    pub concise: bool,
    /// Emit machine-readable JSON output.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `deploy validate` subcommand.
#[derive(Debug, Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub selectors: SelectorArgs,
    /// Username or alias of the target org.
    #[arg(short = 'o', long = "target-org", value_name = "ORG")]
    pub target_org: String,
    /// Test level the org should apply to the validation.
    #[arg(short = 'l', long = "test-level", value_enum, value_name = "LEVEL")]
    pub test_level: Option<TestLevel>,
    /// Test classes to run when the test level is run-specified-tests.
    #[arg(short = 't', long = "tests", value_name = "TEST", num_args = 1..)]
    pub tests: Vec<String>,
    /// Override the API version used for the request.
    #[arg(short = 'a', long = "api-version", value_name = "VERSION")]
    pub api_version: Option<String>,
    /// Number of minutes to wait for the validation to finish.
    #[arg(short = 'w', long, value_name = "MINUTES", default_value_t = DEFAULT_WAIT_MINUTES)]
    pub wait: u64,
    /// Exit as soon as the org accepts the request.
    #[arg(long = "async", conflicts_with = "wait")]
    pub run_async: bool,
    /// Show extended output for every validated component.
    #[arg(long, conflicts_with = "concise")]
    pub verbose: bool,
    /// Only show failures in the output.
    #[arg(long)]
    pub concise: bool,
    /// Emit machine-readable JSON output.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `deploy quick` subcommand.
#[derive(Debug, Args)]
pub struct QuickArgs {
    #[command(flatten)]
    pub job: JobIdArgs,
    /// Number of minutes to wait for the deploy to finish.
    #[arg(short = 'w', long, value_name = "MINUTES", default_value_t = DEFAULT_WAIT_MINUTES)]
    pub wait: u64,
    /// Exit as soon as the org accepts the request.
    #[arg(long = "async", conflicts_with = "wait")]
    pub run_async: bool,
    /// Emit machine-readable JSON output.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `deploy resume` subcommand.
#[derive(Debug, Args)]
pub struct ResumeArgs {
    #[command(flatten)]
    pub job: JobIdArgs,
    /// Emit machine-readable JSON output.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `deploy cancel` subcommand.
#[derive(Debug, Args)]
pub struct CancelArgs {
    #[command(flatten)]
    pub job: JobIdArgs,
    /// Number of minutes to wait for the cancellation to complete.
    #[arg(short = 'w', long, value_name = "MINUTES", default_value_t = DEFAULT_WAIT_MINUTES)]
    pub wait: u64,
    /// Exit as soon as the cancel request has been sent.
    #[arg(long = "async", conflicts_with = "wait")]
    pub run_async: bool,
    /// Emit machine-readable JSON output.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `deploy report` subcommand.
#[derive(Debug, Args)]
pub struct ReportArgs {
    #[command(flatten)]
    pub job: JobIdArgs,
    /// Emit machine-readable JSON output.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `retrieve start` subcommand.
#[derive(Debug, Args)]
pub struct RetrieveStartArgs {
    #[command(flatten)]
    pub selectors: SelectorArgs,
    /// Username or alias of the target org.
    #[arg(short = 'o', long = "target-org", value_name = "ORG")]
    pub target_org: String,
    /// Override the API version used for the request.
    #[arg(short = 'a', long = "api-version", value_name = "VERSION")]
    pub api_version: Option<String>,
    /// Number of minutes to wait for the retrieve to finish.
    #[arg(short = 'w', long, value_name = "MINUTES", default_value_t = DEFAULT_WAIT_MINUTES)]
    pub wait: u64,
    /// Emit machine-readable JSON output.
    #[arg(long)]
    pub json: bool,
}
