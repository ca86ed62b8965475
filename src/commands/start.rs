use anyhow::Result;

use crate::cli::StartArgs;
use crate::commands::common::render_outcome;
use crate::jobs::cache::JobCache;
use crate::jobs::service::{JobService, NewDeployRequest, Outcome, Request};
use crate::progress::ProgressReporter;
use crate::transfer::process::ProcessTransport;

pub fn handle_start(args: StartArgs) -> Result<Outcome> {
    let request = NewDeployRequest {
        source_dirs: args.selectors.source_dir,
        manifest: args.selectors.manifest,
        metadata: args.selectors.metadata,
        target_org: args.target_org,
        test_level: args.test_level,
        tests: args.tests,
        api_version: args.api_version,
        check_only: args.dry_run,
        ignore_conflicts: args.ignore_conflicts,
        wait_minutes: args.wait,
        run_async: args.run_async,
        verbose: args.verbose,
        concise: args.concise,
    };

    let mut reporter = if args.json {
        ProgressReporter::silent()
    } else {
        ProgressReporter::human()
    };
    let mut service = JobService::new(JobCache::discover()?, ProcessTransport);
    let outcome = service.run(Request::Deploy(request), &mut reporter)?;
    render_outcome("Deploy", &outcome, args.json, args.concise)?;
    Ok(outcome)
}
