use anyhow::Result;

use crate::cli::RetrieveStartArgs;
use crate::commands::common::render_outcome;
use crate::jobs::cache::JobCache;
use crate::jobs::service::{JobService, Outcome, Request, RetrieveRequest};
use crate::progress::ProgressReporter;
use crate::transfer::process::ProcessTransport;

pub fn handle_retrieve(args: RetrieveStartArgs) -> Result<Outcome> {
    let request = RetrieveRequest {
        source_dirs: args.selectors.source_dir,
        manifest: args.selectors.manifest,
        metadata: args.selectors.metadata,
        target_org: args.target_org,
        api_version: args.api_version,
        wait_minutes: args.wait,
    };

    let mut reporter = if args.json {
        ProgressReporter::silent()
    } else {
        ProgressReporter::human()
    };
    let mut service = JobService::new(JobCache::discover()?, ProcessTransport);
    let outcome = service.run(Request::Retrieve(request), &mut reporter)?;
    render_outcome("Retrieve", &outcome, args.json, false)?;
    Ok(outcome)
}
