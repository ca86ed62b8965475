use anyhow::Result;

use crate::cli::ReportArgs;
use crate::commands::common::render_outcome;
use crate::jobs::cache::JobCache;
use crate::jobs::service::{JobService, Outcome, ReportRequest, Request};
use crate::progress::ProgressReporter;
use crate::transfer::process::ProcessTransport;

pub fn handle_report(args: ReportArgs) -> Result<Outcome> {
    let request = ReportRequest {
        job_id: args.job.job_id,
        use_most_recent: args.job.use_most_recent,
    };

    let mut service = JobService::new(JobCache::discover()?, ProcessTransport);
    let outcome = service.run(Request::Report(request), &mut ProgressReporter::silent())?;
    let concise = outcome.cached.as_ref().is_some_and(|entry| entry.concise);
    render_outcome("Deploy", &outcome, args.json, concise)?;
    Ok(outcome)
}
