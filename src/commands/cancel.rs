use anyhow::Result;

use crate::cli::CancelArgs;
use crate::commands::common::render_outcome;
use crate::jobs::cache::JobCache;
use crate::jobs::service::{CancelRequest, JobService, Outcome, Request};
use crate::progress::ProgressReporter;
use crate::transfer::process::ProcessTransport;

pub fn handle_cancel(args: CancelArgs) -> Result<Outcome> {
    let request = CancelRequest {
        job_id: args.job.job_id,
        use_most_recent: args.job.use_most_recent,
        wait_minutes: args.wait,
        run_async: args.run_async,
    };

    let mut reporter = if args.json {
        ProgressReporter::silent()
    } else {
        ProgressReporter::human()
    };
    let mut service = JobService::new(JobCache::discover()?, ProcessTransport);
    let outcome = service.run(Request::Cancel(request), &mut reporter)?;
    render_outcome("Deploy", &outcome, args.json, false)?;
    Ok(outcome)
}
