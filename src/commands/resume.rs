use anyhow::Result;

use crate::cli::ResumeArgs;
use crate::commands::common::render_outcome;
use crate::jobs::cache::JobCache;
use crate::jobs::service::{JobService, Outcome, Request, ResumeRequest};
use crate::progress::ProgressReporter;
use crate::transfer::process::ProcessTransport;

pub fn handle_resume(args: ResumeArgs) -> Result<Outcome> {
    let request = ResumeRequest {
        job_id: args.job.job_id,
        use_most_recent: args.job.use_most_recent,
    };

    let mut reporter = if args.json {
        ProgressReporter::silent()
    } else {
        ProgressReporter::human()
    };
    let mut service = JobService::new(JobCache::discover()?, ProcessTransport);
    let outcome = service.run(Request::Resume(request), &mut reporter)?;
    let concise = outcome.cached.as_ref().is_some_and(|entry| entry.concise);
    render_outcome("Deploy", &outcome, args.json, concise)?;
    Ok(outcome)
}
