use anyhow::Result;
use chrono::Utc;

use crate::error::DeployError;
use crate::jobs::cache::JobCache;
use crate::jobs::model::{CachedJob, JobId, JobPatch, JobStatus, TestLevel};
use crate::jobs::resolve::resolve_latest;
use crate::progress::ProgressReporter;
use crate::transfer::poll::{PollConfig, PollObserver, poll_status};
use crate::transfer::{
    DeployPayload, INVALID_ID_ERROR, RetrievePayload, SOURCE_CONFLICT_ERROR, StatusSnapshot,
    TransferError, Transport,
};

/// A new deploy or validation to send to the org.
#[derive(Clone, Debug)]
pub struct NewDeployRequest {
    pub source_dirs: Vec<String>,
    pub manifest: Option<String>,
    pub metadata: Vec<String>,
    pub target_org: String,
    pub test_level: Option<TestLevel>,
    pub tests: Vec<String>,
    pub api_version: Option<String>,
    pub check_only: bool,
    pub ignore_conflicts: bool,
    pub wait_minutes: u64,
    pub run_async: bool,
    pub verbose: bool,
    pub concise: bool,
}

impl NewDeployRequest {
    fn payload(&self) -> DeployPayload {
        DeployPayload {
            source_dirs: self.source_dirs.clone(),
            manifest: self.manifest.clone(),
            metadata: self.metadata.clone(),
            target_org: self.target_org.clone(),
            test_level: self.test_level,
            tests: self.tests.clone(),
            api_version: self.api_version.clone(),
            check_only: self.check_only,
            ignore_conflicts: self.ignore_conflicts,
        }
    }
}

/// Deploy the unmodified artifact of a previously validated job.
#[derive(Clone, Debug)]
pub struct QuickDeployRequest {
    pub job_id: Option<String>,
    pub use_most_recent: bool,
    pub wait_minutes: u64,
    pub run_async: bool,
}

/// Resume watching a job started by an earlier command invocation.
#[derive(Clone, Debug)]
pub struct ResumeRequest {
    pub job_id: Option<String>,
    pub use_most_recent: bool,
}

/// Ask the org to cancel an in-flight job.
#[derive(Clone, Debug)]
pub struct CancelRequest {
    pub job_id: Option<String>,
    pub use_most_recent: bool,
    pub wait_minutes: u64,
    pub run_async: bool,
}

/// One-shot status check without holding a live operation handle.
#[derive(Clone, Debug)]
pub struct ReportRequest {
    pub job_id: Option<String>,
    pub use_most_recent: bool,
}

/// A retrieve from the org into the local project.
#[derive(Clone, Debug)]
pub struct RetrieveRequest {
    pub source_dirs: Vec<String>,
    pub manifest: Option<String>,
    pub metadata: Vec<String>,
    pub target_org: String,
    pub api_version: Option<String>,
    pub wait_minutes: u64,
}

impl RetrieveRequest {
    fn payload(&self) -> RetrievePayload {
        RetrievePayload {
            source_dirs: self.source_dirs.clone(),
            manifest: self.manifest.clone(),
            metadata: self.metadata.clone(),
            target_org: self.target_org.clone(),
            api_version: self.api_version.clone(),
        }
    }
}

/// Every operation the dispatcher can run, each with its own required fields.
#[derive(Clone, Debug)]
pub enum Request {
    Deploy(NewDeployRequest),
    Quick(QuickDeployRequest),
    Resume(ResumeRequest),
    Cancel(CancelRequest),
    Report(ReportRequest),
    Retrieve(RetrieveRequest),
}

/// What a dispatched operation ended with; the process exit code is derived
/// from `status` at the outermost boundary.
#[derive(Clone, Debug)]
pub struct Outcome {
    pub job_id: JobId,
    pub status: JobStatus,
    pub snapshot: Option<StatusSnapshot>,
    pub cached: Option<CachedJob>,
}

/// Orchestrates job operations against the transport, keeping the cache in
/// step with everything the org reports.
pub struct JobService<T: Transport> {
    cache: JobCache,
    transport: T,
}

impl<T: Transport> JobService<T> {
    pub fn new(cache: JobCache, transport: T) -> Self {
        Self { cache, transport }
    }

    pub fn cache(&self) -> &JobCache {
        &self.cache
    }

    pub fn run(&mut self, request: Request, reporter: &mut ProgressReporter) -> Result<Outcome> {
        match request {
            Request::Deploy(request) => self.start_deploy(request, reporter),
            Request::Quick(request) => self.quick_deploy(request, reporter),
            Request::Resume(request) => self.resume(request, reporter),
            Request::Cancel(request) => self.cancel(request, reporter),
            Request::Report(request) => self.report(request),
            Request::Retrieve(request) => self.retrieve(request, reporter),
        }
    }

    fn start_deploy(
        &mut self,
        request: NewDeployRequest,
        reporter: &mut ProgressReporter,
    ) -> Result<Outcome> {
        validate_deploy_flags(&request)?;

        let started = self
            .transport
            .start_deploy(&request.payload())
            .map_err(conflict_or_transfer)?;

        let now = Utc::now();
        self.cache.upsert(
            &started.id,
            JobPatch {
                target_org: Some(request.target_org.clone()),
                wait_minutes: Some(request.wait_minutes),
                status: Some(started.status),
                test_level: request.test_level,
                verbose: Some(request.verbose),
                concise: Some(request.concise),
                api_version: request.api_version.clone(),
                validation: Some(request.check_only),
            },
            now,
        );
        self.cache.write()?;

        if request.run_async {
            return Ok(Outcome {
                job_id: started.id,
                status: started.status,
                snapshot: None,
                cached: None,
            });
        }

        let snapshot = self.watch_deploy(&started.id, request.wait_minutes, reporter)?;
        self.record_status(&started.id, snapshot.status)?;
        if request.check_only && snapshot.status == JobStatus::Failed {
            let reason = snapshot
                .error_message
                .clone()
                .unwrap_or_else(|| "one or more components failed validation".to_string());
            return Err(DeployError::FailedValidation {
                id: started.id,
                reason,
            }
            .into());
        }
        Ok(Outcome {
            job_id: started.id,
            status: snapshot.status,
            snapshot: Some(snapshot),
            cached: None,
        })
    }

    fn quick_deploy(
        &mut self,
        request: QuickDeployRequest,
        reporter: &mut ProgressReporter,
    ) -> Result<Outcome> {
        let now = Utc::now();
        // the validation job may legitimately be absent from the cache
        let validation_id = resolve_latest(
            &self.cache,
            request.use_most_recent,
            request.job_id.as_deref(),
            false,
            now,
        )?;

        let started = match self.transport.quick_deploy(&validation_id) {
            Ok(started) => started,
            Err(TransferError::Server { name, message, .. }) if name == INVALID_ID_ERROR => {
                return Err(DeployError::CannotQuickDeploy {
                    id: validation_id,
                    reason: message,
                }
                .into());
            }
            Err(err) => return Err(DeployError::Transfer(err).into()),
        };

        let target_org = self
            .cache
            .get(&validation_id, now)
            .ok()
            .map(|entry| entry.target_org.clone());
        self.cache.upsert(
            &started.id,
            JobPatch {
                target_org,
                wait_minutes: Some(request.wait_minutes),
                status: Some(started.status),
                validation: Some(false),
                ..Default::default()
            },
            now,
        );
        self.cache.write()?;

        if request.run_async {
            return Ok(Outcome {
                job_id: started.id,
                status: started.status,
                snapshot: None,
                cached: None,
            });
        }

        let snapshot = self.watch_deploy(&started.id, request.wait_minutes, reporter)?;
        self.record_status(&started.id, snapshot.status)?;
        Ok(Outcome {
            job_id: started.id,
            status: snapshot.status,
            snapshot: Some(snapshot),
            cached: None,
        })
    }

    fn resume(
        &mut self,
        request: ResumeRequest,
        reporter: &mut ProgressReporter,
    ) -> Result<Outcome> {
        let now = Utc::now();
        let id = resolve_latest(
            &self.cache,
            request.use_most_recent,
            request.job_id.as_deref(),
            true,
            now,
        )?;
        let entry = self.cache.get(&id, now)?.clone();
        if !entry.status.is_resumable() {
            return Err(DeployError::DeployNotResumable {
                id,
                status: entry.status,
            }
            .into());
        }

        // org-side state has diverged from local tracking by definition here,
        // so no conflict checking applies to a resumed job
        let snapshot = self.watch_deploy(&id, entry.wait_minutes, reporter)?;

        // drop the entry so a finished job can never be re-resumed
        self.cache.unset(&id);
        self.cache.write()?;

        Ok(Outcome {
            job_id: id,
            status: snapshot.status,
            snapshot: Some(snapshot),
            cached: Some(entry),
        })
    }

    fn cancel(
        &mut self,
        request: CancelRequest,
        reporter: &mut ProgressReporter,
    ) -> Result<Outcome> {
        let now = Utc::now();
        let id = resolve_latest(
            &self.cache,
            request.use_most_recent,
            request.job_id.as_deref(),
            true,
            now,
        )?;

        let snapshot = match self.transport.cancel_deploy(&id) {
            Ok(snapshot) => snapshot,
            Err(TransferError::Server { name, message, .. }) if name == INVALID_ID_ERROR => {
                return Err(DeployError::CannotCancelDeploy {
                    id,
                    reason: message,
                }
                .into());
            }
            Err(err) => return Err(DeployError::Transfer(err).into()),
        };
        reporter.on_update(&snapshot);

        let snapshot = if request.run_async || snapshot.status.is_terminal() {
            snapshot
        } else {
            self.watch_deploy(&id, request.wait_minutes, reporter)?
        };
        self.record_status(&id, snapshot.status)?;
        Ok(Outcome {
            job_id: id,
            status: snapshot.status,
            snapshot: Some(snapshot),
            cached: None,
        })
    }

    fn report(&mut self, request: ReportRequest) -> Result<Outcome> {
        let now = Utc::now();
        let id = resolve_latest(
            &self.cache,
            request.use_most_recent,
            request.job_id.as_deref(),
            true,
            now,
        )?;
        let cached = self.cache.get(&id, now)?.clone();

        let snapshot = self
            .transport
            .check_deploy(&id)
            .map_err(DeployError::Transfer)?;
        self.record_status(&id, snapshot.status)?;
        Ok(Outcome {
            job_id: id,
            status: snapshot.status,
            snapshot: Some(snapshot),
            cached: Some(cached),
        })
    }

    fn retrieve(
        &mut self,
        request: RetrieveRequest,
        reporter: &mut ProgressReporter,
    ) -> Result<Outcome> {
        let started = self
            .transport
            .start_retrieve(&request.payload())
            .map_err(DeployError::Transfer)?;

        let config = PollConfig::with_wait_minutes(request.wait_minutes);
        let result = poll_status(
            &started.id,
            || self.transport.check_retrieve(&started.id),
            config,
            reporter,
        );
        if matches!(result, Err(DeployError::ClientTimeout { .. })) {
            reporter.client_timeout();
        }
        let snapshot = result?;
        Ok(Outcome {
            job_id: started.id,
            status: snapshot.status,
            snapshot: Some(snapshot),
            cached: None,
        })
    }

    fn watch_deploy(
        &self,
        job_id: &str,
        wait_minutes: u64,
        reporter: &mut ProgressReporter,
    ) -> Result<StatusSnapshot> {
        let config = PollConfig::with_wait_minutes(wait_minutes);
        let result = poll_status(
            job_id,
            || self.transport.check_deploy(job_id),
            config,
            reporter,
        );
        if matches!(result, Err(DeployError::ClientTimeout { .. })) {
            reporter.client_timeout();
        }
        result.map_err(Into::into)
    }

    fn record_status(&mut self, job_id: &str, status: JobStatus) -> Result<()> {
        self.cache.upsert(
            job_id,
            JobPatch {
                status: Some(status),
                ..Default::default()
            },
            Utc::now(),
        );
        self.cache.write()
    }
}

fn validate_deploy_flags(request: &NewDeployRequest) -> Result<(), DeployError> {
    let has_selector = !request.source_dirs.is_empty()
        || request.manifest.is_some()
        || !request.metadata.is_empty();
    if !has_selector {
        return Err(DeployError::Usage(
            "specify at least one of --source-dir, --manifest, or --metadata".to_string(),
        ));
    }
    if request.test_level == Some(TestLevel::RunSpecifiedTests) && request.tests.is_empty() {
        return Err(DeployError::Usage(
            "--tests is required when --test-level is run-specified-tests".to_string(),
        ));
    }
    if !request.tests.is_empty() && request.test_level != Some(TestLevel::RunSpecifiedTests) {
        return Err(DeployError::Usage(
            "--test-level run-specified-tests is required when --tests is provided".to_string(),
        ));
    }
    Ok(())
}

/// Conflict payloads get their own error so the table can be rendered before
/// the failure propagates; everything else stays a transfer error.
fn conflict_or_transfer(err: TransferError) -> anyhow::Error {
    match err {
        TransferError::Server {
            name,
            message,
            conflicts,
        } => {
            if name == SOURCE_CONFLICT_ERROR {
                DeployError::ConflictsDetected { conflicts }.into()
            } else {
                DeployError::Transfer(TransferError::Server {
                    name,
                    message,
                    conflicts,
                })
                .into()
            }
        }
        other => DeployError::Transfer(other).into(),
    }
}
