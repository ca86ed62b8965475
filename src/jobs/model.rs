use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier assigned by the org for an asynchronous deploy or retrieve job.
pub type JobId = String;

/// Retention window for cached job entries.
pub const CACHE_TTL_DAYS: i64 = 3;

/// Wait budget applied when a command does not specify one.
pub const DEFAULT_WAIT_MINUTES: u64 = 33;

/// Lifecycle states reported by the org for an asynchronous job.
///
/// Terminal states are absorbing; everything else eventually transitions into
/// one of them or keeps polling until the local wait budget runs out.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    InProgress,
    Succeeded,
    SucceededPartial,
    Failed,
    Canceled,
    Canceling,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::InProgress => "InProgress",
            JobStatus::Succeeded => "Succeeded",
            JobStatus::SucceededPartial => "SucceededPartial",
            JobStatus::Failed => "Failed",
            JobStatus::Canceled => "Canceled",
            JobStatus::Canceling => "Canceling",
        }
    }

    /// Whether no further transition can occur for this status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded
                | JobStatus::SucceededPartial
                | JobStatus::Failed
                | JobStatus::Canceled
        )
    }

    /// A job can only be resumed while the org still reports it in flight.
    pub fn is_resumable(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The exit code is CI-visible signal, so unknown statuses must fail loudly
/// at the parse boundary instead of defaulting.
#[derive(Debug, Error)]
#[error("unrecognized job status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for JobStatus {
    type Err = ParseStatusError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "Pending" => Ok(JobStatus::Pending),
            "InProgress" => Ok(JobStatus::InProgress),
            "Succeeded" => Ok(JobStatus::Succeeded),
            "SucceededPartial" => Ok(JobStatus::SucceededPartial),
            "Failed" => Ok(JobStatus::Failed),
            "Canceled" => Ok(JobStatus::Canceled),
            "Canceling" => Ok(JobStatus::Canceling),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Maps a terminal or in-flight job status to the process exit code.
pub fn exit_code(status: JobStatus) -> u8 {
    match status {
        JobStatus::Succeeded => 0,
        JobStatus::Canceled | JobStatus::Failed => 1,
        JobStatus::SucceededPartial => 68,
        JobStatus::Pending | JobStatus::InProgress | JobStatus::Canceling => 69,
    }
}

/// Test levels accepted for deploy and validation requests.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
pub enum TestLevel {
    NoTestRun,
    RunSpecifiedTests,
    RunLocalTests,
    RunAllTestsInOrg,
}

/// One cached entry per job id, holding everything needed to reconstruct a
/// resume, report, or cancel request later.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CachedJob {
    pub job_id: JobId,
    pub target_org: String,
    pub wait_minutes: u64,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_level: Option<TestLevel>,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub concise: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default)]
    pub validation: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedJob {
    /// Fresh entry with default fields; callers merge real values via a patch.
    pub fn new(job_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            job_id: job_id.to_string(),
            target_org: String::new(),
            wait_minutes: DEFAULT_WAIT_MINUTES,
            status: JobStatus::Pending,
            test_level: None,
            verbose: false,
            concise: false,
            api_version: None,
            validation: false,
            created_at: now,
            expires_at: now + Duration::days(CACHE_TTL_DAYS),
        }
    }

    /// Whether the entry is still inside its retention window.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Merges the provided fields into this entry, leaving the rest untouched.
    pub fn apply(&mut self, patch: JobPatch) {
        if let Some(target_org) = patch.target_org {
            self.target_org = target_org;
        }
        if let Some(wait_minutes) = patch.wait_minutes {
            self.wait_minutes = wait_minutes;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(test_level) = patch.test_level {
            self.test_level = Some(test_level);
        }
        if let Some(verbose) = patch.verbose {
            self.verbose = verbose;
        }
        if let Some(concise) = patch.concise {
            self.concise = concise;
        }
        if let Some(api_version) = patch.api_version {
            self.api_version = Some(api_version);
        }
        if let Some(validation) = patch.validation {
            self.validation = validation;
        }
    }
}

/// Partial update for a cached job; `None` fields are left as they were.
#[derive(Clone, Debug, Default)]
pub struct JobPatch {
    pub target_org: Option<String>,
    pub wait_minutes: Option<u64>,
    pub status: Option<JobStatus>,
    pub test_level: Option<TestLevel>,
    pub verbose: Option<bool>,
    pub concise: Option<bool>,
    pub api_version: Option<String>,
    pub validation: Option<bool>,
}
