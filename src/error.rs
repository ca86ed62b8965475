use thiserror::Error;

use crate::jobs::model::JobStatus;
use crate::transfer::{Conflict, TransferError};

/// Failures surfaced to the user as a single structured error.
///
/// Every fatal path in the plugin ends in one of these variants; `name()` and
/// `exit_code()` feed the JSON error envelope and the process exit status.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("{0}")]
    Usage(String),

    #[error("no job id was provided and no recent deploy job was found in the cache")]
    NoRecentJobId,

    #[error("invalid deploy job id: {0}")]
    InvalidJobId(String),

    #[error("deploy job id {input} matches more than one cached job: {}", .matches.join(", "))]
    AmbiguousJobId { input: String, matches: Vec<String> },

    #[error("job {id} cannot be quick deployed: {reason}")]
    CannotQuickDeploy { id: String, reason: String },

    #[error("deploy {id} cannot be canceled: {reason}")]
    CannotCancelDeploy { id: String, reason: String },

    #[error("deploy {id} already finished as {status} and cannot be resumed")]
    DeployNotResumable { id: String, status: JobStatus },

    #[error("validation of deploy {id} failed: {reason}")]
    FailedValidation { id: String, reason: String },

    #[error(
        "the client timed out after {wait_minutes} minute(s) while job {id} was {last_status}; \
         the job continues on the org"
    )]
    ClientTimeout {
        id: String,
        last_status: JobStatus,
        wait_minutes: u64,
    },

    #[error("exceeded maximum consecutive retryable errors ({limit}); last error: {last}")]
    RetryLimitExceeded { limit: usize, last: String },

    #[error(
        "{} conflict(s) detected between local files and the org; deploy with --ignore-conflicts to override",
        .conflicts.len()
    )]
    ConflictsDetected { conflicts: Vec<Conflict> },

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

impl DeployError {
    /// Short stable name used in the JSON error envelope.
    pub fn name(&self) -> &'static str {
        match self {
            DeployError::Usage(_) => "UsageError",
            DeployError::NoRecentJobId => "NoRecentJobId",
            DeployError::InvalidJobId(_) => "InvalidJobId",
            DeployError::AmbiguousJobId { .. } => "AmbiguousJobId",
            DeployError::CannotQuickDeploy { .. } => "CannotQuickDeploy",
            DeployError::CannotCancelDeploy { .. } => "CannotCancelDeploy",
            DeployError::DeployNotResumable { .. } => "DeployNotResumable",
            DeployError::FailedValidation { .. } => "FailedValidation",
            DeployError::ClientTimeout { .. } => "ClientTimeout",
            DeployError::RetryLimitExceeded { .. } => "RetryLimitExceeded",
            DeployError::ConflictsDetected { .. } => "ConflictsDetected",
            DeployError::Transfer(_) => "TransferError",
        }
    }

    /// Exit code for a fatal path. A client timeout exits with the in-progress
    /// code because the job keeps running on the org and remains resumable.
    pub fn exit_code(&self) -> u8 {
        match self {
            DeployError::ClientTimeout { .. } => 69,
            _ => 1,
        }
    }
}
