pub mod poll;
pub mod process;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jobs::model::{JobId, JobStatus, TestLevel};

/// Server error name reported when a job id does not refer to an operation
/// the org is willing to act on.
pub const INVALID_ID_ERROR: &str = "INVALID_ID_FIELD";

/// Server error name reported when local files and org metadata diverged.
pub const SOURCE_CONFLICT_ERROR: &str = "SourceConflictError";

/// Message fragments that mark a transport failure as retryable.
pub const RETRYABLE_ERROR_SUBSTRINGS: &[&str] =
    &["socket hang up", "ECONNRESET", "ETIMEDOUT", "ERROR_HTTP_503"];

/// Wire payload for starting a deploy or validation.
#[derive(Clone, Debug, Serialize)]
pub struct DeployPayload {
    pub source_dirs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,
    pub metadata: Vec<String>,
    pub target_org: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_level: Option<TestLevel>,
    pub tests: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    pub check_only: bool,
    pub ignore_conflicts: bool,
}

/// Wire payload for starting a retrieve.
#[derive(Clone, Debug, Serialize)]
pub struct RetrievePayload {
    pub source_dirs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,
    pub metadata: Vec<String>,
    pub target_org: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

/// Acknowledgement that the org accepted a request and assigned a job id.
#[derive(Clone, Debug, Deserialize)]
pub struct StartedJob {
    pub id: JobId,
    pub status: JobStatus,
}

/// One component that the org rejected.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComponentFailure {
    pub full_name: String,
    #[serde(rename = "type")]
    pub component_type: String,
    pub problem: String,
}

/// A file that changed both locally and in the org since the last sync point.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conflict {
    pub full_name: String,
    #[serde(rename = "type")]
    pub component_type: String,
    pub path: String,
}

/// Point-in-time view of a job as reported by the org.
#[derive(Clone, Debug, Deserialize)]
pub struct StatusSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    #[serde(default)]
    pub components_total: u32,
    #[serde(default)]
    pub components_deployed: u32,
    #[serde(default)]
    pub components_failed: u32,
    #[serde(default)]
    pub tests_total: u32,
    #[serde(default)]
    pub tests_completed: u32,
    #[serde(default)]
    pub tests_failed: u32,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub failures: Vec<ComponentFailure>,
}

/// Failures raised at the transport boundary.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The org processed the request and rejected it with a named error.
    #[error("{name}: {message}")]
    Server {
        name: String,
        message: String,
        conflicts: Vec<Conflict>,
    },
    /// The transport itself failed before a server response was produced.
    #[error("{0}")]
    Transport(String),
}

impl TransferError {
    /// Whether a retry is worthwhile; only network-shaped transport failures
    /// qualify, never a server rejection.
    pub fn is_transient(&self) -> bool {
        match self {
            TransferError::Server { .. } => false,
            TransferError::Transport(message) => RETRYABLE_ERROR_SUBSTRINGS
                .iter()
                .any(|fragment| message.contains(fragment)),
        }
    }
}

/// The metadata transfer operations this plugin delegates to the org.
pub trait Transport {
    fn start_deploy(&self, payload: &DeployPayload) -> Result<StartedJob, TransferError>;
    fn check_deploy(&self, job_id: &str) -> Result<StatusSnapshot, TransferError>;
    fn cancel_deploy(&self, job_id: &str) -> Result<StatusSnapshot, TransferError>;
    fn quick_deploy(&self, job_id: &str) -> Result<StartedJob, TransferError>;
    fn start_retrieve(&self, payload: &RetrievePayload) -> Result<StartedJob, TransferError>;
    fn check_retrieve(&self, job_id: &str) -> Result<StatusSnapshot, TransferError>;
}
