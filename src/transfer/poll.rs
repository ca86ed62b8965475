use std::thread;
use std::time::{Duration, Instant};

use crate::error::DeployError;
use crate::jobs::model::JobStatus;
use crate::transfer::{StatusSnapshot, TransferError};

/// Interval between consecutive status checks.
pub const POLL_INTERVAL_MS: u64 = 500;

/// Consecutive transient failures tolerated before the poll aborts.
pub const MAX_CONSECUTIVE_RETRYABLE_ERRORS: usize = 5;

/// Receives every successful status snapshot as it arrives.
pub trait PollObserver {
    fn on_update(&mut self, snapshot: &StatusSnapshot);
}

/// Knobs for one polling run.
#[derive(Clone, Copy, Debug)]
pub struct PollConfig {
    pub interval: Duration,
    pub wait_minutes: u64,
    pub max_consecutive_errors: usize,
}

impl PollConfig {
    pub fn with_wait_minutes(wait_minutes: u64) -> Self {
        Self {
            interval: Duration::from_millis(POLL_INTERVAL_MS),
            wait_minutes,
            max_consecutive_errors: MAX_CONSECUTIVE_RETRYABLE_ERRORS,
        }
    }
}

/// Polls the status source until the job reaches a terminal status, the wait
/// budget runs out, or the transient-failure ceiling is hit.
///
/// Transient transport failures are retried silently; the counter resets on
/// every successful check. Anything else aborts immediately. A timeout is a
/// local condition only: the job keeps running on the org.
pub fn poll_status<F>(
    job_id: &str,
    mut check: F,
    config: PollConfig,
    observer: &mut dyn PollObserver,
) -> Result<StatusSnapshot, DeployError>
where
    F: FnMut() -> Result<StatusSnapshot, TransferError>,
{
    let deadline = Instant::now() + Duration::from_secs(config.wait_minutes * 60);
    let mut consecutive_failures = 0usize;
    let mut last_status = JobStatus::Pending;

    loop {
        match check() {
            Ok(snapshot) => {
                consecutive_failures = 0;
                last_status = snapshot.status;
                observer.on_update(&snapshot);
                if snapshot.status.is_terminal() {
                    return Ok(snapshot);
                }
            }
            Err(err) if err.is_transient() => {
                consecutive_failures += 1;
                if consecutive_failures >= config.max_consecutive_errors {
                    return Err(DeployError::RetryLimitExceeded {
                        limit: config.max_consecutive_errors,
                        last: err.to_string(),
                    });
                }
            }
            Err(err) => return Err(DeployError::Transfer(err)),
        }

        if Instant::now() >= deadline {
            return Err(DeployError::ClientTimeout {
                id: job_id.to_string(),
                last_status,
                wait_minutes: config.wait_minutes,
            });
        }
        thread::sleep(config.interval);
    }
}
