use std::io::Write;
use std::process::{Command as StdCommand, Stdio};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde::ser::Serialize;

use crate::transfer::{
    Conflict, DeployPayload, RetrievePayload, StartedJob, StatusSnapshot, TransferError, Transport,
};

/// Name of the metadata transport executable resolved from `PATH`.
pub const TRANSPORT_BIN: &str = "mdt";

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ServerFailure,
}

#[derive(Debug, Deserialize)]
struct ServerFailure {
    name: String,
    message: String,
    #[serde(default)]
    conflicts: Vec<Conflict>,
}

/// Transport implementation that shells out to the `mdt` executable, passing
/// request JSON on stdin and reading a single JSON response from stdout. The
/// executable owns authentication and the org wire protocol.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessTransport;

impl ProcessTransport {
    fn run(&self, args: &[&str], input: Option<String>) -> Result<String, TransferError> {
        let mut command = StdCommand::new(TRANSPORT_BIN);
        command.args(args);
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = command.spawn().map_err(|err| {
            TransferError::Transport(format!("failed to launch {TRANSPORT_BIN}: {err}"))
        })?;
        if let Some(payload) = input {
            let Some(mut stdin) = child.stdin.take() else {
                return Err(TransferError::Transport(format!(
                    "{TRANSPORT_BIN} did not expose stdin for the request payload"
                )));
            };
            stdin.write_all(payload.as_bytes()).map_err(|err| {
                TransferError::Transport(format!(
                    "failed to send request to {TRANSPORT_BIN}: {err}"
                ))
            })?;
        }

        let output = child.wait_with_output().map_err(|err| {
            TransferError::Transport(format!("failed to wait for {TRANSPORT_BIN}: {err}"))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(TransferError::Transport(if stderr.is_empty() {
                format!("{TRANSPORT_BIN} exited with {}", output.status)
            } else {
                stderr
            }));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn invoke<T: DeserializeOwned>(
        &self,
        args: &[&str],
        input: Option<String>,
    ) -> Result<T, TransferError> {
        let raw = self.run(args, input)?;
        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&raw) {
            return Err(TransferError::Server {
                name: envelope.error.name,
                message: envelope.error.message,
                conflicts: envelope.error.conflicts,
            });
        }
        serde_json::from_str(&raw).map_err(|err| {
            TransferError::Transport(format!("unexpected response from {TRANSPORT_BIN}: {err}"))
        })
    }
}

fn encode<T: Serialize>(payload: &T) -> Result<String, TransferError> {
    serde_json::to_string(payload)
        .map_err(|err| TransferError::Transport(format!("failed to encode request payload: {err}")))
}

impl Transport for ProcessTransport {
    fn start_deploy(&self, payload: &DeployPayload) -> Result<StartedJob, TransferError> {
        self.invoke(&["deploy", "start"], Some(encode(payload)?))
    }

    fn check_deploy(&self, job_id: &str) -> Result<StatusSnapshot, TransferError> {
        self.invoke(&["deploy", "status", job_id], None)
    }

    fn cancel_deploy(&self, job_id: &str) -> Result<StatusSnapshot, TransferError> {
        self.invoke(&["deploy", "cancel", job_id], None)
    }

    fn quick_deploy(&self, job_id: &str) -> Result<StartedJob, TransferError> {
        self.invoke(&["deploy", "quick", job_id], None)
    }

    fn start_retrieve(&self, payload: &RetrievePayload) -> Result<StartedJob, TransferError> {
        self.invoke(&["retrieve", "start"], Some(encode(payload)?))
    }

    fn check_retrieve(&self, job_id: &str) -> Result<StatusSnapshot, TransferError> {
        self.invoke(&["retrieve", "status", job_id], None)
    }
}
