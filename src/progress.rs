use owo_colors::OwoColorize;

use crate::jobs::model::JobStatus;
use crate::transfer::StatusSnapshot;
use crate::transfer::poll::PollObserver;

/// Renders stage transitions for an in-flight job.
///
/// Purely an observer of poll snapshots: it never touches the cache or the
/// job itself, and it stays silent when the command asked for JSON output.
pub struct ProgressReporter {
    enabled: bool,
    last: Option<(JobStatus, u32, u32)>,
}

impl ProgressReporter {
    pub fn human() -> Self {
        Self {
            enabled: true,
            last: None,
        }
    }

    pub fn silent() -> Self {
        Self {
            enabled: false,
            last: None,
        }
    }

    /// Surfaces the local wait budget running out as its own display status;
    /// the underlying error still propagates to the caller.
    pub fn client_timeout(&mut self) {
        if self.enabled {
            println!("Status: {}", "Client Timeout".yellow());
        }
    }
}

impl PollObserver for ProgressReporter {
    fn on_update(&mut self, snapshot: &StatusSnapshot) {
        if !self.enabled {
            return;
        }
        let key = (
            snapshot.status,
            snapshot.components_deployed,
            snapshot.tests_completed,
        );
        if self.last == Some(key) {
            return;
        }
        self.last = Some(key);

        let mut line = format!("Status: {}", paint_status(snapshot.status));
        if snapshot.components_total > 0 {
            line.push_str(&format!(
                "  components: {}/{}",
                snapshot.components_deployed, snapshot.components_total
            ));
        }
        if snapshot.tests_total > 0 {
            line.push_str(&format!(
                "  tests: {}/{}",
                snapshot.tests_completed, snapshot.tests_total
            ));
        }
        println!("{line}");
    }
}

/// Styles a status for terminal output.
pub fn paint_status(status: JobStatus) -> String {
    match status {
        JobStatus::Succeeded => status.as_str().green().to_string(),
        JobStatus::Failed | JobStatus::Canceled => status.as_str().red().to_string(),
        JobStatus::SucceededPartial | JobStatus::Canceling => status.as_str().yellow().to_string(),
        JobStatus::Pending | JobStatus::InProgress => status.as_str().cyan().to_string(),
    }
}
