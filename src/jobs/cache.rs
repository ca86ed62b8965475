use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::DeployError;
use crate::jobs::model::{CachedJob, JobId, JobPatch};

/// Name of the per-project folder that holds plugin state.
pub const STATE_DIR_NAME: &str = ".metadeploy";

/// File inside the state folder that tracks in-flight and recent jobs.
pub const CACHE_FILE_NAME: &str = "deploy-cache.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    latest: Option<JobId>,
    #[serde(default)]
    jobs: BTreeMap<JobId, CachedJob>,
}

/// Disk-backed TTL cache keyed by deploy job id.
///
/// The whole document is read into memory when the cache is opened and only
/// flushed by an explicit `write()`, so a command can batch several mutations
/// into a single disk write. There is no cross-process locking: concurrent
/// invocations race with last-write-wins, but the atomic rename in `write()`
/// guarantees readers never observe a torn file.
#[derive(Debug)]
pub struct JobCache {
    path: PathBuf,
    doc: CacheDocument,
}

impl JobCache {
    /// Opens the cache file inside the given state folder, treating a missing
    /// file as an empty cache.
    pub fn open(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(CACHE_FILE_NAME);
        let doc = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse deploy cache at {}", path.display()))?,
            Err(err) if err.kind() == ErrorKind::NotFound => CacheDocument::default(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read deploy cache at {}", path.display()));
            }
        };
        Ok(Self { path, doc })
    }

    /// Opens the cache for the project containing the working directory,
    /// walking up until an existing state folder is found.
    pub fn discover() -> Result<Self> {
        let cwd = env::current_dir().context("failed to resolve current working directory")?;
        let state_dir = find_state_dir(&cwd).unwrap_or_else(|| cwd.join(STATE_DIR_NAME));
        Self::open(&state_dir)
    }

    /// Returns the live entry for the given canonical id.
    pub fn get(&self, job_id: &str, now: DateTime<Utc>) -> Result<&CachedJob, DeployError> {
        self.doc
            .jobs
            .get(job_id)
            .filter(|entry| entry.is_live(now))
            .ok_or_else(|| DeployError::InvalidJobId(job_id.to_string()))
    }

    /// Merges the patch into an existing or new entry and marks the id as the
    /// most recently written key. Callers must still `write()` to persist.
    pub fn upsert(&mut self, job_id: &str, patch: JobPatch, now: DateTime<Utc>) {
        let entry = self
            .doc
            .jobs
            .entry(job_id.to_string())
            .or_insert_with(|| CachedJob::new(job_id, now));
        entry.apply(patch);
        self.doc.latest = Some(job_id.to_string());
    }

    /// Removes an entry, e.g. after a successful resume so a finished job is
    /// never re-resumed.
    pub fn unset(&mut self, job_id: &str) {
        self.doc.jobs.remove(job_id);
        if self.doc.latest.as_deref() == Some(job_id) {
            self.doc.latest = None;
        }
    }

    /// The most recently written live key, falling back to the newest live
    /// entry when the recorded key has been removed or expired.
    pub fn latest_key(&self, now: DateTime<Utc>) -> Option<&str> {
        if let Some(latest) = self.doc.latest.as_deref() {
            if self
                .doc
                .jobs
                .get(latest)
                .is_some_and(|entry| entry.is_live(now))
            {
                return Some(latest);
            }
        }
        self.doc
            .jobs
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .max_by_key(|(_, entry)| entry.created_at)
            .map(|(key, _)| key.as_str())
    }

    /// All live keys, in stable lexicographic order.
    pub fn live_keys(&self, now: DateTime<Utc>) -> Vec<&str> {
        self.doc
            .jobs
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key.as_str())
            .collect()
    }

    /// Flushes the in-memory state to disk, dropping entries that have aged
    /// out of the retention window along the way.
    pub fn write(&mut self) -> Result<()> {
        let now = Utc::now();
        self.doc.jobs.retain(|_, entry| entry.is_live(now));
        if let Some(latest) = self.doc.latest.clone() {
            if !self.doc.jobs.contains_key(&latest) {
                self.doc.latest = None;
            }
        }

        let parent = self
            .path
            .parent()
            .context("deploy cache path is missing a parent directory")?;
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create state folder at {}", parent.display()))?;
        let payload = serde_json::to_vec_pretty(&self.doc).context("failed to serialize deploy cache")?;
        let mut temp = NamedTempFile::new_in(parent)
            .with_context(|| format!("failed to create temp file in {}", parent.display()))?;
        temp.write_all(&payload)
            .with_context(|| format!("failed to write deploy cache at {}", self.path.display()))?;
        temp.as_file()
            .sync_all()
            .with_context(|| format!("failed to sync deploy cache at {}", self.path.display()))?;
        temp.persist(&self.path)
            .map_err(|err| err.error)
            .with_context(|| format!("failed to persist deploy cache at {}", self.path.display()))?;
        Ok(())
    }
}

fn find_state_dir(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        let candidate = dir.join(STATE_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }
        current = dir.parent();
    }
    None
}
