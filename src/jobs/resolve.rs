use chrono::{DateTime, Utc};

use crate::error::DeployError;
use crate::jobs::cache::JobCache;
use crate::jobs::model::JobId;

/// Length of a canonical org-scoped job id.
pub const LONG_ID_LEN: usize = 18;

/// Length of the short form accepted as a lookup alias.
pub const SHORT_ID_LEN: usize = 15;

/// Normalizes a user-supplied id to the canonical 18-character form.
///
/// 18-character input is returned unchanged without an existence check; the
/// short form is expanded against the live cache keys, first match winning
/// when more than one key shares the prefix.
pub fn resolve_long_id(
    cache: &JobCache,
    input: &str,
    now: DateTime<Utc>,
) -> Result<JobId, DeployError> {
    match input.len() {
        LONG_ID_LEN => Ok(input.to_string()),
        SHORT_ID_LEN => cache
            .live_keys(now)
            .into_iter()
            .find(|key| key.starts_with(input))
            .map(str::to_string)
            .ok_or_else(|| DeployError::InvalidJobId(input.to_string())),
        _ => Err(DeployError::InvalidJobId(input.to_string())),
    }
}

/// Like [`resolve_long_id`], but an ambiguous short id is an error instead of
/// silently picking the first match.
pub fn resolve_long_id_strict(
    cache: &JobCache,
    input: &str,
    now: DateTime<Utc>,
) -> Result<JobId, DeployError> {
    if input.len() != SHORT_ID_LEN {
        return resolve_long_id(cache, input, now);
    }
    let matches: Vec<JobId> = cache
        .live_keys(now)
        .into_iter()
        .filter(|key| key.starts_with(input))
        .map(str::to_string)
        .collect();
    match matches.len() {
        0 => Err(DeployError::InvalidJobId(input.to_string())),
        1 => Ok(matches.into_iter().next().unwrap_or_default()),
        _ => Err(DeployError::AmbiguousJobId {
            input: input.to_string(),
            matches,
        }),
    }
}

/// Resolves the job a command should act on, from either an explicit id or
/// the most recently cached one.
///
/// `require_cached` is false for quick deploy, where the id refers to a
/// validation job that may legitimately not be cached yet.
pub fn resolve_latest(
    cache: &JobCache,
    use_most_recent: bool,
    explicit_id: Option<&str>,
    require_cached: bool,
    now: DateTime<Utc>,
) -> Result<JobId, DeployError> {
    let candidate = if use_most_recent {
        cache
            .latest_key(now)
            .map(str::to_string)
            .ok_or(DeployError::NoRecentJobId)?
    } else {
        explicit_id
            .map(str::to_string)
            .ok_or(DeployError::NoRecentJobId)?
    };

    let resolved = resolve_long_id(cache, &candidate, now)?;
    if require_cached {
        cache.get(&resolved, now)?;
    }
    Ok(resolved)
}
