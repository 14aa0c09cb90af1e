//! Import: replay a patch series as commits on a fresh queue branch,
//! with the time-machine retry.
//!
//! When patches fail to apply at the base's tip, the loop walks back
//! through up to `max_tries` first-parent ancestors, newest first, and
//! retries from each. Every failed attempt resets the working tree and
//! deletes the partially-built queue branch before the next candidate;
//! running out of candidates is an explicit failure.

use std::path::Path;

use log::{debug, error, info};

use super::{apply_and_commit, author, SyncError};
use crate::patch::PatchSeries;
use crate::queue::{self, QueueError, QueuePattern};
use crate::repo::Repository;
use crate::scratch::ScratchCopy;

/// Build the queue branch for `branch` from the series at
/// `series_file`, returning the queue branch's name.
///
/// `force` permits running from a queue branch (the underlying base is
/// checked out first) and replaces an already-existing queue branch.
pub fn import_series(
    repo: &dyn Repository,
    branch: &str,
    series_file: &Path,
    max_tries: usize,
    force: bool,
    pattern: &QueuePattern,
) -> Result<String, SyncError> {
    let base = match pattern.base_of(branch) {
        Some(base) => {
            if !force {
                return Err(SyncError::AlreadyOnQueue(branch.to_string()));
            }
            repo.checkout(&base)?;
            base
        }
        None => branch.to_string(),
    };
    let queue = pattern
        .queue_name(&base, &[])
        .ok_or_else(|| SyncError::AlreadyOnQueue(base.clone()))?;

    if repo.has_branch(&queue)? {
        if force {
            queue::drop_queue(repo, &base, pattern, &[])?;
        } else {
            return Err(SyncError::QueueExists(queue));
        }
    }

    let fallback = author::fallback_identity();
    let candidates = repo.recent_commits(&base, max_tries.max(1), true)?;

    // Walking back in history invalidates the working copy, so the
    // patches are read from a safe copy taken up front.
    let mut scratch = None;
    let series_path = if candidates.len() > 1 {
        let copy = ScratchCopy::begin(series_file).map_err(|source| SyncError::Io {
            action: "copy",
            path: series_file.to_path_buf(),
            source,
        })?;
        let path = copy.series_path().to_path_buf();
        scratch = Some(copy);
        path
    } else {
        series_file.to_path_buf()
    };
    let series = PatchSeries::read(&series_path)?;

    let mut remaining = candidates.len();
    let mut succeeded = false;
    for commit in &candidates {
        if candidates.len() > 1 {
            info!(
                "{remaining} {} left",
                if remaining > 1 { "tries" } else { "try" }
            );
        }
        info!("trying to apply patches at '{commit}'");
        repo.create_branch(&queue, commit)
            .map_err(|source| QueueError::CreateFailed {
                name: queue.clone(),
                source,
            })?;
        repo.checkout(&queue)?;

        let mut applied_all = true;
        for patch in series.iter() {
            debug!("applying {}", patch.path.display());
            if let Err(err) = apply_and_commit(repo, patch, &fallback, patch.topic.as_deref()) {
                error!("failed to apply '{}': {err}", patch.path.display());
                repo.force_head("HEAD", true)?;
                repo.checkout(&base)?;
                repo.delete_branch(&queue)?;
                applied_all = false;
                break;
            }
        }
        if applied_all {
            succeeded = true;
            break;
        }
        remaining -= 1;
    }

    drop(scratch);
    if !succeeded {
        return Err(SyncError::ApplyExhausted);
    }
    Ok(queue)
}
