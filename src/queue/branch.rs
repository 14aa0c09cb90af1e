//! Transitions between a base branch and its patch-queue branch.
//!
//! The queue branch is derived, never stored: its relationship to the
//! base is a pure function of the configured pattern, and existence is
//! queried from the repository at call time.

use log::info;

use super::{QueueError, QueuePattern};
use crate::repo::Repository;

/// Switch to the queue branch for `branch`, creating it at the base's
/// current tip when missing. A no-op when `branch` already is a queue
/// branch.
pub fn switch_to_queue(
    repo: &dyn Repository,
    branch: &str,
    pattern: &QueuePattern,
    extra: &[(&str, &str)],
) -> Result<(), QueueError> {
    let Some(queue) = pattern.queue_name(branch, extra) else {
        return Ok(());
    };
    if !repo.has_branch(&queue)? {
        repo.create_branch(&queue, branch)
            .map_err(|source| QueueError::CreateFailed {
                name: queue.clone(),
                source,
            })?;
    }
    info!("switching to '{queue}'");
    repo.checkout(&queue)?;
    Ok(())
}

/// Delete the queue branch associated with `branch` if it exists.
/// Refused while `branch` itself is a queue branch.
pub fn drop_queue(
    repo: &dyn Repository,
    branch: &str,
    pattern: &QueuePattern,
    extra: &[(&str, &str)],
) -> Result<(), QueueError> {
    let queue = pattern
        .queue_name(branch, extra)
        .ok_or_else(|| QueueError::OnQueueBranch(branch.to_string()))?;

    if repo.has_branch(&queue)? {
        repo.delete_branch(&queue)?;
        info!("dropped branch '{queue}'");
    } else {
        info!("no patch-queue branch found, doing nothing");
    }
    Ok(())
}

/// Toggle between a base branch and its queue branch.
pub fn switch(
    repo: &dyn Repository,
    current: &str,
    pattern: &QueuePattern,
) -> Result<(), QueueError> {
    match pattern.base_of(current) {
        Some(base) => {
            info!("switching to '{base}'");
            repo.checkout(&base)?;
            Ok(())
        }
        None => switch_to_queue(repo, current, pattern, &[]),
    }
}

/// Rebase the queue branch onto its base, switching to the queue branch
/// first when needed.
pub fn rebase_queue(
    repo: &dyn Repository,
    current: &str,
    pattern: &QueuePattern,
) -> Result<(), QueueError> {
    let base = match pattern.base_of(current) {
        Some(base) => base,
        None => {
            switch_to_queue(repo, current, pattern, &[])?;
            current.to_string()
        }
    };
    repo.rebase(&base)?;
    Ok(())
}
