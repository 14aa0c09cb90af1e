//! Synchronization engine: export and import between a patch-queue
//! branch and the on-disk patch series.

pub mod author;
pub mod directives;
pub mod export;
pub mod import;

use std::path::PathBuf;

use log::{info, warn};
use thiserror::Error;

use crate::patch::{PatchDescriptor, PatchError};
use crate::queue::{self, QueueError, QueuePattern};
use crate::repo::{Identity, RepoError, Repository};
use crate::specdoc::SpecError;

pub use export::{export_patches, update_spec_document, ExportOptions, ExportReport, PatchLayout};
pub use import::import_series;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("already on a patch-queue branch '{0}'")]
    AlreadyOnQueue(String),

    #[error("patch-queue branch '{0}' already exists. Try 'rebase' instead")]
    QueueExists(String),

    #[error("couldn't apply patches")]
    ApplyExhausted,

    #[error("failed to apply '{path}': {source}")]
    Apply { path: PathBuf, source: RepoError },

    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Spec(#[from] SpecError),
}

/// Apply one patch to the working tree and commit it on the current
/// branch: the patch's own authorship when present (the fallback
/// otherwise), message = subject + long description, plus a topic
/// directive line when a topic is set.
pub fn apply_and_commit(
    repo: &dyn Repository,
    patch: &PatchDescriptor,
    fallback: &Identity,
    topic: Option<&str>,
) -> Result<(), SyncError> {
    let author = if patch.has_authorship() {
        Identity {
            name: patch.author.clone().unwrap_or_default(),
            email: patch.email.clone().unwrap_or_default(),
            date: patch.date,
        }
    } else {
        warn!(
            "patch '{}' has no authorship information, using '{} <{}>'",
            patch.file_name(),
            fallback.name,
            fallback.email
        );
        fallback.clone()
    };

    repo.apply_patch(&patch.path, patch.strip)
        .map_err(|source| SyncError::Apply {
            path: patch.path.clone(),
            source,
        })?;
    let tree = repo.write_tree()?;

    let mut message = format!("{}\n\n{}", patch.subject, patch.long_desc);
    if let Some(topic) = topic {
        message.push_str(&format!("\nGbp-Pq: Topic {topic}"));
    }

    let head = repo.head()?;
    let commit = repo.commit_tree(&tree, &message, &[head], &author)?;
    repo.update_ref(
        "HEAD",
        &commit,
        &format!("patchq import {}", patch.path.display()),
    )?;
    Ok(())
}

/// Apply a single patch on the queue branch for `branch`, creating and
/// switching to it first. Application failure is surfaced, not retried.
pub fn apply_single(
    repo: &dyn Repository,
    branch: &str,
    patch: &PatchDescriptor,
    fallback: &Identity,
    topic: Option<&str>,
    pattern: &QueuePattern,
) -> Result<(), SyncError> {
    queue::switch_to_queue(repo, branch, pattern, &[])?;
    apply_and_commit(repo, patch, fallback, topic)?;
    info!("applied {}", patch.file_name());
    Ok(())
}
