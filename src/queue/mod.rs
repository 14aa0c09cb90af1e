//! Patch-queue branch naming and the branch state machine.

pub mod branch;
pub mod pattern;

use thiserror::Error;

use crate::repo::RepoError;

pub use branch::{drop_queue, rebase_queue, switch, switch_to_queue};
pub use pattern::{QueuePattern, DEFAULT_QUEUE_PATTERN};

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("invalid queue-branch pattern '{0}': must contain the {{branch}} placeholder")]
    PatternMissingBranch(String),

    #[error("invalid queue-branch pattern '{0}': {1}")]
    InvalidPattern(String, String),

    #[error("cannot create patch-queue branch '{name}': {source}. Try 'rebase' instead")]
    CreateFailed { name: String, source: RepoError },

    #[error("on patch-queue branch '{0}', can't drop it")]
    OnQueueBranch(String),

    #[error(transparent)]
    Repo(#[from] RepoError),
}
