//! The version-control collaborator consumed by the sync engine.
//!
//! The engine never talks to a repository implementation directly; every
//! operation receives a [`Repository`] reference from its caller. The
//! checked-out branch and working tree are process-wide mutable state, so
//! callers must serialize operations against one repository path.

use std::path::Path;

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

pub mod git;

pub use git::GitRepository;

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("git {args:?} failed ({status}): {stderr}")]
    Git {
        args: Vec<String>,
        status: i32,
        stderr: String,
    },

    #[error("failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("unexpected git output: {0}")]
    Parse(String),
}

/// Author or committer identity attached to a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
    pub date: Option<DateTime<FixedOffset>>,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            date: None,
        }
    }

    /// Both name and email are present and non-empty.
    pub fn is_complete(&self) -> bool {
        !self.name.is_empty() && !self.email.is_empty()
    }
}

/// Change status of one path within a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    Other,
}

impl FileStatus {
    pub fn from_letter(letter: char) -> Self {
        match letter {
            'A' => FileStatus::Added,
            'M' => FileStatus::Modified,
            'D' => FileStatus::Deleted,
            'R' => FileStatus::Renamed,
            'C' => FileStatus::Copied,
            _ => FileStatus::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub status: FileStatus,
    pub path: String,
}

/// Metadata of a single commit, as needed for patch generation.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: String,
    pub author: Identity,
    pub committer: Identity,
    pub subject: String,
    pub body: String,
    pub files: Vec<ChangedFile>,
}

impl CommitInfo {
    /// Paths touched by the commit, in listing order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.path.as_str())
    }
}

/// Operations the sync engine requires from a repository.
///
/// Branch switches and working-tree mutations take effect immediately;
/// there is no transactionality beyond what the individual operations
/// provide.
pub trait Repository {
    /// Name of the currently checked-out branch.
    fn current_branch(&self) -> Result<String, RepoError>;

    fn has_branch(&self, name: &str) -> Result<bool, RepoError>;

    /// Create `name` pointing at `start` without switching to it.
    fn create_branch(&self, name: &str, start: &str) -> Result<(), RepoError>;

    fn delete_branch(&self, name: &str) -> Result<(), RepoError>;

    /// Check out an existing branch. Fails on a dirty or blocked checkout.
    fn checkout(&self, name: &str) -> Result<(), RepoError>;

    /// Commit ids reachable from `until` but not from `since`, newest first.
    fn commits_between(
        &self,
        since: &str,
        until: &str,
        first_parent: bool,
    ) -> Result<Vec<String>, RepoError>;

    /// The most recent `limit` commit ids on `branch`, newest first.
    fn recent_commits(
        &self,
        branch: &str,
        limit: usize,
        first_parent: bool,
    ) -> Result<Vec<String>, RepoError>;

    fn commit_info(&self, id: &str) -> Result<CommitInfo, RepoError>;

    /// Patch text of a single commit against its parent, restricted to
    /// `paths` when non-empty, with a diffstat/summary preamble when
    /// `with_stat` is set.
    fn commit_diff(
        &self,
        id: &str,
        paths: &[String],
        with_stat: bool,
    ) -> Result<String, RepoError>;

    /// Apply a patch file to the working tree and index at the given
    /// strip level. Fails if the patch does not apply cleanly.
    fn apply_patch(&self, patch: &Path, strip: u32) -> Result<(), RepoError>;

    /// Write the current index as a tree object, returning its id.
    fn write_tree(&self) -> Result<String, RepoError>;

    fn commit_tree(
        &self,
        tree: &str,
        message: &str,
        parents: &[String],
        author: &Identity,
    ) -> Result<String, RepoError>;

    fn update_ref(&self, name: &str, commit: &str, reason: &str) -> Result<(), RepoError>;

    /// Reset the working tree (and, when `hard`, the index) to `refspec`.
    fn force_head(&self, refspec: &str, hard: bool) -> Result<(), RepoError>;

    /// Commit id of the current HEAD.
    fn head(&self) -> Result<String, RepoError>;

    /// Whether the working tree is clean, plus status detail.
    fn is_clean(&self) -> Result<(bool, String), RepoError>;

    fn add_files(&self, path: &Path) -> Result<(), RepoError>;

    fn commit_staged(&self, message: &str) -> Result<(), RepoError>;

    /// Contents of `path` as committed on `rev`, or `None` if the file
    /// does not exist there.
    fn read_file(&self, rev: &str, path: &str) -> Result<Option<String>, RepoError>;

    /// Rebase the current branch onto `onto`.
    fn rebase(&self, onto: &str) -> Result<(), RepoError>;
}
