//! In-memory repository double for driving the sync engine.
//!
//! Branches are ordered commit lists; patch application succeeds only
//! when the queue branch was created at a commit the test marked as
//! good, which is what the time-machine tests steer on.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{FixedOffset, TimeZone};
use patchq::repo::{ChangedFile, CommitInfo, FileStatus, Identity, RepoError, Repository};

#[derive(Debug, Clone)]
pub struct MockCommit {
    pub id: String,
    pub subject: String,
    pub body: String,
    pub files: Vec<String>,
    pub diff: String,
}

pub fn commit(id: &str, subject: &str, body: &str, files: &[&str], diff: &str) -> MockCommit {
    MockCommit {
        id: id.to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
        files: files.iter().map(|f| f.to_string()).collect(),
        diff: diff.to_string(),
    }
}

struct State {
    /// Branch name to commits, oldest first.
    branches: HashMap<String, Vec<MockCommit>>,
    current: String,
    /// Commit each branch was created at.
    created_at: HashMap<String, String>,
    /// Commits where patch application succeeds.
    apply_ok_at: HashSet<String>,
    clean: bool,
    /// `(rev, path)` to committed file content.
    committed_files: HashMap<(String, String), String>,
    /// Messages passed to `commit_staged`.
    staged_messages: Vec<String>,
    /// Commits created by `commit_tree` awaiting `update_ref`.
    pending: HashMap<String, MockCommit>,
    /// Chronological operation log.
    log: Vec<String>,
    counter: usize,
}

pub struct MockRepo {
    state: RefCell<State>,
}

impl MockRepo {
    pub fn new(branch: &str, commits: Vec<MockCommit>) -> Self {
        let mut branches = HashMap::new();
        branches.insert(branch.to_string(), commits);
        Self {
            state: RefCell::new(State {
                branches,
                current: branch.to_string(),
                created_at: HashMap::new(),
                apply_ok_at: HashSet::new(),
                clean: true,
                committed_files: HashMap::new(),
                staged_messages: Vec::new(),
                pending: HashMap::new(),
                log: Vec::new(),
                counter: 0,
            }),
        }
    }

    pub fn add_branch(&self, name: &str, commits: Vec<MockCommit>) {
        self.state
            .borrow_mut()
            .branches
            .insert(name.to_string(), commits);
    }

    /// Mark the base commits at which `apply_patch` succeeds.
    pub fn allow_apply_at(&self, ids: &[&str]) {
        let mut state = self.state.borrow_mut();
        state.apply_ok_at = ids.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_clean(&self, clean: bool) {
        self.state.borrow_mut().clean = clean;
    }

    pub fn set_committed_file(&self, rev: &str, path: &str, content: &str) {
        self.state
            .borrow_mut()
            .committed_files
            .insert((rev.to_string(), path.to_string()), content.to_string());
    }

    pub fn branch_commits(&self, name: &str) -> Option<Vec<MockCommit>> {
        self.state.borrow().branches.get(name).cloned()
    }

    pub fn branch_created_at(&self, name: &str) -> Option<String> {
        self.state.borrow().created_at.get(name).cloned()
    }

    pub fn staged_messages(&self) -> Vec<String> {
        self.state.borrow().staged_messages.clone()
    }

    pub fn operations(&self) -> Vec<String> {
        self.state.borrow().log.clone()
    }

    fn record(&self, op: String) {
        self.state.borrow_mut().log.push(op);
    }

    fn err(message: &str) -> RepoError {
        RepoError::Git {
            args: vec!["mock".to_string()],
            status: 1,
            stderr: message.to_string(),
        }
    }

    fn test_identity() -> Identity {
        let mut identity = Identity::new("Test Author", "author@example.com");
        identity.date = Some(
            FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2025, 6, 2, 12, 0, 0)
                .unwrap(),
        );
        identity
    }
}

impl Repository for MockRepo {
    fn current_branch(&self) -> Result<String, RepoError> {
        Ok(self.state.borrow().current.clone())
    }

    fn has_branch(&self, name: &str) -> Result<bool, RepoError> {
        Ok(self.state.borrow().branches.contains_key(name))
    }

    fn create_branch(&self, name: &str, start: &str) -> Result<(), RepoError> {
        let mut state = self.state.borrow_mut();
        if state.branches.contains_key(name) {
            return Err(Self::err(&format!("branch '{name}' already exists")));
        }
        // Start point is a branch name or a commit id on some branch.
        let (commits, at) = if let Some(commits) = state.branches.get(start) {
            let at = commits.last().map(|c| c.id.clone()).unwrap_or_default();
            (commits.clone(), at)
        } else {
            let found = state.branches.values().find_map(|commits| {
                commits
                    .iter()
                    .position(|c| c.id == start)
                    .map(|pos| commits[..=pos].to_vec())
            });
            match found {
                Some(commits) => (commits, start.to_string()),
                None => return Err(Self::err(&format!("unknown start point '{start}'"))),
            }
        };
        state.branches.insert(name.to_string(), commits);
        state.created_at.insert(name.to_string(), at);
        state.log.push(format!("create {name} at {start}"));
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> Result<(), RepoError> {
        let mut state = self.state.borrow_mut();
        if state.branches.remove(name).is_none() {
            return Err(Self::err(&format!("no branch '{name}'")));
        }
        state.log.push(format!("delete {name}"));
        Ok(())
    }

    fn checkout(&self, name: &str) -> Result<(), RepoError> {
        let mut state = self.state.borrow_mut();
        if !state.branches.contains_key(name) {
            return Err(Self::err(&format!("no branch '{name}'")));
        }
        state.current = name.to_string();
        state.log.push(format!("checkout {name}"));
        Ok(())
    }

    fn commits_between(
        &self,
        since: &str,
        until: &str,
        _first_parent: bool,
    ) -> Result<Vec<String>, RepoError> {
        let state = self.state.borrow();
        let since_ids: HashSet<&str> = state
            .branches
            .get(since)
            .ok_or_else(|| Self::err(&format!("no branch '{since}'")))?
            .iter()
            .map(|c| c.id.as_str())
            .collect();
        let until_commits = state
            .branches
            .get(until)
            .ok_or_else(|| Self::err(&format!("no branch '{until}'")))?;
        Ok(until_commits
            .iter()
            .rev()
            .filter(|c| !since_ids.contains(c.id.as_str()))
            .map(|c| c.id.clone())
            .collect())
    }

    fn recent_commits(
        &self,
        branch: &str,
        limit: usize,
        _first_parent: bool,
    ) -> Result<Vec<String>, RepoError> {
        let state = self.state.borrow();
        let commits = state
            .branches
            .get(branch)
            .ok_or_else(|| Self::err(&format!("no branch '{branch}'")))?;
        Ok(commits
            .iter()
            .rev()
            .take(limit)
            .map(|c| c.id.clone())
            .collect())
    }

    fn commit_info(&self, id: &str) -> Result<CommitInfo, RepoError> {
        let state = self.state.borrow();
        let commit = state
            .branches
            .values()
            .flat_map(|commits| commits.iter())
            .find(|c| c.id == id)
            .ok_or_else(|| Self::err(&format!("no commit '{id}'")))?;
        Ok(CommitInfo {
            id: commit.id.clone(),
            author: Self::test_identity(),
            committer: Self::test_identity(),
            subject: commit.subject.clone(),
            body: commit.body.clone(),
            files: commit
                .files
                .iter()
                .map(|path| ChangedFile {
                    status: FileStatus::Modified,
                    path: path.clone(),
                })
                .collect(),
        })
    }

    fn commit_diff(
        &self,
        id: &str,
        _paths: &[String],
        _with_stat: bool,
    ) -> Result<String, RepoError> {
        let state = self.state.borrow();
        state
            .branches
            .values()
            .flat_map(|commits| commits.iter())
            .find(|c| c.id == id)
            .map(|c| c.diff.clone())
            .ok_or_else(|| Self::err(&format!("no commit '{id}'")))
    }

    fn apply_patch(&self, patch: &Path, _strip: u32) -> Result<(), RepoError> {
        let mut state = self.state.borrow_mut();
        let current = state.current.clone();
        let at = state.created_at.get(&current).cloned().unwrap_or_default();
        state.log.push(format!(
            "apply {} on {current}",
            patch.file_name().unwrap_or_default().to_string_lossy()
        ));
        if state.apply_ok_at.contains(&at) {
            Ok(())
        } else {
            Err(Self::err(&format!(
                "patch does not apply at '{at}'"
            )))
        }
    }

    fn write_tree(&self) -> Result<String, RepoError> {
        let mut state = self.state.borrow_mut();
        state.counter += 1;
        Ok(format!("tree-{}", state.counter))
    }

    fn commit_tree(
        &self,
        _tree: &str,
        message: &str,
        parents: &[String],
        _author: &Identity,
    ) -> Result<String, RepoError> {
        let mut state = self.state.borrow_mut();
        state.counter += 1;
        let id = format!("applied-{}", state.counter);
        let (subject, body) = match message.split_once("\n\n") {
            Some((subject, body)) => (subject.to_string(), body.to_string()),
            None => (message.to_string(), String::new()),
        };
        let parent = parents.first().cloned().unwrap_or_default();
        state.log.push(format!("commit {id} parent {parent}"));
        state.pending.insert(
            id.clone(),
            MockCommit {
                id: id.clone(),
                subject,
                body,
                files: Vec::new(),
                diff: String::new(),
            },
        );
        Ok(id)
    }

    fn update_ref(&self, _name: &str, commit: &str, _reason: &str) -> Result<(), RepoError> {
        let mut state = self.state.borrow_mut();
        let pending = state
            .pending
            .remove(commit)
            .ok_or_else(|| Self::err(&format!("no pending commit '{commit}'")))?;
        let current = state.current.clone();
        state
            .branches
            .get_mut(&current)
            .ok_or_else(|| Self::err("detached HEAD"))?
            .push(pending);
        Ok(())
    }

    fn force_head(&self, refspec: &str, hard: bool) -> Result<(), RepoError> {
        self.record(format!("reset {refspec} hard={hard}"));
        Ok(())
    }

    fn head(&self) -> Result<String, RepoError> {
        let state = self.state.borrow();
        let commits = state
            .branches
            .get(&state.current)
            .ok_or_else(|| Self::err("detached HEAD"))?;
        Ok(commits.last().map(|c| c.id.clone()).unwrap_or_default())
    }

    fn is_clean(&self) -> Result<(bool, String), RepoError> {
        let state = self.state.borrow();
        Ok((state.clean, String::new()))
    }

    fn add_files(&self, path: &Path) -> Result<(), RepoError> {
        self.record(format!("add {}", path.display()));
        Ok(())
    }

    fn commit_staged(&self, message: &str) -> Result<(), RepoError> {
        let mut state = self.state.borrow_mut();
        state.staged_messages.push(message.to_string());
        state.log.push("commit-staged".to_string());
        Ok(())
    }

    fn read_file(&self, rev: &str, path: &str) -> Result<Option<String>, RepoError> {
        let state = self.state.borrow();
        Ok(state
            .committed_files
            .get(&(rev.to_string(), path.to_string()))
            .cloned())
    }

    fn rebase(&self, onto: &str) -> Result<(), RepoError> {
        self.record(format!("rebase onto {onto}"));
        Ok(())
    }
}
