//! [`Repository`] implementation backed by the `git` command-line tool.
//!
//! Every operation shells out with captured output; a non-zero exit
//! status surfaces as [`RepoError::Git`] carrying the arguments and
//! stderr. Commit metadata is fetched with a NUL-separated format string
//! so subjects and bodies containing newlines parse unambiguously.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use chrono::DateTime;

use super::{ChangedFile, CommitInfo, FileStatus, Identity, RepoError};
use crate::repo::Repository;

/// Field separator used in `--format` strings.
const NUL: char = '\0';

pub struct GitRepository {
    path: PathBuf,
}

impl GitRepository {
    /// Open the repository containing `dir`, failing if `git` does not
    /// recognize it as a work tree.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, RepoError> {
        let repo = Self {
            path: dir.as_ref().to_path_buf(),
        };
        let out = repo.run(&["rev-parse", "--show-toplevel"])?;
        Ok(Self {
            path: PathBuf::from(out.trim()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(&self.path).args(args);
        cmd
    }

    /// Run git, requiring success; returns stdout.
    fn run(&self, args: &[&str]) -> Result<String, RepoError> {
        let output = self.command(args).output()?;
        if !output.status.success() {
            return Err(RepoError::Git {
                args: args.iter().map(|s| s.to_string()).collect(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run git, returning stdout on success and `None` on failure.
    fn run_ok(&self, args: &[&str]) -> Result<Option<String>, RepoError> {
        let output = self.command(args).output()?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
        } else {
            Ok(None)
        }
    }

    /// Run git with `input` piped to stdin and extra environment.
    fn run_with_input(
        &self,
        args: &[&str],
        input: &str,
        env: &[(&str, String)],
    ) -> Result<String, RepoError> {
        let mut cmd = self.command(args);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in env {
            cmd.env(key, value);
        }
        let mut child = cmd.spawn()?;
        child
            .stdin
            .take()
            .ok_or_else(|| RepoError::Parse("no stdin handle".into()))?
            .write_all(input.as_bytes())?;
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(RepoError::Git {
                args: args.iter().map(|s| s.to_string()).collect(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Parse one `name<NUL>email<NUL>rfc2822-date` triple.
fn parse_identity(name: &str, email: &str, date: &str) -> Identity {
    Identity {
        name: name.to_string(),
        email: email.to_string(),
        date: DateTime::parse_from_rfc2822(date.trim()).ok(),
    }
}

fn parse_name_status(listing: &str) -> Vec<ChangedFile> {
    let mut files = Vec::new();
    for line in listing.lines() {
        let mut fields = line.split('\t');
        let status = match fields.next() {
            Some(s) if !s.is_empty() => s,
            _ => continue,
        };
        // Renames and copies list two paths; the new one is last.
        if let Some(path) = fields.last() {
            files.push(ChangedFile {
                status: FileStatus::from_letter(status.chars().next().unwrap_or('X')),
                path: path.to_string(),
            });
        }
    }
    files
}

impl Repository for GitRepository {
    fn current_branch(&self) -> Result<String, RepoError> {
        Ok(self.run(&["symbolic-ref", "--short", "HEAD"])?.trim().to_string())
    }

    fn has_branch(&self, name: &str) -> Result<bool, RepoError> {
        let refname = format!("refs/heads/{name}");
        Ok(self
            .run_ok(&["show-ref", "--verify", "--quiet", refname.as_str()])?
            .is_some())
    }

    fn create_branch(&self, name: &str, start: &str) -> Result<(), RepoError> {
        self.run(&["branch", name, start])?;
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> Result<(), RepoError> {
        self.run(&["branch", "-D", name])?;
        Ok(())
    }

    fn checkout(&self, name: &str) -> Result<(), RepoError> {
        self.run(&["checkout", name])?;
        Ok(())
    }

    fn commits_between(
        &self,
        since: &str,
        until: &str,
        first_parent: bool,
    ) -> Result<Vec<String>, RepoError> {
        let range = format!("{since}..{until}");
        let mut args = vec!["rev-list"];
        if first_parent {
            args.push("--first-parent");
        }
        args.push(range.as_str());
        let out = self.run(&args)?;
        Ok(out.split_whitespace().map(str::to_string).collect())
    }

    fn recent_commits(
        &self,
        branch: &str,
        limit: usize,
        first_parent: bool,
    ) -> Result<Vec<String>, RepoError> {
        let count = limit.to_string();
        let mut args = vec!["rev-list", "-n", count.as_str()];
        if first_parent {
            args.push("--first-parent");
        }
        args.push(branch);
        let out = self.run(&args)?;
        Ok(out.split_whitespace().map(str::to_string).collect())
    }

    fn commit_info(&self, id: &str) -> Result<CommitInfo, RepoError> {
        let format = "--format=%H%x00%an%x00%ae%x00%aD%x00%cn%x00%ce%x00%cD%x00%s%x00%b";
        let out = self.run(&["show", "-s", format, id])?;
        let fields: Vec<&str> = out.splitn(9, NUL).collect();
        if fields.len() != 9 {
            return Err(RepoError::Parse(format!(
                "expected 9 metadata fields for commit {id}, got {}",
                fields.len()
            )));
        }
        let listing = self.run(&["show", "--name-status", "--format=", id])?;
        Ok(CommitInfo {
            id: fields[0].to_string(),
            author: parse_identity(fields[1], fields[2], fields[3]),
            committer: parse_identity(fields[4], fields[5], fields[6]),
            subject: fields[7].to_string(),
            body: fields[8].trim_end_matches('\n').to_string(),
            files: parse_name_status(&listing),
        })
    }

    fn commit_diff(
        &self,
        id: &str,
        paths: &[String],
        with_stat: bool,
    ) -> Result<String, RepoError> {
        let mut args: Vec<&str> = vec!["show", "--format=", "--patch", "--text", "-M"];
        if with_stat {
            args.push("--stat=80");
            args.push("--summary");
        }
        args.push(id);
        if !paths.is_empty() {
            args.push("--");
            args.extend(paths.iter().map(String::as_str));
        }
        self.run(&args)
    }

    fn apply_patch(&self, patch: &Path, strip: u32) -> Result<(), RepoError> {
        let strip_arg = format!("-p{strip}");
        let patch_arg = patch.to_string_lossy();
        self.run(&["apply", "--index", strip_arg.as_str(), patch_arg.as_ref()])?;
        Ok(())
    }

    fn write_tree(&self) -> Result<String, RepoError> {
        Ok(self.run(&["write-tree"])?.trim().to_string())
    }

    fn commit_tree(
        &self,
        tree: &str,
        message: &str,
        parents: &[String],
        author: &Identity,
    ) -> Result<String, RepoError> {
        let mut args = vec!["commit-tree".to_string(), tree.to_string()];
        for parent in parents {
            args.push("-p".to_string());
            args.push(parent.clone());
        }
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

        let mut env = vec![
            ("GIT_AUTHOR_NAME", author.name.clone()),
            ("GIT_AUTHOR_EMAIL", author.email.clone()),
        ];
        if let Some(date) = author.date {
            env.push(("GIT_AUTHOR_DATE", date.to_rfc2822()));
        }
        let out = self.run_with_input(&arg_refs, message, &env)?;
        Ok(out.trim().to_string())
    }

    fn update_ref(&self, name: &str, commit: &str, reason: &str) -> Result<(), RepoError> {
        self.run(&["update-ref", "-m", reason, name, commit])?;
        Ok(())
    }

    fn force_head(&self, refspec: &str, hard: bool) -> Result<(), RepoError> {
        let mut args = vec!["reset"];
        if hard {
            args.push("--hard");
        }
        args.push(refspec);
        self.run(&args)?;
        Ok(())
    }

    fn head(&self) -> Result<String, RepoError> {
        Ok(self.run(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    fn is_clean(&self) -> Result<(bool, String), RepoError> {
        let out = self.run(&["status", "--porcelain"])?;
        let detail = out.trim().to_string();
        Ok((detail.is_empty(), detail))
    }

    fn add_files(&self, path: &Path) -> Result<(), RepoError> {
        let path_arg = path.to_string_lossy();
        self.run(&["add", "--", path_arg.as_ref()])?;
        Ok(())
    }

    fn commit_staged(&self, message: &str) -> Result<(), RepoError> {
        self.run(&["commit", "-m", message])?;
        Ok(())
    }

    fn read_file(&self, rev: &str, path: &str) -> Result<Option<String>, RepoError> {
        // Tree reads take repository-relative paths.
        let relative = Path::new(path)
            .strip_prefix(&self.path)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| path.to_string());
        let spec = format!("{rev}:{relative}");
        self.run_ok(&["show", spec.as_str()])
    }

    fn rebase(&self, onto: &str) -> Result<(), RepoError> {
        self.run(&["rebase", onto])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_parses_rfc2822_date() {
        let id = parse_identity("Jane Doe", "jane@example.com", "Mon, 2 Jun 2025 10:00:00 +0200");
        assert_eq!(id.name, "Jane Doe");
        assert_eq!(id.email, "jane@example.com");
        assert!(id.date.is_some());
    }

    #[test]
    fn identity_tolerates_bad_date() {
        let id = parse_identity("Jane", "jane@example.com", "not a date");
        assert!(id.date.is_none());
    }

    #[test]
    fn name_status_parses_plain_and_rename() {
        let listing = "M\tsrc/lib.rs\nA\tdocs/new.md\nR100\told.rs\tnew.rs\n";
        let files = parse_name_status(listing);
        assert_eq!(files.len(), 3);
        assert_eq!(files[0].status, FileStatus::Modified);
        assert_eq!(files[0].path, "src/lib.rs");
        assert_eq!(files[2].status, FileStatus::Renamed);
        assert_eq!(files[2].path, "new.rs");
    }

    #[test]
    fn name_status_skips_blank_lines() {
        assert!(parse_name_status("\n\n").is_empty());
    }
}
