//! Export: queue-branch commits to patch files, series listing and
//! spec-document declarations.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use regex::Regex;

use super::directives::{self, CMD_IGNORE, CMD_TOPIC};
use super::SyncError;
use crate::patch::{
    compare_series, derive_patch_path, write_patch_file, PatchDescriptor, PatchSeries,
};
use crate::queue::{self, QueuePattern};
use crate::repo::{CommitInfo, Repository};
use crate::specdoc::SpecDocument;

/// Where patches and the series listing live.
#[derive(Debug, Clone)]
pub struct PatchLayout {
    pub patch_dir: PathBuf,
    pub series_file: PathBuf,
}

impl PatchLayout {
    pub fn new(patch_dir: impl Into<PathBuf>) -> Self {
        let patch_dir = patch_dir.into();
        let series_file = patch_dir.join("series");
        Self {
            patch_dir,
            series_file,
        }
    }

    /// Series path as stored in the repository (for committed-tree
    /// reads).
    fn series_repo_path(&self) -> String {
        self.series_file.to_string_lossy().replace('\\', "/")
    }
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Prefix patch files with a running ordinal.
    pub patch_numbers: bool,
    /// Paths matching this pattern are left out of the patches.
    pub path_exclude: Option<Regex>,
    /// Commit the regenerated patch directory afterwards.
    pub commit: bool,
    /// Drop the queue branch after a successful export.
    pub drop: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            patch_numbers: true,
            path_exclude: None,
            commit: false,
            drop: false,
        }
    }
}

/// What an export did.
#[derive(Debug, Default)]
pub struct ExportReport {
    /// Rendered patch files, in series order; empty means there was
    /// nothing to do.
    pub patches: Vec<PathBuf>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ExportReport {
    pub fn nothing_to_do(&self) -> bool {
        self.patches.is_empty()
    }
}

/// Export the queue branch of `branch` into the patch directory.
///
/// When `branch` is itself a queue branch the export runs for its base,
/// switching the repository there first. A queue branch with no commits
/// beyond the base reports nothing-to-do without touching the patch
/// directory.
pub fn export_patches(
    repo: &dyn Repository,
    branch: &str,
    layout: &PatchLayout,
    pattern: &QueuePattern,
    options: &ExportOptions,
) -> Result<ExportReport, SyncError> {
    let base = match pattern.base_of(branch) {
        Some(base) => {
            info!("on '{branch}', switching to '{base}'");
            repo.checkout(&base)?;
            base
        }
        None => branch.to_string(),
    };
    let queue = pattern
        .queue_name(&base, &[])
        .ok_or_else(|| SyncError::AlreadyOnQueue(base.clone()))?;

    let commits = repo.commits_between(&base, &queue, false)?;
    if commits.is_empty() {
        info!("no patches on '{queue}', nothing to do");
        return Ok(ExportReport::default());
    }

    info!("generating patches from repository ({base}..{queue})");
    match fs::remove_dir_all(&layout.patch_dir) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!("{} does not exist", layout.patch_dir.display());
        }
        Err(source) => {
            return Err(SyncError::Io {
                action: "remove",
                path: layout.patch_dir.clone(),
                source,
            })
        }
    }

    let mut series = PatchSeries::new();
    for commit in commits.iter().rev() {
        let mut commit_info = repo.commit_info(commit)?;
        let directives = strip_directives(&mut commit_info);
        if directives.ignore {
            info!("ignoring commit {}", commit_info.id);
            continue;
        }
        format_patch(
            repo,
            &commit_info,
            layout,
            &mut series,
            options,
            directives.topic.as_deref(),
        )?;
    }

    finish_export(repo, &base, &queue, layout, pattern, options, series)
}

/// Parse and strip engine directives from a commit body, returning the
/// commands in effect (queue-specific family wins over the generic one,
/// the deprecated topic annotation is the last resort).
fn strip_directives(info: &mut CommitInfo) -> Directives {
    let (old_topic, body) = directives::parse_old_style_topic(&info.body, &info.id);
    let (generic, body) = directives::parse_commands(
        &body,
        &info.id,
        directives::TAG,
        &[CMD_IGNORE],
        &[CMD_TOPIC],
    );
    let (queue_cmds, body) = directives::parse_commands(
        &body,
        &info.id,
        directives::QUEUE_TAG,
        &[CMD_IGNORE],
        &[CMD_TOPIC],
    );
    info.body = body;

    let mut commands = generic;
    commands.extend(queue_cmds);
    Directives {
        ignore: commands.contains_key(CMD_IGNORE),
        topic: commands.get(CMD_TOPIC).cloned().or(old_topic),
    }
}

struct Directives {
    ignore: bool,
    topic: Option<String>,
}

/// Render one commit as a patch file and register it in the series.
fn format_patch(
    repo: &dyn Repository,
    info: &CommitInfo,
    layout: &PatchLayout,
    series: &mut PatchSeries,
    options: &ExportOptions,
    topic: Option<&str>,
) -> Result<Option<PathBuf>, SyncError> {
    let paths: Vec<String> = match &options.path_exclude {
        None => Vec::new(),
        Some(exclude) => {
            let kept: Vec<String> = info
                .paths()
                .filter(|p| !exclude.is_match(p))
                .map(str::to_string)
                .collect();
            if kept.is_empty() {
                debug!("all paths of {} excluded, no patch", info.id);
                return Ok(None);
            }
            kept
        }
    };

    let path = derive_patch_path(
        &layout.patch_dir,
        topic,
        &info.subject,
        series,
        options.patch_numbers,
    );
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| SyncError::Io {
            action: "create",
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let diff = repo.commit_diff(&info.id, &paths, true)?;
    match write_patch_file(&path, info, &diff)? {
        Some(written) => {
            series.append(PatchDescriptor::new(
                written.clone(),
                1,
                topic.map(str::to_string),
            ));
            Ok(Some(written))
        }
        None => Ok(None),
    }
}

fn finish_export(
    repo: &dyn Repository,
    base: &str,
    queue: &str,
    layout: &PatchLayout,
    pattern: &QueuePattern,
    options: &ExportOptions,
    series: PatchSeries,
) -> Result<ExportReport, SyncError> {
    let mut report = ExportReport::default();
    if series.is_empty() {
        info!("no patches on '{queue}', nothing to do");
    } else {
        series.write(&layout.series_file)?;
        report.patches = series.paths().map(Path::to_path_buf).collect();

        if options.commit {
            let (added, removed) = commit_patches(repo, base, layout, &report.patches)?;
            if !added.is_empty() {
                info!("added to patch series: {}", added.join(", "));
            }
            if !removed.is_empty() {
                info!("removed from patch series: {}", removed.join(", "));
            }
            report.added = added;
            report.removed = removed;
        }
    }

    if options.drop {
        queue::drop_queue(repo, base, pattern, &[])?;
    }
    Ok(report)
}

/// Stage and commit the regenerated patch directory, with a message
/// derived from the difference against the previously committed series.
fn commit_patches(
    repo: &dyn Repository,
    branch: &str,
    layout: &PatchLayout,
    patches: &[PathBuf],
) -> Result<(Vec<String>, Vec<String>), SyncError> {
    let (clean, _) = repo.is_clean()?;
    if clean {
        return Ok((Vec::new(), Vec::new()));
    }

    let old: Vec<String> = repo
        .read_file(branch, &layout.series_repo_path())?
        .map(|content| {
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let new: Vec<String> = patches
        .iter()
        .map(|p| {
            p.strip_prefix(&layout.patch_dir)
                .unwrap_or(p)
                .to_string_lossy()
                .into_owned()
        })
        .collect();

    let (added, removed) = compare_series(&old, &new);
    let message = format_series_diff(&added, &removed, &layout.patch_dir)?;
    repo.add_files(&layout.patch_dir)?;
    repo.commit_staged(&message)?;
    Ok((added, removed))
}

/// Commit message for a series change: a single added patch reuses its
/// own subject and description, anything else becomes an enumerated
/// rediff with editable placeholder reasons.
fn format_series_diff(
    added: &[String],
    removed: &[String],
    patch_dir: &Path,
) -> Result<String, SyncError> {
    if added.len() == 1 && removed.is_empty() {
        let patch = PatchDescriptor::from_file(patch_dir.join(&added[0]), 1, None)?;
        let mut message = patch.subject;
        if !patch.long_desc.is_empty() {
            message.push_str("\n\n");
            message.push_str(&patch.long_desc);
        }
        Ok(message)
    } else {
        let mut message = String::from("Rediff patches\n\n");
        for patch in added {
            message.push_str(&format!("Added {patch}: <REASON>\n"));
        }
        for patch in removed {
            message.push_str(&format!("Dropped {patch}: <REASON>\n"));
        }
        Ok(message)
    }
}

/// Rewrite the spec document's patch declarations from an exported
/// patch set and write it back in place.
pub fn update_spec_document(
    doc: &mut SpecDocument,
    patches: &[PathBuf],
    patch_dir: &Path,
) -> Result<(), SyncError> {
    let names: Vec<String> = patches
        .iter()
        .map(|p| {
            p.strip_prefix(patch_dir)
                .unwrap_or(p)
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    doc.update_patches(&names)?;
    doc.write()?;
    info!(
        "updated {} patch declarations in {}",
        names.len(),
        doc.path().display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rediff_message_enumerates_changes() {
        let message = format_series_diff(
            &["a.patch".into()],
            &["b.patch".into()],
            Path::new("patches"),
        )
        .unwrap();
        assert_eq!(
            message,
            "Rediff patches\n\nAdded a.patch: <REASON>\nDropped b.patch: <REASON>\n"
        );
    }

    #[test]
    fn single_added_patch_reuses_its_subject() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("0001-fix.patch"),
            "From: A <a@b.c>\nSubject: Fix the thing\n\nBecause reasons.\n---\ndiff\n",
        )
        .unwrap();
        let message = format_series_diff(&["0001-fix.patch".into()], &[], dir.path()).unwrap();
        assert_eq!(message, "Fix the thing\n\nBecause reasons.");
    }
}
