//! Ordered patch series and the flat series listing on disk.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::{PatchDescriptor, PatchError};

/// An ordered collection of patches; order is application order.
#[derive(Debug, Clone, Default)]
pub struct PatchSeries {
    patches: Vec<PatchDescriptor>,
}

impl PatchSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PatchDescriptor> {
        self.patches.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.patches.iter().map(|p| p.path.as_path())
    }

    pub fn contains_path(&self, path: &Path) -> bool {
        self.patches.iter().any(|p| p.path == path)
    }

    pub fn append(&mut self, patch: PatchDescriptor) {
        self.patches.push(patch);
    }

    /// Read a series listing: one patch path per non-empty line,
    /// relative to the listing's directory, optionally followed by a
    /// `-p<N>` strip override. `#` lines are comments. A missing file
    /// is an empty series, not an error.
    pub fn read(path: &Path) -> Result<Self, PatchError> {
        if !path.exists() {
            debug!("no series file at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let content =
            fs::read_to_string(path).map_err(|e| PatchError::io("read", path, e))?;

        let mut series = Self::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let relative = match fields.next() {
                Some(first) => PathBuf::from(first),
                None => continue,
            };
            let mut strip = 1;
            for option in fields {
                match option.strip_prefix("-p").and_then(|n| n.parse().ok()) {
                    Some(level) => strip = level,
                    None => warn!(
                        "ignoring unknown option '{option}' in {}",
                        path.display()
                    ),
                }
            }
            let topic = relative
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.to_string_lossy().into_owned());
            let full = base.join(&relative);
            // Parse the header when the patch is on disk; a listed but
            // missing file still enters the series so application can
            // report it.
            let descriptor = if full.exists() {
                PatchDescriptor::from_file(full, strip, topic)?
            } else {
                PatchDescriptor::new(full, strip, topic)
            };
            series.append(descriptor);
        }
        Ok(series)
    }

    /// Write the listing next to the patches: one path per line,
    /// relative to the listing's directory.
    pub fn write(&self, path: &Path) -> Result<(), PatchError> {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let mut content = String::new();
        for patch in &self.patches {
            let relative = patch.path.strip_prefix(base).unwrap_or(&patch.path);
            content.push_str(&relative.to_string_lossy());
            content.push('\n');
        }
        fs::write(path, content).map_err(|e| PatchError::io("write", path, e))
    }
}

impl IntoIterator for PatchSeries {
    type Item = PatchDescriptor;
    type IntoIter = std::vec::IntoIter<PatchDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.patches.into_iter()
    }
}

/// Compare two series listings, returning the entries added by `new`
/// and the entries removed from `old`, each in input order.
pub fn compare_series(old: &[String], new: &[String]) -> (Vec<String>, Vec<String>) {
    let added = new
        .iter()
        .filter(|p| !old.contains(p))
        .cloned()
        .collect();
    let removed = old
        .iter()
        .filter(|p| !new.contains(p))
        .cloned()
        .collect();
    (added, removed)
}
