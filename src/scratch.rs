//! Scoped safe-copy of the patch directory.
//!
//! Before the import retry loop switches branches, the on-disk patches
//! and series listing are copied into a private temp directory so every
//! attempt reads the same files regardless of what the working tree
//! looks like afterwards. The copy is removed when the handle drops,
//! on success and failure alike.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::TempDir;

pub struct ScratchCopy {
    dir: TempDir,
    series: PathBuf,
}

impl ScratchCopy {
    /// Copy the directory containing `series` aside, returning a handle
    /// whose [`series_path`](Self::series_path) points into the copy.
    pub fn begin(series: &Path) -> io::Result<Self> {
        let src = series.parent().unwrap_or_else(|| Path::new("."));
        let name = series
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "series has no file name"))?;

        let dir = TempDir::with_prefix("patchq-safe")?;
        let patches = dir.path().join("patches");
        debug!("safeing patches '{}' in '{}'", src.display(), dir.path().display());
        copy_tree(src, &patches)?;

        let series = patches.join(name);
        Ok(Self { dir, series })
    }

    /// Path of the series listing inside the copy.
    pub fn series_path(&self) -> &Path {
        &self.series
    }
}

fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_series_and_topic_subdirs() {
        let dir = tempfile::tempdir().unwrap();
        let patches = dir.path().join("patches");
        fs::create_dir_all(patches.join("fixes")).unwrap();
        fs::write(patches.join("series"), "a.patch\nfixes/b.patch\n").unwrap();
        fs::write(patches.join("a.patch"), "A").unwrap();
        fs::write(patches.join("fixes/b.patch"), "B").unwrap();

        let scratch = ScratchCopy::begin(&patches.join("series")).unwrap();
        let copied = scratch.series_path().parent().unwrap().to_path_buf();
        assert_eq!(fs::read_to_string(scratch.series_path()).unwrap(), "a.patch\nfixes/b.patch\n");
        assert_eq!(fs::read_to_string(copied.join("a.patch")).unwrap(), "A");
        assert_eq!(fs::read_to_string(copied.join("fixes/b.patch")).unwrap(), "B");

        let root = scratch.dir.path().to_path_buf();
        drop(scratch);
        assert!(!root.exists());
    }

    #[test]
    fn original_files_survive_the_copy() {
        let dir = tempfile::tempdir().unwrap();
        let patches = dir.path().join("patches");
        fs::create_dir_all(&patches).unwrap();
        fs::write(patches.join("series"), "a.patch\n").unwrap();
        fs::write(patches.join("a.patch"), "A").unwrap();

        let scratch = ScratchCopy::begin(&patches.join("series")).unwrap();
        drop(scratch);
        assert!(patches.join("series").exists());
        assert!(patches.join("a.patch").exists());
    }
}
