//! Patch value objects: descriptors, ordered series, file rendering.

pub mod descriptor;
pub mod series;
pub mod writer;

use std::path::PathBuf;
use thiserror::Error;

pub use descriptor::PatchDescriptor;
pub use series::{compare_series, PatchSeries};
pub use writer::{derive_patch_path, write_patch_file};

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

impl PatchError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PatchError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
