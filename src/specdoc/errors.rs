use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpecError {
    #[error("Patch{0} declared multiple times, spec/patch autoupdate would fail")]
    DuplicatePatch(u32),

    #[error("Source{0} declared multiple times")]
    DuplicateSource(u32),

    #[error("%patch{0} has no matching Patch{0}: tag")]
    MacroWithoutTag(u32),

    #[error("no %patch, %setup or %prep anchor to place applicator lines after")]
    NoMacroAnchor,

    #[error("no Patch, Source or Name tag to place declaration lines after")]
    NoTagAnchor,

    #[error("no spec file found under {0}")]
    NoSpecFile(PathBuf),

    #[error("multiple spec files found ({0}), don't know which to use")]
    MultipleSpecFiles(String),

    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}
