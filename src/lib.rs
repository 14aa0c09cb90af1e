//! Patchq: patch-queue and spec-document synchronization
//!
//! Keeps a structured package-description document ("spec") and a set
//! of patches consistent with a dedicated version-control branch (the
//! "patch-queue branch") whose commits are the patches.
//!
//! # Architecture
//!
//! The engine is built from small value objects and two orchestrating
//! operations. [`specdoc::SpecDocument`] is a line-indexed model of the
//! spec document that rewrites declaration tags and applicator
//! directives while leaving every other line verbatim.
//! [`patch::PatchSeries`] and [`patch::PatchDescriptor`] describe the
//! on-disk patches; [`sync::export_patches`] turns queue-branch commits
//! into patch files, [`sync::import_series`] replays them as commits,
//! walking back through history when application fails.
//!
//! The version-control repository is a collaborator behind the
//! [`repo::Repository`] trait; callers pass it into every operation and
//! must serialize operations against one repository, since branch
//! switches are process-wide mutable state.

pub mod config;
pub mod patch;
pub mod queue;
pub mod repo;
pub mod scratch;
pub mod specdoc;
pub mod sync;

// Re-exports
pub use config::{Config, ConfigError};
pub use patch::{compare_series, PatchDescriptor, PatchError, PatchSeries};
pub use queue::{QueueError, QueuePattern, DEFAULT_QUEUE_PATTERN};
pub use repo::{CommitInfo, GitRepository, Identity, RepoError, Repository};
pub use scratch::ScratchCopy;
pub use specdoc::{find_spec_file, SpecDocument, SpecError};
pub use sync::{
    apply_single, export_patches, import_series, update_spec_document, ExportOptions,
    ExportReport, PatchLayout, SyncError,
};
