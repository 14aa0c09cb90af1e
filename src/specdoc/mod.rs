//! Spec-document model: line classification, parsing and rewriting.

pub mod classify;
pub mod document;
pub mod errors;

pub use classify::{Classifier, LineKind};
pub use document::{
    find_spec_file, DeclarationKind, Markers, PatchEntry, ResolvedDeclaration, SourceEntry,
    SpecDocument, SOURCE_INDEX_SENTINEL,
};
pub use errors::SpecError;
