//! Line-indexed spec-document model.
//!
//! The document's sole persisted state is its line buffer; the
//! `sources`/`patches`/`markers` maps are derived by a full re-scan and
//! rebuilt whenever the buffer is mutated. The rewrite pass replaces all
//! autoupdate patch declarations and applicator directives while leaving
//! every other line byte-identical.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use regex::Regex;

use super::classify::{Classifier, LineKind};
use super::errors::SpecError;
use crate::patch::{PatchDescriptor, PatchSeries};

/// Declaration indices at or above this value fold to 0; the external
/// declaration resolver reports unnumbered tags this way.
pub const SOURCE_INDEX_SENTINEL: u32 = 99_999;

/// One `Source<N>:` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Declared text, macros unexpanded.
    pub name: String,
    /// Resolved filename; equals `name` until reconciled.
    pub filename: String,
    pub tag_line: usize,
}

/// One `Patch<N>:` declaration and its applicator state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchEntry {
    pub name: String,
    pub filename: String,
    pub strip: u32,
    /// An applicator directive references this patch.
    pub apply: bool,
    /// Managed by this engine; manually-maintained patches are excluded
    /// from regeneration.
    pub autoupdate: bool,
    /// `None` only for entries added by a rewrite that has not been
    /// re-scanned yet.
    pub tag_line: Option<usize>,
    pub macro_line: Option<usize>,
}

/// Structurally significant line numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Markers {
    pub name_tag: Option<usize>,
    /// Last `%setup` directive.
    pub setup_macro: Option<usize>,
    pub prep_macro: Option<usize>,
}

/// Which kind of declaration a resolver entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Source,
    Patch,
}

/// A macro-expanded declaration reported by the external resolver.
#[derive(Debug, Clone)]
pub struct ResolvedDeclaration {
    pub kind: DeclarationKind,
    pub index: u32,
    pub filename: String,
}

#[derive(Debug)]
pub struct SpecDocument {
    path: PathBuf,
    lines: Vec<String>,
    package_name: Option<String>,
    sources: BTreeMap<u32, SourceEntry>,
    patches: BTreeMap<u32, PatchEntry>,
    markers: Markers,
    ignored: BTreeSet<u32>,
}

/// Comment heuristics for lines this engine wrote on a previous pass.
struct RewritePatterns {
    tag_comment: Regex,
    macro_comment: Regex,
}

impl RewritePatterns {
    fn new() -> Self {
        Self {
            tag_comment: Regex::new(r"(?i)^\s*#.*patch.*auto-generated").expect("tag comment"),
            macro_comment: Regex::new(r"(?i)^\s*#.*\.(patch|diff)(\.(gz|bz2|xz|lzma))?\s*$")
                .expect("macro comment"),
        }
    }
}

impl SpecDocument {
    /// Read and parse the document at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SpecError> {
        let path = path.as_ref().to_path_buf();
        let content = fs::read_to_string(&path).map_err(|source| SpecError::Io {
            action: "read",
            path: path.clone(),
            source,
        })?;
        Self::from_content(path, &content)
    }

    /// Parse a document from in-memory content; `path` is retained as
    /// the write-back target.
    pub fn from_content(path: PathBuf, content: &str) -> Result<Self, SpecError> {
        let mut doc = Self {
            path,
            lines: content.lines().map(str::to_string).collect(),
            package_name: None,
            sources: BTreeMap::new(),
            patches: BTreeMap::new(),
            markers: Markers::default(),
            ignored: BTreeSet::new(),
        };
        doc.refresh()?;
        Ok(doc)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn package_name(&self) -> Option<&str> {
        self.package_name.as_deref()
    }

    pub fn sources(&self) -> &BTreeMap<u32, SourceEntry> {
        &self.sources
    }

    pub fn patches(&self) -> &BTreeMap<u32, PatchEntry> {
        &self.patches
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    pub fn ignored(&self) -> &BTreeSet<u32> {
        &self.ignored
    }

    /// Rebuild the derived maps from the line buffer.
    ///
    /// The ignore annotation is collected in a pre-pass because it
    /// decides whether a repeated `Patch<N>:` tag is a fatal duplicate
    /// or a manually-maintained patch whose line number just moved.
    pub fn refresh(&mut self) -> Result<(), SpecError> {
        let classifier = Classifier::new();
        self.sources.clear();
        self.patches.clear();
        self.markers = Markers::default();
        self.package_name = None;
        self.ignored = self.collect_ignored(&classifier);

        for (lineno, line) in self.lines.iter().enumerate() {
            match classifier.classify(line) {
                LineKind::Plain | LineKind::Annotation { .. } => {}
                LineKind::SourceTag { index, value } => {
                    let index = index.unwrap_or(0);
                    if self.sources.contains_key(&index) {
                        return Err(SpecError::DuplicateSource(index));
                    }
                    self.sources.insert(
                        index,
                        SourceEntry {
                            name: value.clone(),
                            filename: value,
                            tag_line: lineno,
                        },
                    );
                }
                LineKind::PatchTag { index, value } => {
                    let index = index.unwrap_or(0);
                    if let Some(existing) = self.patches.get_mut(&index) {
                        if self.ignored.contains(&index) {
                            existing.tag_line = Some(lineno);
                        } else {
                            return Err(SpecError::DuplicatePatch(index));
                        }
                    } else {
                        self.patches.insert(
                            index,
                            PatchEntry {
                                name: value.clone(),
                                filename: value,
                                strip: 0,
                                apply: false,
                                autoupdate: !self.ignored.contains(&index),
                                tag_line: Some(lineno),
                                macro_line: None,
                            },
                        );
                    }
                }
                LineKind::PatchMacro {
                    index,
                    strip,
                    explicit_index,
                } => {
                    let index = index.or(explicit_index).unwrap_or(0);
                    let entry = self
                        .patches
                        .get_mut(&index)
                        .ok_or(SpecError::MacroWithoutTag(index))?;
                    if let Some(strip) = strip {
                        entry.strip = strip;
                    }
                    entry.macro_line = Some(lineno);
                    entry.apply = true;
                }
                LineKind::NameTag { value } => {
                    self.markers.name_tag = Some(lineno);
                    self.package_name = Some(value);
                }
                LineKind::SetupMacro => self.markers.setup_macro = Some(lineno),
                LineKind::PrepMacro => self.markers.prep_macro = Some(lineno),
            }
        }
        Ok(())
    }

    fn collect_ignored(&self, classifier: &Classifier) -> BTreeSet<u32> {
        let mut ignored = BTreeSet::new();
        for (lineno, line) in self.lines.iter().enumerate() {
            if let LineKind::Annotation { name, data } = classifier.classify(line) {
                if name == "ignorepatch" {
                    for token in data.split_whitespace() {
                        match token.parse() {
                            Ok(index) => {
                                ignored.insert(index);
                            }
                            Err(_) => warn!(
                                "ignoring bad patch index '{token}' in annotation on line {}",
                                lineno + 1
                            ),
                        }
                    }
                } else {
                    info!("unrecognized annotation on line {}: '{line}'", lineno + 1);
                }
            }
        }
        ignored
    }

    /// Correct filenames against macro-expanded declarations from the
    /// external resolver. An index the resolver reports but the document
    /// scan missed is a consistency warning, not an error.
    pub fn reconcile(&mut self, resolved: &[ResolvedDeclaration]) {
        for decl in resolved {
            let index = if decl.index >= SOURCE_INDEX_SENTINEL {
                0
            } else {
                decl.index
            };
            match decl.kind {
                DeclarationKind::Source => match self.sources.get_mut(&index) {
                    Some(entry) => entry.filename = decl.filename.clone(),
                    None => warn!(
                        "Source{index} reported by the declaration resolver but not \
                         found in {}",
                        self.path.display()
                    ),
                },
                DeclarationKind::Patch => match self.patches.get_mut(&index) {
                    Some(entry) => entry.filename = decl.filename.clone(),
                    None => warn!(
                        "Patch{index} reported by the declaration resolver but not \
                         found in {}",
                        self.path.display()
                    ),
                },
            }
        }
    }

    /// Replace all autoupdate patch declarations and applicator lines
    /// with `new_patches`, renumbering from one past the highest
    /// manually-maintained index. Manually-maintained lines are left
    /// byte-identical.
    pub fn update_patches(&mut self, new_patches: &[String]) -> Result<(), SpecError> {
        self.refresh()?;
        let patterns = RewritePatterns::new();

        let mut start_index = 0u32;
        let mut last_manual_tag_line: Option<usize> = None;
        let mut last_manual_macro_line: Option<usize> = None;
        let mut rm_tag_lines = Vec::new();
        let mut rm_macro_lines = Vec::new();

        for (&index, entry) in &self.patches {
            if entry.autoupdate {
                if let Some(tag) = entry.tag_line {
                    rm_tag_lines.push(tag);
                    if tag > 0 && patterns.tag_comment.is_match(&self.lines[tag - 1]) {
                        rm_tag_lines.push(tag - 1);
                    }
                }
                if let Some(mac) = entry.macro_line {
                    rm_macro_lines.push(mac);
                    if mac > 0 && patterns.macro_comment.is_match(&self.lines[mac - 1]) {
                        rm_macro_lines.push(mac - 1);
                    }
                }
            } else {
                start_index = start_index.max(index + 1);
                last_manual_tag_line = last_manual_tag_line.max(entry.tag_line);
                last_manual_macro_line = last_manual_macro_line.max(entry.macro_line);
            }
        }
        debug!("numbering autoupdate patches from {start_index}");
        rm_tag_lines.sort_unstable();
        rm_macro_lines.sort_unstable();

        self.patches.retain(|_, entry| !entry.autoupdate);
        for (offset, name) in new_patches.iter().enumerate() {
            self.patches.insert(
                start_index + offset as u32,
                PatchEntry {
                    name: name.clone(),
                    filename: name.clone(),
                    strip: 1,
                    apply: true,
                    autoupdate: true,
                    tag_line: None,
                    macro_line: None,
                },
            );
        }

        // Applicator directives go right after the last removed line,
        // the last manual directive, the last %setup, or %prep.
        let macro_anchor = if let Some(&last) = rm_macro_lines.last() {
            last + 1
        } else if let Some(line) = last_manual_macro_line {
            line + 1
        } else if let Some(line) = self.markers.setup_macro {
            info!("no old %patch lines, adding new ones after the last %setup");
            line + 1
        } else if let Some(line) = self.markers.prep_macro {
            warn!("no old %patch or %setup lines, adding new ones after %prep");
            line + 1
        } else {
            return Err(SpecError::NoMacroAnchor);
        };

        // Descending index order so ascending order lands in the buffer;
        // each directive is preceded by a comment naming the patch.
        for (&index, entry) in self.patches.iter().rev() {
            if entry.autoupdate && entry.apply {
                self.lines
                    .insert(macro_anchor, format!("%patch{} -p{}", index, entry.strip));
                self.lines.insert(macro_anchor, format!("# {}", entry.name));
            }
        }
        for &line in rm_macro_lines.iter().rev() {
            debug!("removing line {}: '{}'", line + 1, self.lines[line]);
            self.lines.remove(line);
        }

        // Declaration tags: after the last removed tag, the last manual
        // tag, the last Source tag, or the Name tag.
        let tag_anchor = if let Some(&last) = rm_tag_lines.last() {
            last + 1
        } else if let Some(line) = last_manual_tag_line {
            line + 1
        } else if let Some(entry) = self.sources.values().max_by_key(|entry| entry.tag_line) {
            info!("no old Patch tags, adding new ones after the last Source tag");
            entry.tag_line + 1
        } else if let Some(line) = self.markers.name_tag {
            info!("no old Patch or Source tags, adding new ones after the Name tag");
            line + 1
        } else {
            return Err(SpecError::NoTagAnchor);
        };

        let mut inserted_tags = false;
        for (&index, entry) in self.patches.iter().rev() {
            if entry.autoupdate {
                let label = format!("Patch{index}:");
                self.lines
                    .insert(tag_anchor, format!("{label:<12}{}", entry.name));
                inserted_tags = true;
            }
        }
        if inserted_tags {
            self.lines
                .insert(tag_anchor, "# Patches auto-generated by patchq:".to_string());
        }
        for &line in rm_tag_lines.iter().rev() {
            debug!("removing line {}: '{}'", line + 1, self.lines[line]);
            self.lines.remove(line);
        }

        self.refresh()
    }

    /// Serialize the line buffer back to the original path atomically.
    pub fn write(&self) -> Result<(), SpecError> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let io_err = |source| SpecError::Io {
            action: "write",
            path: self.path.clone(),
            source,
        };
        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
        for line in &self.lines {
            writeln!(temp, "{line}").map_err(io_err)?;
        }
        temp.as_file().sync_all().map_err(io_err)?;
        temp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    /// The applied autoupdate patches as an ordered series rooted at
    /// `patch_dir`.
    pub fn patch_series(&self, patch_dir: &Path) -> PatchSeries {
        let mut series = PatchSeries::new();
        for entry in self.patches.values() {
            if entry.autoupdate && entry.apply {
                series.append(PatchDescriptor::new(
                    patch_dir.join(&entry.filename),
                    entry.strip,
                    None,
                ));
            }
        }
        series
    }
}

/// Locate the single spec document under `topdir`.
///
/// A file named exactly `preferred` wins immediately; otherwise every
/// `*.spec` file outside `.git` is a candidate, and anything other than
/// exactly one candidate is an error.
pub fn find_spec_file(topdir: &Path, preferred: Option<&str>) -> Result<PathBuf, SpecError> {
    let mut specs = Vec::new();
    let walker = walkdir::WalkDir::new(topdir)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git");
    for entry in walker {
        let entry = entry.map_err(|err| SpecError::Io {
            action: "scan",
            path: topdir.to_path_buf(),
            source: err.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if preferred == Some(name.as_ref()) {
            debug!("found preferred spec file {}", entry.path().display());
            return Ok(entry.path().to_path_buf());
        }
        if name.ends_with(".spec") {
            debug!("found spec file {}", entry.path().display());
            specs.push(entry.path().to_path_buf());
        }
    }
    match specs.len() {
        0 => Err(SpecError::NoSpecFile(topdir.to_path_buf())),
        1 => Ok(specs.remove(0)),
        _ => {
            let names: Vec<String> = specs
                .iter()
                .map(|p| {
                    p.strip_prefix(topdir)
                        .unwrap_or(p)
                        .display()
                        .to_string()
                })
                .collect();
            Err(SpecError::MultipleSpecFiles(names.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC_SPEC: &str = "\
Name: mypkg
Version: 1.0
Source0: mypkg-1.0.tar.gz
Source1: extra-data.tar.gz
Patch0: keep-me.diff
Patch1: 0001-old-fix.patch
# gbpignorepatch: 0

%description
A package.

%prep
%setup -q
%patch0 -p2
# 0001-old-fix.patch
%patch1 -p1

%build
make
";

    fn doc(content: &str) -> SpecDocument {
        SpecDocument::from_content(PathBuf::from("test.spec"), content).unwrap()
    }

    #[test]
    fn parses_sources_patches_and_markers() {
        let doc = doc(BASIC_SPEC);
        assert_eq!(doc.package_name(), Some("mypkg"));
        assert_eq!(doc.sources().len(), 2);
        assert_eq!(doc.sources()[&0].filename, "mypkg-1.0.tar.gz");
        assert_eq!(doc.patches().len(), 2);

        let manual = &doc.patches()[&0];
        assert!(!manual.autoupdate);
        assert!(manual.apply);
        assert_eq!(manual.strip, 2);

        let auto = &doc.patches()[&1];
        assert!(auto.autoupdate);
        assert_eq!(auto.strip, 1);
        assert!(auto.macro_line.is_some());

        assert!(doc.markers().name_tag.is_some());
        assert!(doc.markers().setup_macro.is_some());
        assert!(doc.markers().prep_macro.is_some());
        assert_eq!(doc.ignored().iter().copied().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn unnumbered_tags_are_index_zero() {
        let doc = doc("Name: p\nSource: s.tar.gz\nPatch: f.patch\n%prep\n%patch0 -p1\n");
        assert!(doc.sources().contains_key(&0));
        assert!(doc.patches().contains_key(&0));
        assert!(doc.patches()[&0].apply);
    }

    #[test]
    fn duplicate_patch_tag_is_fatal() {
        let err =
            SpecDocument::from_content("x.spec".into(), "Patch1: a.patch\nPatch1: b.patch\n")
                .unwrap_err();
        assert!(matches!(err, SpecError::DuplicatePatch(1)));
    }

    #[test]
    fn duplicate_ignored_patch_tag_updates_line() {
        let content = "# gbpignorepatch: 1\nPatch1: a.patch\nPatch1: b.patch\n";
        let doc = SpecDocument::from_content("x.spec".into(), content).unwrap();
        assert_eq!(doc.patches()[&1].tag_line, Some(2));
    }

    #[test]
    fn duplicate_source_tag_is_fatal() {
        let err = SpecDocument::from_content("x.spec".into(), "Source0: a\nSource0: b\n")
            .unwrap_err();
        assert!(matches!(err, SpecError::DuplicateSource(0)));
    }

    #[test]
    fn macro_without_tag_is_fatal() {
        let err = SpecDocument::from_content("x.spec".into(), "%prep\n%patch7 -p1\n").unwrap_err();
        assert!(matches!(err, SpecError::MacroWithoutTag(7)));
    }

    #[test]
    fn reconcile_expands_filenames_and_folds_sentinel() {
        let mut doc = doc(BASIC_SPEC);
        doc.reconcile(&[
            ResolvedDeclaration {
                kind: DeclarationKind::Source,
                index: SOURCE_INDEX_SENTINEL,
                filename: "mypkg-1.0-expanded.tar.gz".into(),
            },
            ResolvedDeclaration {
                kind: DeclarationKind::Patch,
                index: 1,
                filename: "0001-old-fix-expanded.patch".into(),
            },
            // Unknown index: warns, does not fail
            ResolvedDeclaration {
                kind: DeclarationKind::Patch,
                index: 42,
                filename: "ghost.patch".into(),
            },
        ]);
        assert_eq!(doc.sources()[&0].filename, "mypkg-1.0-expanded.tar.gz");
        assert_eq!(doc.patches()[&1].filename, "0001-old-fix-expanded.patch");
        // Declared text is untouched
        assert_eq!(doc.sources()[&0].name, "mypkg-1.0.tar.gz");
    }

    #[test]
    fn update_patches_replaces_autoupdate_keeps_manual() {
        let mut doc = doc(BASIC_SPEC);
        let before_manual_tag = doc.lines()[doc.patches()[&0].tag_line.unwrap()].clone();

        doc.update_patches(&["0001-new-a.patch".into(), "0002-new-b.patch".into()])
            .unwrap();

        let autos: Vec<(&u32, &PatchEntry)> =
            doc.patches().iter().filter(|(_, p)| p.autoupdate).collect();
        assert_eq!(autos.len(), 2);
        // Renumbered from one past the highest manual index
        assert_eq!(*autos[0].0, 1);
        assert_eq!(autos[0].1.filename, "0001-new-a.patch");
        assert_eq!(*autos[1].0, 2);
        assert_eq!(autos[1].1.filename, "0002-new-b.patch");

        // Manual patch untouched, byte for byte
        let manual = &doc.patches()[&0];
        assert!(!manual.autoupdate);
        assert_eq!(doc.lines()[manual.tag_line.unwrap()], before_manual_tag);

        // Tag format: fixed-width label
        let tag = &doc.lines()[autos[0].1.tag_line.unwrap()];
        assert_eq!(tag, "Patch1:     0001-new-a.patch");
        // Banner precedes the first new tag
        assert!(doc.lines()[autos[0].1.tag_line.unwrap() - 1].contains("auto-generated"));

        // Macro lines present with their name comments
        let mac = autos[0].1.macro_line.unwrap();
        assert_eq!(doc.lines()[mac], "%patch1 -p1");
        assert_eq!(doc.lines()[mac - 1], "# 0001-new-a.patch");
    }

    #[test]
    fn update_patches_is_idempotent() {
        let mut doc = doc(BASIC_SPEC);
        let names = vec!["0001-new-a.patch".to_string(), "0002-new-b.patch".to_string()];
        doc.update_patches(&names).unwrap();
        let first = doc.lines().to_vec();
        doc.update_patches(&names).unwrap();
        assert_eq!(doc.lines(), first.as_slice());
    }

    #[test]
    fn update_patches_with_no_previous_patches() {
        let content = "\
Name: fresh
Source0: fresh-1.0.tar.gz

%prep
%setup -q

%build
";
        let mut doc = SpecDocument::from_content("fresh.spec".into(), content).unwrap();
        doc.update_patches(&["0001-first.patch".into()]).unwrap();

        let entry = &doc.patches()[&0];
        assert_eq!(entry.filename, "0001-first.patch");
        assert!(entry.apply);
        // Tags land after the last Source tag, macros after %setup
        assert!(entry.tag_line.unwrap() > doc.sources()[&0].tag_line);
        assert!(entry.macro_line.unwrap() > doc.markers().setup_macro.unwrap());
    }

    #[test]
    fn update_patches_without_anchor_is_fatal() {
        let mut doc =
            SpecDocument::from_content("bare.spec".into(), "Name: bare\nSource0: t.tar.gz\n")
                .unwrap();
        let err = doc.update_patches(&["0001-x.patch".into()]).unwrap_err();
        assert!(matches!(err, SpecError::NoMacroAnchor));
    }

    #[test]
    fn update_patches_empty_list_drops_all_autoupdate() {
        let mut doc = doc(BASIC_SPEC);
        doc.update_patches(&[]).unwrap();
        assert_eq!(doc.patches().len(), 1);
        assert!(doc.patches().contains_key(&0));
        assert!(!doc.lines().iter().any(|l| l.contains("0001-old-fix")));
    }

    #[test]
    fn patch_series_lists_applied_autoupdate_patches() {
        let doc = doc(BASIC_SPEC);
        let series = doc.patch_series(Path::new("pkg"));
        let paths: Vec<_> = series.paths().collect();
        assert_eq!(paths, vec![Path::new("pkg/0001-old-fix.patch")]);
        assert_eq!(series.iter().next().unwrap().strip, 1);
    }

    #[test]
    fn write_is_atomic_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg.spec");
        fs::write(&path, BASIC_SPEC).unwrap();

        let mut doc = SpecDocument::open(&path).unwrap();
        doc.update_patches(&["0001-roundtrip.patch".into()]).unwrap();
        doc.write().unwrap();

        let reread = SpecDocument::open(&path).unwrap();
        assert_eq!(reread.lines(), doc.lines());
    }

    #[test]
    fn find_spec_prefers_named_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.spec"), "Name: a\n").unwrap();
        fs::write(dir.path().join("b.spec"), "Name: b\n").unwrap();

        let found = find_spec_file(dir.path(), Some("b.spec")).unwrap();
        assert_eq!(found.file_name().unwrap(), "b.spec");

        let err = find_spec_file(dir.path(), None).unwrap_err();
        assert!(matches!(err, SpecError::MultipleSpecFiles(_)));
    }

    #[test]
    fn find_spec_errors_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_spec_file(dir.path(), None).unwrap_err();
        assert!(matches!(err, SpecError::NoSpecFile(_)));
    }
}
