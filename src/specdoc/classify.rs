//! Line classification for spec documents.
//!
//! Each line of the document maps to exactly one [`LineKind`]; everything
//! the parser and the rewrite pass know about the document derives from
//! this classification plus line numbers. Classification order matters:
//! an annotation comment must win over the marker patterns, and tags are
//! tried before macros.

use regex::Regex;

/// Classification of a single spec-document line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Plain,
    /// `# gbp<name>: <data>` engine annotation.
    Annotation { name: String, data: String },
    /// `Source<N>: <value>` declaration tag; missing index means 0.
    SourceTag { index: Option<u32>, value: String },
    /// `Patch<N>: <value>` declaration tag; missing index means 0.
    PatchTag { index: Option<u32>, value: String },
    /// `%patch<N> [-p<strip>] [...]` applicator directive.
    PatchMacro {
        index: Option<u32>,
        strip: Option<u32>,
        /// Index given via `-P<N>` rather than the macro name.
        explicit_index: Option<u32>,
    },
    /// `Name: <value>` package-name declaration.
    NameTag { value: String },
    /// `%setup` directive.
    SetupMacro,
    /// `%prep` section start.
    PrepMacro,
}

pub struct Classifier {
    annotation: Regex,
    source_tag: Regex,
    patch_tag: Regex,
    patch_macro: Regex,
    name_tag: Regex,
    setup_macro: Regex,
    prep_macro: Regex,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    pub fn new() -> Self {
        Self {
            annotation: Regex::new(r"(?i)^\s*#\s*gbp(?P<name>[a-z]+)\s*:\s*(?P<data>\S.*?)\s*$")
                .expect("annotation pattern"),
            source_tag: Regex::new(r"(?i)^Source(?P<num>[0-9]+)?\s*:\s*(?P<value>\S.*?)\s*$")
                .expect("source tag pattern"),
            patch_tag: Regex::new(r"(?i)^Patch(?P<num>[0-9]+)?\s*:\s*(?P<value>\S.*?)\s*$")
                .expect("patch tag pattern"),
            patch_macro: Regex::new(r"^%patch(?P<num>[0-9]+)?(?:\s+(?P<args>.*))?$")
                .expect("patch macro pattern"),
            name_tag: Regex::new(r"(?i)^\s*Name\s*:\s*(?P<value>\S.*?)\s*$")
                .expect("name tag pattern"),
            setup_macro: Regex::new(r"^%setup(\s.*)?$").expect("setup macro pattern"),
            prep_macro: Regex::new(r"^%prep(\s.*)?$").expect("prep macro pattern"),
        }
    }

    pub fn classify(&self, line: &str) -> LineKind {
        if let Some(caps) = self.annotation.captures(line) {
            return LineKind::Annotation {
                name: caps["name"].to_lowercase(),
                data: caps["data"].to_string(),
            };
        }
        if let Some(caps) = self.source_tag.captures(line) {
            return LineKind::SourceTag {
                index: caps.name("num").map(|m| parse_index(m.as_str())),
                value: caps["value"].to_string(),
            };
        }
        if let Some(caps) = self.patch_tag.captures(line) {
            return LineKind::PatchTag {
                index: caps.name("num").map(|m| parse_index(m.as_str())),
                value: caps["value"].to_string(),
            };
        }
        if let Some(caps) = self.patch_macro.captures(line) {
            let (strip, explicit_index) =
                parse_macro_args(caps.name("args").map(|m| m.as_str()).unwrap_or(""));
            return LineKind::PatchMacro {
                index: caps.name("num").map(|m| parse_index(m.as_str())),
                strip,
                explicit_index,
            };
        }
        if let Some(caps) = self.name_tag.captures(line) {
            return LineKind::NameTag {
                value: caps["value"].to_string(),
            };
        }
        if self.setup_macro.is_match(line) {
            return LineKind::SetupMacro;
        }
        if self.prep_macro.is_match(line) {
            return LineKind::PrepMacro;
        }
        LineKind::Plain
    }
}

fn parse_index(digits: &str) -> u32 {
    // The tag regexes only capture digit runs; clamp absurd values.
    digits.parse().unwrap_or(u32::MAX)
}

/// Extract `-p<strip>` and `-P<num>` from `%patch` arguments.
///
/// The value may be attached (`-p1`) or separated (`-p 1`); `-s`, `-b`
/// and `-E` are accepted and ignored.
fn parse_macro_args(args: &str) -> (Option<u32>, Option<u32>) {
    let mut strip = None;
    let mut explicit = None;
    let mut tokens = args.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        for (flag, slot) in [("-p", &mut strip), ("-P", &mut explicit)] {
            if let Some(rest) = token.strip_prefix(flag) {
                let value = if rest.is_empty() {
                    tokens.next().unwrap_or("")
                } else {
                    rest
                };
                if let Ok(n) = value.parse() {
                    *slot = Some(n);
                }
            }
        }
    }
    (strip, explicit)
}
