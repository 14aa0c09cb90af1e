//! Queue-branch naming pattern.
//!
//! A pattern like `patch-queue/{branch}` both recognizes queue branches
//! and generates their names; matching and generation always use the
//! identical placeholder set. The `{branch}` placeholder is mandatory,
//! extra named placeholders are filled from caller-supplied keys.

use std::collections::HashMap;

use regex::Regex;

use super::QueueError;

pub const DEFAULT_QUEUE_PATTERN: &str = "patch-queue/{branch}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

#[derive(Debug, Clone)]
pub struct QueuePattern {
    segments: Vec<Segment>,
    matcher: Regex,
}

impl QueuePattern {
    /// Parse and validate a pattern string.
    pub fn new(pattern: &str) -> Result<Self, QueueError> {
        let segments = parse_segments(pattern)?;
        if !segments
            .iter()
            .any(|s| matches!(s, Segment::Placeholder(name) if name == "branch"))
        {
            return Err(QueueError::PatternMissingBranch(pattern.to_string()));
        }

        let mut expr = String::from("^");
        for segment in &segments {
            match segment {
                Segment::Literal(text) => expr.push_str(&regex::escape(text)),
                Segment::Placeholder(name) => {
                    expr.push_str(&format!("(?P<{name}>\\S+)"));
                }
            }
        }
        expr.push('$');
        let matcher = Regex::new(&expr)
            .map_err(|e| QueueError::InvalidPattern(pattern.to_string(), e.to_string()))?;

        Ok(Self { segments, matcher })
    }

    /// Whether `branch` is a queue branch under this pattern.
    pub fn is_queue(&self, branch: &str) -> bool {
        self.matcher.is_match(branch)
    }

    /// Placeholder values captured from a queue-branch name.
    pub fn match_branch(&self, branch: &str) -> Option<HashMap<String, String>> {
        let caps = self.matcher.captures(branch)?;
        let mut fields = HashMap::new();
        for name in self.matcher.capture_names().flatten() {
            if let Some(value) = caps.name(name) {
                fields.insert(name.to_string(), value.as_str().to_string());
            }
        }
        Some(fields)
    }

    /// Base branch of a queue branch, or `None` if `branch` is not one.
    pub fn base_of(&self, branch: &str) -> Option<String> {
        self.match_branch(branch).and_then(|f| f.get("branch").cloned())
    }

    /// Queue-branch name for `base`, or `None` when `base` is already a
    /// queue branch. Placeholders other than `branch` are filled from
    /// `extra`; an unfilled placeholder renders empty.
    pub fn queue_name(&self, base: &str, extra: &[(&str, &str)]) -> Option<String> {
        if self.is_queue(base) {
            return None;
        }
        let mut name = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => name.push_str(text),
                Segment::Placeholder(field) if field == "branch" => name.push_str(base),
                Segment::Placeholder(field) => {
                    if let Some((_, value)) = extra.iter().find(|(key, _)| key == field) {
                        name.push_str(value);
                    }
                }
            }
        }
        Some(name)
    }
}

fn parse_segments(pattern: &str) -> Result<Vec<Segment>, QueueError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = pattern;
    while let Some(open) = rest.find('{') {
        literal.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            return Err(QueueError::InvalidPattern(
                pattern.to_string(),
                "unclosed '{' placeholder".to_string(),
            ));
        };
        let name = &after[..close];
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
            return Err(QueueError::InvalidPattern(
                pattern.to_string(),
                format!("bad placeholder name '{{{name}}}'"),
            ));
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Placeholder(name.to_string()));
        rest = &after[close + 1..];
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}
