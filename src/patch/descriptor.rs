//! One patch and the mail-style header parser for patches on disk.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use log::warn;

use super::PatchError;

/// A single patch: where it lives, who wrote it, how it applies.
///
/// Immutable after creation; export builds descriptors from commit
/// metadata, import reads them back from patch files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchDescriptor {
    pub path: PathBuf,
    pub author: Option<String>,
    pub email: Option<String>,
    pub date: Option<DateTime<FixedOffset>>,
    pub subject: String,
    pub long_desc: String,
    /// Component-strip level for application.
    pub strip: u32,
    /// Sub-directory grouping below the patch directory.
    pub topic: Option<String>,
    /// Managed by this engine rather than maintained by hand.
    pub autoupdate: bool,
}

impl PatchDescriptor {
    /// A descriptor with no parsed metadata; the subject falls back to
    /// the file stem.
    pub fn new(path: impl Into<PathBuf>, strip: u32, topic: Option<String>) -> Self {
        let path = path.into();
        let subject = file_stem(&path);
        Self {
            path,
            author: None,
            email: None,
            date: None,
            subject,
            long_desc: String::new(),
            strip,
            topic,
            autoupdate: true,
        }
    }

    /// Read the patch file at `path` and parse its mail-style header
    /// (From/Date/Subject with folded continuation lines) and long
    /// description up to the `---` separator or the start of the diff.
    pub fn from_file(
        path: impl Into<PathBuf>,
        strip: u32,
        topic: Option<String>,
    ) -> Result<Self, PatchError> {
        let path = path.into();
        let content =
            fs::read_to_string(&path).map_err(|e| PatchError::io("read", path.clone(), e))?;
        let header = parse_patch_header(&content);

        let subject = match header.subject {
            Some(s) if !s.is_empty() => s,
            _ => file_stem(&path),
        };
        let date = header.date.as_deref().and_then(|d| {
            let parsed = DateTime::parse_from_rfc2822(d.trim()).ok();
            if parsed.is_none() {
                warn!("unparsable Date header in {}: '{d}'", path.display());
            }
            parsed
        });
        let (author, email) = match header.from {
            Some(from) => split_address(&from),
            None => (None, None),
        };

        Ok(Self {
            path,
            author,
            email,
            date,
            subject,
            long_desc: header.body,
            strip,
            topic,
            autoupdate: true,
        })
    }

    /// File name component of the patch path.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Authorship is complete enough to commit with.
    pub fn has_authorship(&self) -> bool {
        matches!((&self.author, &self.email), (Some(a), Some(e)) if !a.is_empty() && !e.is_empty())
    }
}

fn file_stem(path: &Path) -> String {
    let stem = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    for suffix in [".patch", ".diff"] {
        if let Some(trimmed) = stem.strip_suffix(suffix) {
            return trimmed.to_string();
        }
    }
    stem
}

struct RawHeader {
    from: Option<String>,
    date: Option<String>,
    subject: Option<String>,
    body: String,
    quoted_printable: bool,
}

/// Split the mail-style preamble of a patch file into headers and long
/// description. The diff itself is not touched.
fn parse_patch_header(content: &str) -> RawHeader {
    let mut header = RawHeader {
        from: None,
        date: None,
        subject: None,
        body: String::new(),
        quoted_printable: false,
    };

    let mut lines = content.lines().peekable();

    // Header block: `Name: value` lines with folded continuations,
    // terminated by the first blank line. A line that is no header at
    // all ends the block and belongs to the description.
    let mut current: Option<(String, String)> = None;
    let mut leftover = None;
    for line in lines.by_ref() {
        if line.is_empty() {
            break;
        }
        if (line.starts_with(' ') || line.starts_with('\t')) && current.is_some() {
            if let Some((_, value)) = current.as_mut() {
                value.push(' ');
                value.push_str(line.trim_start());
            }
            continue;
        }
        if let Some((name, value)) = current.take() {
            store_header(&mut header, &name, value);
        }
        match line.split_once(':') {
            Some((name, value)) => current = Some((name.to_string(), value.trim().to_string())),
            None => {
                leftover = Some(line);
                break;
            }
        }
    }
    if let Some((name, value)) = current.take() {
        store_header(&mut header, &name, value);
    }

    // Long description: up to the separator or the diff itself.
    let mut body_lines = Vec::new();
    for line in leftover.into_iter().chain(lines) {
        if line == "---" || line.starts_with("diff ") || line.starts_with("Index:") {
            break;
        }
        body_lines.push(line);
    }
    let body = body_lines.join("\n").trim_end().to_string();
    header.body = if header.quoted_printable {
        decode_quoted_printable(&body)
    } else {
        body
    };
    header
}

fn store_header(header: &mut RawHeader, name: &str, value: String) {
    match name.to_ascii_lowercase().as_str() {
        "from" => header.from = Some(decode_rfc2047(&value)),
        "date" => header.date = Some(value),
        "subject" => header.subject = Some(decode_rfc2047(&value)),
        "content-transfer-encoding" => {
            header.quoted_printable = value.eq_ignore_ascii_case("quoted-printable");
        }
        _ => {}
    }
}

/// Split `Name <email>` into its parts. A bare address is recognized by
/// the `@`; anything else is taken as a name without email.
fn split_address(from: &str) -> (Option<String>, Option<String>) {
    if let Some(open) = from.rfind('<') {
        if let Some(close) = from[open..].find('>') {
            let email = from[open + 1..open + close].trim().to_string();
            let name = from[..open].trim().trim_matches('"').trim().to_string();
            let name = (!name.is_empty()).then_some(name);
            return (name, (!email.is_empty()).then_some(email));
        }
    }
    let bare = from.trim();
    if bare.contains('@') {
        (None, Some(bare.to_string()))
    } else {
        ((!bare.is_empty()).then(|| bare.to_string()), None)
    }
}

/// Decode `=?utf-8?q?...?=` encoded words; base64 words and unknown
/// charsets are left as-is.
fn decode_rfc2047(value: &str) -> String {
    let mut result = String::new();
    let mut rest = value;
    while let Some(start) = rest.find("=?") {
        let (plain, encoded) = rest.split_at(start);
        result.push_str(plain);
        let Some(end) = encoded[2..].find("?=").map(|i| i + 4) else {
            result.push_str(encoded);
            return result;
        };
        let word = &encoded[..end];
        let parts: Vec<&str> = word.trim_start_matches("=?").trim_end_matches("?=").splitn(3, '?').collect();
        match parts.as_slice() {
            [charset, enc, text]
                if charset.eq_ignore_ascii_case("utf-8") && enc.eq_ignore_ascii_case("q") =>
            {
                result.push_str(&decode_q_word(text));
            }
            _ => result.push_str(word),
        }
        rest = &encoded[end..];
        // Whitespace between adjacent encoded words is transparent.
        if rest.trim_start().starts_with("=?") {
            rest = rest.trim_start();
        }
    }
    result.push_str(rest);
    result
}

fn decode_q_word(text: &str) -> String {
    decode_quoted_printable(&text.replace('_', " "))
}

fn decode_quoted_printable(text: &str) -> String {
    let mut bytes = Vec::with_capacity(text.len());
    let mut input = text.bytes().peekable();
    while let Some(b) = input.next() {
        if b != b'=' {
            bytes.push(b);
            continue;
        }
        // Soft line break: `=` at end of line.
        if input.peek() == Some(&b'\n') {
            input.next();
            continue;
        }
        let hi = input.next();
        let lo = input.next();
        match (hi, lo) {
            (Some(hi), Some(lo)) => {
                let pair = [hi, lo];
                match u8::from_str_radix(std::str::from_utf8(&pair).unwrap_or(""), 16) {
                    Ok(byte) => bytes.push(byte),
                    Err(_) => bytes.extend_from_slice(&[b'=', hi, lo]),
                }
            }
            (Some(hi), None) => bytes.extend_from_slice(&[b'=', hi]),
            _ => bytes.push(b'='),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
