//! Rendering a commit into a portable mail-like patch file.
//!
//! The byte stream is a From/Date/Subject header block (folded at 77
//! columns, non-ASCII values Q-encoded), the long description, a literal
//! `---` separator, then the diff text verbatim. No file is written for
//! an empty diff.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use super::{PatchError, PatchSeries};
use crate::repo::CommitInfo;

/// Total filename budget including ordinal prefix and suffix.
const FILENAME_BUDGET: usize = 63;
const PATCH_SUFFIX: &str = ".patch";
/// Header lines fold at this many columns.
const FOLD_WIDTH: usize = 77;

/// Write `info` plus `diff` to `path` as a patch file.
///
/// Returns `Ok(None)` without creating the file when the diff is empty;
/// a zero-change patch is never emitted.
pub fn write_patch_file(
    path: &Path,
    info: &CommitInfo,
    diff: &str,
) -> Result<Option<PathBuf>, PatchError> {
    if diff.is_empty() {
        debug!("not generating empty diff {}", path.display());
        return Ok(None);
    }

    let mut out = String::new();
    out.push_str(&fold_header("From", &format_from(info)));
    if let Some(date) = info.author.date {
        let datestr = date.format("%a, %-d %b %Y %H:%M:%S %z").to_string();
        out.push_str(&fold_header("Date", &datestr));
    }
    out.push_str(&fold_header("Subject", &encode_value(&info.subject)));

    let body = info.body.trim_end();
    let encode_body = !body.is_ascii();
    if encode_body {
        out.push_str("MIME-Version: 1.0\n");
        out.push_str("Content-Type: text/plain; charset=utf-8\n");
        out.push_str("Content-Transfer-Encoding: quoted-printable\n");
    }
    out.push('\n');
    if !body.is_empty() {
        if encode_body {
            out.push_str(&encode_quoted_printable(body));
        } else {
            out.push_str(body);
        }
        out.push('\n');
    }
    out.push_str("---\n");
    out.push_str(diff);

    fs::write(path, out).map_err(|e| PatchError::io("write", path, e))?;
    Ok(Some(path.to_path_buf()))
}

/// Derive the on-disk path for the next patch of `series`.
///
/// The slugged subject is truncated so ordinal prefix + slug + suffix
/// stay within the 63-character budget; a collision with a path already
/// in the series truncates further and appends `-<len(series)>`.
pub fn derive_patch_path(
    outdir: &Path,
    topic: Option<&str>,
    subject: &str,
    series: &PatchSeries,
    numbered: bool,
) -> PathBuf {
    let outdir = match topic {
        Some(topic) => outdir.join(topic),
        None => outdir.to_path_buf(),
    };
    let num_prefix = format!("{:04}-", series.len() + 1);
    let base_maxlen = FILENAME_BUDGET - num_prefix.len() - PATCH_SUFFIX.len();

    let slug = slugify(subject);
    let mut base = truncated(&slug, base_maxlen);
    let prefix = if numbered { num_prefix.as_str() } else { "" };
    let mut filepath = outdir.join(format!("{prefix}{base}{PATCH_SUFFIX}"));
    if series.contains_path(&filepath) {
        let presuffix = format!("-{}", series.len());
        base = format!(
            "{}{presuffix}",
            truncated(&slug, base_maxlen.saturating_sub(presuffix.len()))
        );
        filepath = outdir.join(format!("{prefix}{base}{PATCH_SUFFIX}"));
    }
    filepath
}

/// Filesystem-safe slug of a commit subject: ASCII alphanumerics kept,
/// every other run collapsed to a single `-`.
pub fn slugify(subject: &str) -> String {
    let mut slug = String::with_capacity(subject.len());
    let mut pending_dash = false;
    for ch in subject.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    slug
}

fn truncated(slug: &str, maxlen: usize) -> String {
    // Slugs are pure ASCII, byte truncation is safe.
    slug.chars().take(maxlen).collect()
}

/// `From` header value, author name quoted when it contains address
/// metacharacters and Q-encoded when non-ASCII.
fn format_from(info: &CommitInfo) -> String {
    let name = &info.author.name;
    let name = if name
        .chars()
        .any(|c| matches!(c, ',' | '.' | '@' | '(' | ')' | '[' | ']' | '\\' | ':' | ';'))
    {
        format!("\"{name}\"")
    } else {
        name.clone()
    };
    format!("{} <{}>", encode_value(&name), info.author.email)
}

/// Q-encode a header value when it contains non-ASCII text.
fn encode_value(value: &str) -> String {
    if value.is_ascii() {
        return value.to_string();
    }
    let mut encoded = String::from("=?utf-8?q?");
    for byte in value.bytes() {
        match byte {
            b' ' => encoded.push('_'),
            b'=' | b'?' | b'_' => push_hex(&mut encoded, byte),
            0x21..=0x7e => encoded.push(byte as char),
            _ => push_hex(&mut encoded, byte),
        }
    }
    encoded.push_str("?=");
    encoded
}

fn push_hex(out: &mut String, byte: u8) {
    out.push('=');
    out.push_str(&format!("{byte:02X}"));
}

/// Render `Name: value` folded at [`FOLD_WIDTH`] columns, continuation
/// lines indented with one space.
fn fold_header(name: &str, value: &str) -> String {
    let mut out = String::new();
    let mut line = format!("{name}:");
    for word in value.split_whitespace() {
        if line.len() + 1 + word.len() > FOLD_WIDTH && line.len() > name.len() + 1 {
            out.push_str(&line);
            out.push('\n');
            line = " ".to_string();
        } else {
            line.push(' ');
        }
        line.push_str(word);
    }
    out.push_str(&line);
    out.push('\n');
    out
}

/// Quoted-printable encode a body: bytes outside printable ASCII become
/// `=XX`, lines soft-wrap at 76 columns.
fn encode_quoted_printable(body: &str) -> String {
    let mut out = String::new();
    for line in body.split('\n') {
        let mut column = 0;
        for byte in line.bytes() {
            let chunk = match byte {
                b'=' => "=3D".to_string(),
                0x20..=0x7e => (byte as char).to_string(),
                b'\t' => "\t".to_string(),
                _ => format!("={byte:02X}"),
            };
            if column + chunk.len() > 75 {
                out.push_str("=\n");
                column = 0;
            }
            out.push_str(&chunk);
            column += chunk.len();
        }
        out.push('\n');
    }
    // split('\n') adds one newline too many for the final line
    out.pop();
    out
}
