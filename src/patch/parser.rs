//! Unified diff parsing
//!
//! Turns raw diff text (typically produced by a generation backend) into a
//! structured [`DiffDocument`]. Parsing is strict inside file bodies: a
//! malformed hunk header or an unexpected line inside a hunk rejects the whole
//! document. Prose and git preamble between file sections are tolerated, since
//! generated output routinely wraps the diff in commentary.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors during diff parsing. Line numbers are 1-based into the raw input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("line {line}: malformed hunk header: {content}")]
    MalformedHunkHeader { line: usize, content: String },

    #[error("line {line}: expected '+++' header after '---', found: {content}")]
    MissingNewHeader { line: usize, content: String },

    #[error("line {line}: file header names no usable path")]
    MalformedFileHeader { line: usize },

    #[error("line {line}: file section for {path} contains no hunks")]
    MissingHunks { line: usize, path: String },

    #[error("line {line}: unexpected line inside hunk: {content}")]
    UnexpectedHunkLine { line: usize, content: String },

    #[error("line {line}: hunk body ends before declared counts are satisfied")]
    TruncatedHunk { line: usize },

    #[error("no file changes found in diff")]
    NoFiles,
}

/// How a [`FileDiff`] changes its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
}

/// A line in a diff hunk. Content is kept byte-for-byte after the prefix
/// character, trailing whitespace included, since downstream matching is exact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HunkLine {
    Context(String),
    Add(String),
    Remove(String),
}

/// A contiguous block of changes anchored to a line range in the old and new
/// file. Counts are enforced during parsing: context+remove lines equal
/// `old_count`, context+add lines equal `new_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    /// Starting line in the original file (1-indexed; 0 for pure insertions)
    pub old_start: usize,
    /// Number of original lines covered
    pub old_count: usize,
    /// Starting line in the new file (1-indexed)
    pub new_start: usize,
    /// Number of resulting lines covered
    pub new_count: usize,
    /// Tagged lines in file order
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    /// Lines this hunk expects to find in the original file (context + remove).
    pub fn old_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Remove(s) => Some(s.as_str()),
                HunkLine::Add(_) => None,
            })
            .collect()
    }

    /// Lines this hunk produces in the new file (context + add).
    pub fn new_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Add(s) => Some(s.as_str()),
                HunkLine::Remove(_) => None,
            })
            .collect()
    }
}

/// Changes to a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    /// Path relative to the base directory
    pub path: PathBuf,
    pub kind: ChangeKind,
    /// Hunks in document order
    pub hunks: Vec<Hunk>,
    /// Old file lacked a trailing newline (`\ No newline at end of file`)
    pub old_missing_newline: bool,
    /// New file lacks a trailing newline
    pub new_missing_newline: bool,
}

/// An immutable, fully-validated diff. Ordered set of file changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffDocument {
    pub files: Vec<FileDiff>,
}

impl DiffDocument {
    /// Paths touched by this document, in document order.
    pub fn touched_paths(&self) -> Vec<&Path> {
        self.files.iter().map(|f| f.path.as_path()).collect()
    }
}

/// Strip the optional `a/`/`b/` prefix and any tab-separated timestamp from a
/// `---`/`+++` header path. Returns `None` for `/dev/null`.
fn parse_header_path(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.split('\t').next().unwrap_or(raw).trim_end();
    if trimmed == "/dev/null" {
        return None;
    }
    let stripped = trimmed
        .strip_prefix("a/")
        .or_else(|| trimmed.strip_prefix("b/"))
        .unwrap_or(trimmed);
    Some(PathBuf::from(stripped))
}

/// Parse raw unified diff text into a [`DiffDocument`].
///
/// The whole document is rejected on the first error; no partial documents.
pub fn parse_diff(input: &str) -> Result<DiffDocument, ParseError> {
    // Regex for hunk header: @@ -old_start,old_count +new_start,new_count @@
    let hunk_re = Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").unwrap();

    // split('\n') instead of lines() so '\r' bytes survive; drop the empty
    // tail produced by a trailing newline
    let mut lines: Vec<&str> = input.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }

    let mut files = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(old_raw) = lines[i].strip_prefix("--- ") else {
            // Preamble, prose between sections, `diff --git`/`index`/mode lines
            i += 1;
            continue;
        };

        let Some(new_raw) = lines.get(i + 1).and_then(|l| l.strip_prefix("+++ ")) else {
            return Err(ParseError::MissingNewHeader {
                line: i + 2,
                content: lines.get(i + 1).unwrap_or(&"<end of input>").to_string(),
            });
        };

        let header_line = i + 1;
        let old_path = parse_header_path(old_raw);
        let new_path = parse_header_path(new_raw);

        let kind = match (&old_path, &new_path) {
            (None, Some(_)) => ChangeKind::Create,
            (Some(_), None) => ChangeKind::Delete,
            (Some(_), Some(_)) => ChangeKind::Modify,
            (None, None) => return Err(ParseError::MalformedFileHeader { line: header_line }),
        };
        let path = match kind {
            ChangeKind::Delete => old_path.unwrap_or_default(),
            _ => new_path.unwrap_or_default(),
        };

        i += 2;

        let mut file = FileDiff {
            path,
            kind,
            hunks: Vec::new(),
            old_missing_newline: false,
            new_missing_newline: false,
        };

        // One or more hunks follow the header pair
        while i < lines.len() && lines[i].starts_with("@@") {
            let caps = hunk_re
                .captures(lines[i])
                .ok_or_else(|| ParseError::MalformedHunkHeader {
                    line: i + 1,
                    content: lines[i].to_string(),
                })?;

            let parse_num = |m: Option<regex::Match>, default: usize| {
                m.map_or(Ok(default), |m| {
                    m.as_str()
                        .parse()
                        .map_err(|_| ParseError::MalformedHunkHeader {
                            line: i + 1,
                            content: lines[i].to_string(),
                        })
                })
            };
            let old_start = parse_num(caps.get(1), 1)?;
            let old_count = parse_num(caps.get(2), 1)?;
            let new_start = parse_num(caps.get(3), 1)?;
            let new_count = parse_num(caps.get(4), 1)?;

            i += 1;

            // Count-driven body: consume exactly until both sides are satisfied
            let mut body = Vec::new();
            let mut old_left = old_count;
            let mut new_left = new_count;
            let mut last_removed = false;

            while old_left > 0 || new_left > 0 {
                let Some(&raw) = lines.get(i) else {
                    return Err(ParseError::TruncatedHunk { line: i });
                };

                if let Some(content) = raw.strip_prefix('+') {
                    if new_left == 0 {
                        return Err(ParseError::UnexpectedHunkLine {
                            line: i + 1,
                            content: raw.to_string(),
                        });
                    }
                    body.push(HunkLine::Add(content.to_string()));
                    new_left -= 1;
                    last_removed = false;
                } else if let Some(content) = raw.strip_prefix('-') {
                    if old_left == 0 {
                        return Err(ParseError::UnexpectedHunkLine {
                            line: i + 1,
                            content: raw.to_string(),
                        });
                    }
                    body.push(HunkLine::Remove(content.to_string()));
                    old_left -= 1;
                    last_removed = true;
                } else if let Some(content) = raw.strip_prefix(' ') {
                    if old_left == 0 || new_left == 0 {
                        return Err(ParseError::UnexpectedHunkLine {
                            line: i + 1,
                            content: raw.to_string(),
                        });
                    }
                    body.push(HunkLine::Context(content.to_string()));
                    old_left -= 1;
                    new_left -= 1;
                    last_removed = false;
                } else if raw.is_empty() {
                    // Some transports strip the lone space from empty context lines
                    if old_left == 0 || new_left == 0 {
                        return Err(ParseError::UnexpectedHunkLine {
                            line: i + 1,
                            content: raw.to_string(),
                        });
                    }
                    body.push(HunkLine::Context(String::new()));
                    old_left -= 1;
                    new_left -= 1;
                    last_removed = false;
                } else if raw.starts_with('\\') {
                    // "\ No newline at end of file" applies to the preceding line
                    if last_removed {
                        file.old_missing_newline = true;
                    } else {
                        file.new_missing_newline = true;
                    }
                } else {
                    return Err(ParseError::UnexpectedHunkLine {
                        line: i + 1,
                        content: raw.to_string(),
                    });
                }

                i += 1;
            }

            // Trailing no-newline marker after the final hunk line
            while i < lines.len() && lines[i].starts_with('\\') {
                if last_removed {
                    // Removed lines reached the old EOF without a newline; the
                    // new side keeps whatever the next marker says
                    file.old_missing_newline = true;
                    last_removed = false;
                } else {
                    file.new_missing_newline = true;
                }
                i += 1;
            }

            file.hunks.push(Hunk {
                old_start,
                old_count,
                new_start,
                new_count,
                lines: body,
            });
        }

        if file.hunks.is_empty() {
            return Err(ParseError::MissingHunks {
                line: header_line,
                path: file.path.display().to_string(),
            });
        }

        files.push(file);
    }

    if files.is_empty() {
        return Err(ParseError::NoFiles);
    }

    Ok(DiffDocument { files })
}
