//! Transactional patch application with bounded contextual search
//!
//! Applies a [`DiffDocument`] to a base directory in two phases: every file is
//! validated and its new content synthesized in memory first; only when the
//! whole document validates are any files written, under a [`Backup`] that is
//! rolled back if a write fails and committed only after the last write.

use super::backup::{Backup, RollbackError};
use super::parser::{ChangeKind, DiffDocument, FileDiff, HunkLine};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Fatal errors that abort an attempt without a retry.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("base directory does not exist: {path}")]
    BaseDirMissing { path: PathBuf },

    #[error("path escapes base directory: {path}")]
    SecurityViolation { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to back up {path}: {source}")]
    Backup { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Rollback(#[from] RollbackError),
}

/// Recoverable per-file rejection reasons. These abort the attempt but are
/// safe to feed back to the generator for another try.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RejectReason {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("create target already exists: {path}")]
    AlreadyExists { path: PathBuf },

    #[error(
        "hunk {hunk_index} context mismatch in {path} near line {expected_line}: \
         expected {expected:?}, found {actual:?}"
    )]
    ContextMismatch {
        path: PathBuf,
        /// 0-based index of the failing hunk within the file
        hunk_index: usize,
        /// 1-based line in the current file where the hunk was expected
        expected_line: usize,
        expected: Vec<String>,
        actual: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyMode {
    Apply,
    DryRun,
}

/// Outcome for a single file within a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FileOutcome {
    /// Validated; `new_content` is `None` for deletions
    Applied { new_content: Option<String> },
    Rejected { reason: RejectReason },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileApplyResult {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub outcome: FileOutcome,
}

/// Result of applying (or dry-running) one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyReport {
    pub files: Vec<FileApplyResult>,
    pub success: bool,
    pub mode: ApplyMode,
}

impl ApplyReport {
    /// Human-readable detail of the first rejection, for retry context.
    pub fn failure_detail(&self) -> Option<String> {
        self.files.iter().find_map(|f| match &f.outcome {
            FileOutcome::Rejected { reason } => Some(reason.to_string()),
            FileOutcome::Applied { .. } => None,
        })
    }
}

/// Tunables for hunk matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ApplierConfig {
    /// Maximum line drift searched around a hunk's expected position.
    /// Candidates are tried nearest-first; the earlier position wins ties.
    pub search_window: usize,
}

impl Default for ApplierConfig {
    fn default() -> Self {
        Self { search_window: 3 }
    }
}

enum ValidateFailure {
    Reject(RejectReason),
    Fatal(ApplyError),
}

/// Applies diff documents to a directory tree.
pub struct PatchApplier {
    base_dir: PathBuf,
    config: ApplierConfig,
}

impl PatchApplier {
    pub fn new(base_dir: &Path, config: ApplierConfig) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            config,
        }
    }

    /// Apply a document. Either every file applies or none are left modified.
    ///
    /// Recoverable rejections come back as an unsuccessful [`ApplyReport`];
    /// `Err` is reserved for fatal conditions (I/O short of not-found,
    /// path escapes, rollback failure).
    pub fn apply(&self, doc: &DiffDocument, mode: ApplyMode) -> Result<ApplyReport, ApplyError> {
        if !self.base_dir.is_dir() {
            return Err(ApplyError::BaseDirMissing {
                path: self.base_dir.clone(),
            });
        }

        // Phase 1: validate every file and synthesize new content in memory
        let mut results = Vec::new();
        let mut planned: Vec<(PathBuf, Option<String>)> = Vec::new();

        for file in &doc.files {
            let abs = self.resolve(&file.path)?;

            match self.validate_file(file, &abs) {
                Ok(new_content) => {
                    results.push(FileApplyResult {
                        path: file.path.clone(),
                        kind: file.kind,
                        outcome: FileOutcome::Applied {
                            new_content: new_content.clone(),
                        },
                    });
                    planned.push((abs, new_content));
                }
                Err(ValidateFailure::Reject(reason)) => {
                    tracing::warn!(path = %file.path.display(), %reason, "patch rejected");
                    results.push(FileApplyResult {
                        path: file.path.clone(),
                        kind: file.kind,
                        outcome: FileOutcome::Rejected { reason },
                    });
                    // Whole-document abort; nothing has been written yet
                    return Ok(ApplyReport {
                        files: results,
                        success: false,
                        mode,
                    });
                }
                Err(ValidateFailure::Fatal(e)) => return Err(e),
            }
        }

        if mode == ApplyMode::DryRun {
            return Ok(ApplyReport {
                files: results,
                success: true,
                mode,
            });
        }

        // Phase 2: snapshot all touched paths, then write; roll back on any
        // write failure, commit only after the last write
        let mut backup = Backup::new();
        for (abs, _) in &planned {
            backup.capture(abs).map_err(|e| ApplyError::Backup {
                path: abs.clone(),
                source: e,
            })?;
        }

        for (abs, new_content) in &planned {
            let write_result = match new_content {
                Some(content) => {
                    if let Some(parent) = abs.parent() {
                        fs::create_dir_all(parent)
                            .and_then(|_| fs::write(abs, content))
                    } else {
                        fs::write(abs, content)
                    }
                }
                None => fs::remove_file(abs),
            };

            if let Err(e) = write_result {
                backup.rollback()?;
                return Err(ApplyError::Write {
                    path: abs.clone(),
                    source: e,
                });
            }
        }

        backup.commit();
        tracing::debug!(files = planned.len(), "patch applied");

        Ok(ApplyReport {
            files: results,
            success: true,
            mode,
        })
    }

    /// Resolve a diff path against the base directory, rejecting absolute
    /// paths and any parent-directory traversal.
    fn resolve(&self, path: &Path) -> Result<PathBuf, ApplyError> {
        let escapes = path.is_absolute()
            || path
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));

        if escapes {
            return Err(ApplyError::SecurityViolation {
                path: path.to_path_buf(),
            });
        }

        Ok(self.base_dir.join(path))
    }

    fn validate_file(
        &self,
        file: &FileDiff,
        abs: &Path,
    ) -> Result<Option<String>, ValidateFailure> {
        match file.kind {
            ChangeKind::Create => {
                if abs.exists() {
                    return Err(ValidateFailure::Reject(RejectReason::AlreadyExists {
                        path: file.path.clone(),
                    }));
                }

                let mut lines: Vec<&str> = Vec::new();
                for hunk in &file.hunks {
                    for line in &hunk.lines {
                        if let HunkLine::Add(content) = line {
                            lines.push(content);
                        }
                    }
                }

                let mut content = lines.join("\n");
                if !file.new_missing_newline && !content.is_empty() {
                    content.push('\n');
                }
                Ok(Some(content))
            }

            ChangeKind::Modify => {
                let current = self.read_current(file, abs)?;
                let new_content = self.apply_hunks(file, &current)?;
                Ok(Some(new_content))
            }

            ChangeKind::Delete => {
                let current = self.read_current(file, abs)?;
                // Verify the remove lines match before planning the removal
                self.apply_hunks(file, &current)?;
                Ok(None)
            }
        }
    }

    fn read_current(&self, file: &FileDiff, abs: &Path) -> Result<String, ValidateFailure> {
        match fs::read_to_string(abs) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ValidateFailure::Reject(RejectReason::FileNotFound {
                    path: file.path.clone(),
                }))
            }
            Err(e) => Err(ValidateFailure::Fatal(ApplyError::Read {
                path: abs.to_path_buf(),
                source: e,
            })),
        }
    }

    /// Match every hunk against the current content and synthesize the new
    /// file, keeping unmatched regions untouched.
    fn apply_hunks(&self, file: &FileDiff, content: &str) -> Result<String, ValidateFailure> {
        let (mut lines, had_newline) = split_lines(content);

        let mut hunks: Vec<_> = file.hunks.iter().collect();
        hunks.sort_by_key(|h| h.old_start);

        // Running drift: earlier hunks shift the line numbers of later ones
        let mut offset: i64 = 0;

        for (hunk_index, hunk) in hunks.iter().enumerate() {
            let old_lines = hunk.old_lines();

            // For pure insertions old_start names the line the hunk follows,
            // so the 0-based insert position is old_start itself
            let base = if hunk.old_count == 0 {
                hunk.old_start as i64
            } else {
                hunk.old_start as i64 - 1
            };
            let expected = (base + offset).clamp(0, lines.len() as i64) as usize;

            let pos = if old_lines.is_empty() {
                expected
            } else {
                self.locate(&lines, &old_lines, expected).ok_or_else(|| {
                    let end = (expected + old_lines.len()).min(lines.len());
                    let actual = lines
                        .get(expected.min(lines.len())..end)
                        .unwrap_or_default()
                        .to_vec();
                    ValidateFailure::Reject(RejectReason::ContextMismatch {
                        path: file.path.clone(),
                        hunk_index,
                        expected_line: expected + 1,
                        expected: old_lines.iter().map(|s| s.to_string()).collect(),
                        actual,
                    })
                })?
            };

            let replacement: Vec<String> =
                hunk.new_lines().iter().map(|s| s.to_string()).collect();
            let end = pos + old_lines.len();
            lines.splice(pos..end, replacement);

            offset += hunk.new_count as i64 - hunk.old_count as i64;
            offset += pos as i64 - expected as i64;
        }

        let mut new_content = lines.join("\n");
        let ends_with_newline = if file.new_missing_newline {
            false
        } else {
            // A marker on the old side means the diff restored the newline;
            // otherwise preserve whatever the file had
            file.old_missing_newline || had_newline
        };
        if ends_with_newline && !lines.is_empty() {
            new_content.push('\n');
        }

        Ok(new_content)
    }

    /// Find the position whose lines equal `old_lines`, searching a bounded
    /// window of offsets around `expected`, nearest candidates first.
    fn locate(&self, lines: &[String], old_lines: &[&str], expected: usize) -> Option<usize> {
        for drift in 0..=self.config.search_window {
            let below = expected.checked_sub(drift);
            let above = expected + drift;

            if let Some(pos) = below {
                if matches_at(lines, old_lines, pos) {
                    return Some(pos);
                }
            }
            if drift > 0 && matches_at(lines, old_lines, above) {
                return Some(above);
            }
        }
        None
    }
}

fn matches_at(lines: &[String], old_lines: &[&str], pos: usize) -> bool {
    if pos + old_lines.len() > lines.len() {
        return false;
    }
    old_lines
        .iter()
        .enumerate()
        .all(|(i, expected)| lines[pos + i] == *expected)
}

/// Split content into lines without terminators, remembering whether a
/// trailing newline was present.
fn split_lines(content: &str) -> (Vec<String>, bool) {
    if content.is_empty() {
        return (Vec::new(), false);
    }
    let had_newline = content.ends_with('\n');
    let mut lines: Vec<String> = content.split('\n').map(String::from).collect();
    if had_newline {
        lines.pop();
    }
    (lines, had_newline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::parser::parse_diff;
    use tempfile::TempDir;

    fn setup_test_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn applier(dir: &TempDir) -> PatchApplier {
        PatchApplier::new(dir.path(), ApplierConfig::default())
    }

    #[test]
    fn test_modify_with_matching_context() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "main.py", "def main():\n    print('world')\n");

        let diff = "\
--- a/main.py
+++ b/main.py
@@ -1,2 +1,3 @@
 def main():
+    print('hello')
     print('world')
";
        let doc = parse_diff(diff).unwrap();
        let report = applier(&dir).apply(&doc, ApplyMode::Apply).unwrap();

        assert!(report.success);
        let content = fs::read_to_string(dir.path().join("main.py")).unwrap();
        assert_eq!(content, "def main():\n    print('hello')\n    print('world')\n");
    }

    #[test]
    fn test_two_file_modify_and_create() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "a.py", "x = 1\n");

        let diff = "\
--- a/a.py
+++ b/a.py
@@ -1,1 +1,1 @@
-x = 1
+x = 2
--- /dev/null
+++ b/b.py
@@ -0,0 +1,2 @@
+def fresh():
+    return 2
";
        let doc = parse_diff(diff).unwrap();
        let report = applier(&dir).apply(&doc, ApplyMode::Apply).unwrap();

        assert!(report.success);
        assert_eq!(fs::read_to_string(dir.path().join("a.py")).unwrap(), "x = 2\n");
        assert_eq!(
            fs::read_to_string(dir.path().join("b.py")).unwrap(),
            "def fresh():\n    return 2\n"
        );
    }

    #[test]
    fn test_context_mismatch_aborts_whole_document() {
        let dir = TempDir::new().unwrap();
        // a.py was edited since the diff was generated
        setup_test_file(dir.path(), "a.py", "y = 99\n");

        let diff = "\
--- a/a.py
+++ b/a.py
@@ -1,1 +1,1 @@
-x = 1
+x = 2
--- /dev/null
+++ b/b.py
@@ -0,0 +1,1 @@
+created = True
";
        let doc = parse_diff(diff).unwrap();
        let report = applier(&dir).apply(&doc, ApplyMode::Apply).unwrap();

        assert!(!report.success);
        assert!(matches!(
            report.files[0].outcome,
            FileOutcome::Rejected {
                reason: RejectReason::ContextMismatch { .. }
            }
        ));
        // Nothing on disk changed: a.py untouched, b.py never created
        assert_eq!(fs::read_to_string(dir.path().join("a.py")).unwrap(), "y = 99\n");
        assert!(!dir.path().join("b.py").exists());
    }

    #[test]
    fn test_context_mismatch_reports_expected_and_actual() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "a.py", "actual line\n");

        let diff = "\
--- a/a.py
+++ b/a.py
@@ -1,1 +1,1 @@
-expected line
+replacement
";
        let doc = parse_diff(diff).unwrap();
        let report = applier(&dir).apply(&doc, ApplyMode::Apply).unwrap();

        let FileOutcome::Rejected {
            reason:
                RejectReason::ContextMismatch {
                    expected, actual, ..
                },
        } = &report.files[0].outcome
        else {
            panic!("expected context mismatch");
        };
        assert_eq!(expected, &vec!["expected line".to_string()]);
        assert_eq!(actual, &vec!["actual line".to_string()]);
        assert!(report.failure_detail().unwrap().contains("expected line"));
    }

    #[test]
    fn test_create_fails_when_target_exists() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "b.py", "already here\n");

        let diff = "\
--- /dev/null
+++ b/b.py
@@ -0,0 +1,1 @@
+new content
";
        let doc = parse_diff(diff).unwrap();
        let report = applier(&dir).apply(&doc, ApplyMode::Apply).unwrap();

        assert!(!report.success);
        assert!(matches!(
            report.files[0].outcome,
            FileOutcome::Rejected {
                reason: RejectReason::AlreadyExists { .. }
            }
        ));
        assert_eq!(
            fs::read_to_string(dir.path().join("b.py")).unwrap(),
            "already here\n"
        );
    }

    #[test]
    fn test_delete_removes_file() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "old.py", "first\nsecond\n");

        let diff = "\
--- a/old.py
+++ /dev/null
@@ -1,2 +0,0 @@
-first
-second
";
        let doc = parse_diff(diff).unwrap();
        let report = applier(&dir).apply(&doc, ApplyMode::Apply).unwrap();

        assert!(report.success);
        assert!(!dir.path().join("old.py").exists());
    }

    #[test]
    fn test_delete_missing_file_rejected() {
        let dir = TempDir::new().unwrap();

        let diff = "\
--- a/ghost.py
+++ /dev/null
@@ -1,1 +0,0 @@
-anything
";
        let doc = parse_diff(diff).unwrap();
        let report = applier(&dir).apply(&doc, ApplyMode::Apply).unwrap();

        assert!(!report.success);
        assert!(matches!(
            report.files[0].outcome,
            FileOutcome::Rejected {
                reason: RejectReason::FileNotFound { .. }
            }
        ));
    }

    #[test]
    fn test_write_failure_rolls_back_earlier_writes() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "a.py", "x = 1\n");
        // A regular file sits where the second target needs a directory, so
        // its write fails after the first file has already been written
        setup_test_file(dir.path(), "blocked", "not a directory\n");

        let diff = "\
--- a/a.py
+++ b/a.py
@@ -1,1 +1,1 @@
-x = 1
+x = 2
--- /dev/null
+++ b/blocked/new.py
@@ -0,0 +1,1 @@
+created = True
";
        let doc = parse_diff(diff).unwrap();
        let result = applier(&dir).apply(&doc, ApplyMode::Apply);

        assert!(matches!(result, Err(ApplyError::Write { .. })));
        // The first write landed and was then rolled back
        assert_eq!(
            fs::read_to_string(dir.path().join("a.py")).unwrap(),
            "x = 1\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("blocked")).unwrap(),
            "not a directory\n"
        );
        assert!(!dir.path().join("blocked/new.py").exists());
    }

    #[test]
    fn test_dry_run_never_writes() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "a.py", "x = 1\n");

        let diff = "\
--- a/a.py
+++ b/a.py
@@ -1,1 +1,1 @@
-x = 1
+x = 2
--- /dev/null
+++ b/b.py
@@ -0,0 +1,1 @@
+created = True
";
        let doc = parse_diff(diff).unwrap();
        let report = applier(&dir).apply(&doc, ApplyMode::DryRun).unwrap();

        assert!(report.success);
        assert_eq!(fs::read_to_string(dir.path().join("a.py")).unwrap(), "x = 1\n");
        assert!(!dir.path().join("b.py").exists());

        // Validation failure in dry-run is just as pure
        fs::write(dir.path().join("a.py"), "changed\n").unwrap();
        let report = applier(&dir).apply(&doc, ApplyMode::DryRun).unwrap();
        assert!(!report.success);
        assert_eq!(
            fs::read_to_string(dir.path().join("a.py")).unwrap(),
            "changed\n"
        );
    }

    #[test]
    fn test_path_escape_is_fatal() {
        let dir = TempDir::new().unwrap();

        let diff = "\
--- a/../outside.txt
+++ b/../outside.txt
@@ -1,1 +1,1 @@
-a
+b
";
        let doc = parse_diff(diff).unwrap();
        let result = applier(&dir).apply(&doc, ApplyMode::Apply);

        assert!(matches!(
            result,
            Err(ApplyError::SecurityViolation { .. })
        ));
    }

    #[test]
    fn test_missing_base_dir_is_fatal() {
        let applier = PatchApplier::new(Path::new("/nonexistent/base/dir"), ApplierConfig::default());
        let doc = parse_diff("--- a/f\n+++ b/f\n@@ -1,1 +1,1 @@\n-a\n+b\n").unwrap();

        assert!(matches!(
            applier.apply(&doc, ApplyMode::Apply),
            Err(ApplyError::BaseDirMissing { .. })
        ));
    }

    #[test]
    fn test_drift_within_window() {
        let dir = TempDir::new().unwrap();
        // Two lines were prepended after the diff was generated
        setup_test_file(
            dir.path(),
            "f.txt",
            "added one\nadded two\nalpha\nbeta\ngamma\n",
        );

        let diff = "\
--- a/f.txt
+++ b/f.txt
@@ -1,3 +1,3 @@
 alpha
-beta
+BETA
 gamma
";
        let doc = parse_diff(diff).unwrap();
        let report = applier(&dir).apply(&doc, ApplyMode::Apply).unwrap();

        assert!(report.success);
        assert_eq!(
            fs::read_to_string(dir.path().join("f.txt")).unwrap(),
            "added one\nadded two\nalpha\nBETA\ngamma\n"
        );
    }

    #[test]
    fn test_drift_beyond_window_rejected() {
        let dir = TempDir::new().unwrap();
        let mut content = String::new();
        for i in 0..10 {
            content.push_str(&format!("filler {}\n", i));
        }
        content.push_str("alpha\nbeta\n");
        setup_test_file(dir.path(), "f.txt", &content);

        let diff = "\
--- a/f.txt
+++ b/f.txt
@@ -1,2 +1,2 @@
 alpha
-beta
+BETA
";
        let doc = parse_diff(diff).unwrap();
        let report = applier(&dir).apply(&doc, ApplyMode::Apply).unwrap();

        assert!(!report.success);
    }

    #[test]
    fn test_multiple_hunks_track_offset() {
        let dir = TempDir::new().unwrap();
        setup_test_file(
            dir.path(),
            "f.txt",
            "one\ntwo\nthree\nfour\nfive\nsix\nseven\n",
        );

        let diff = "\
--- a/f.txt
+++ b/f.txt
@@ -1,2 +1,4 @@
 one
+one point five
+one point six
 two
@@ -6,2 +8,2 @@
 six
-seven
+SEVEN
";
        let doc = parse_diff(diff).unwrap();
        let report = applier(&dir).apply(&doc, ApplyMode::Apply).unwrap();

        assert!(report.success);
        assert_eq!(
            fs::read_to_string(dir.path().join("f.txt")).unwrap(),
            "one\none point five\none point six\ntwo\nthree\nfour\nfive\nsix\nSEVEN\n"
        );
    }

    #[test]
    fn test_no_newline_at_eof() {
        let dir = TempDir::new().unwrap();
        setup_test_file(dir.path(), "f.txt", "keep\nlast");

        let diff = "\
--- a/f.txt
+++ b/f.txt
@@ -1,2 +1,2 @@
 keep
-last
\\ No newline at end of file
+final
\\ No newline at end of file
";
        let doc = parse_diff(diff).unwrap();
        let report = applier(&dir).apply(&doc, ApplyMode::Apply).unwrap();

        assert!(report.success);
        assert_eq!(
            fs::read_to_string(dir.path().join("f.txt")).unwrap(),
            "keep\nfinal"
        );
    }

    #[test]
    fn test_round_trip_random_edits() {
        use rand::Rng;

        let mut rng = rand::rng();

        for _ in 0..25 {
            // Random original file
            let a: Vec<String> = (0..rng.random_range(1..30))
                .map(|i| format!("line {} {}", i, rng.random_range(0..1000)))
                .collect();

            // Random edit: replace a slice of A with random new lines
            let start = rng.random_range(0..a.len());
            let removed = rng.random_range(0..=(a.len() - start));
            let added: Vec<String> = (0..rng.random_range(0..5))
                .map(|i| format!("new {} {}", i, rng.random_range(0..1000)))
                .collect();

            let mut b = a[..start].to_vec();
            b.extend(added.clone());
            b.extend(a[start + removed..].iter().cloned());

            // Whole-file hunk between A and B
            let mut body = String::new();
            for line in &a {
                body.push_str(&format!("-{}\n", line));
            }
            for line in &b {
                body.push_str(&format!("+{}\n", line));
            }
            let diff = format!(
                "--- a/f.txt\n+++ b/f.txt\n@@ -1,{} +1,{} @@\n{}",
                a.len(),
                b.len(),
                body
            );

            let dir = TempDir::new().unwrap();
            setup_test_file(dir.path(), "f.txt", &format!("{}\n", a.join("\n")));

            let doc = parse_diff(&diff).unwrap();
            let report = applier(&dir).apply(&doc, ApplyMode::Apply).unwrap();
            assert!(report.success, "apply failed for generated diff:\n{}", diff);

            let expected = if b.is_empty() {
                String::new()
            } else {
                format!("{}\n", b.join("\n"))
            };
            assert_eq!(
                fs::read_to_string(dir.path().join("f.txt")).unwrap(),
                expected
            );
        }
    }
}
