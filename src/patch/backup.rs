//! Attempt-scoped backups for transactional patch application
//!
//! Pre-images are held in memory and scoped to exactly one apply attempt:
//! committed on success (discarding the captured state) or rolled back on any
//! failure, restoring every captured path including removing paths that did
//! not exist before the attempt.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors during rollback
#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("partial rollback: {restored} paths restored, {} failed", failed.len())]
    Partial {
        restored: usize,
        failed: Vec<(PathBuf, String)>,
    },
}

/// Pre-images of every path one apply attempt will touch.
///
/// `None` records that the path did not exist before the attempt.
#[derive(Debug, Default)]
pub struct Backup {
    entries: Vec<(PathBuf, Option<Vec<u8>>)>,
    rolled_back: bool,
}

impl Backup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the pre-image of a path. The first capture wins; capturing the
    /// same path again is a no-op so later writes cannot clobber the original.
    pub fn capture(&mut self, path: &Path) -> io::Result<()> {
        if self.entries.iter().any(|(p, _)| p == path) {
            return Ok(());
        }

        // A path under a non-directory did not exist before the attempt either
        let pre_image = match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) if absent(&e) => None,
            Err(e) => return Err(e),
        };

        self.entries.push((path.to_path_buf(), pre_image));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Discard the captured state. Call only after the last write succeeded.
    pub fn commit(self) {}

    /// Restore every captured path to its pre-image, removing paths that were
    /// absent before the attempt. Idempotent: a second call is a no-op.
    pub fn rollback(&mut self) -> Result<(), RollbackError> {
        if self.rolled_back {
            return Ok(());
        }

        let mut restored = 0;
        let mut failed = Vec::new();

        for (path, pre_image) in &self.entries {
            let result = match pre_image {
                Some(bytes) => {
                    if let Some(parent) = path.parent() {
                        let _ = fs::create_dir_all(parent);
                    }
                    fs::write(path, bytes)
                }
                None => match fs::remove_file(path) {
                    Err(e) if absent(&e) => Ok(()),
                    other => other,
                },
            };

            match result {
                Ok(()) => restored += 1,
                Err(e) => failed.push((path.clone(), e.to_string())),
            }
        }

        if failed.is_empty() {
            self.rolled_back = true;
            Ok(())
        } else {
            Err(RollbackError::Partial { restored, failed })
        }
    }
}

fn absent(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}
