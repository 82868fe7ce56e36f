//! Unified diff parsing and transactional application
//!
//! This module handles:
//! - Parsing strict unified diffs into a structured [`parser::DiffDocument`]
//! - Validating and applying multi-file documents atomically
//! - Backing up touched files and rolling back on write failure
//! - Bounded contextual search when line numbers have drifted

pub mod applier;
pub mod backup;
pub mod parser;
