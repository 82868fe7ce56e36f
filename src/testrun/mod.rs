//! Test execution and result parsing
//!
//! This module handles:
//! - Running shell test commands with per-command time limits
//! - Parsing known output formats (cargo test, pytest, counts lines)
//! - Falling back to the exit code when output is unrecognized
//! - Aggregating multi-command runs into one [`report::TestSummary`]

pub mod report;
pub mod runner;
