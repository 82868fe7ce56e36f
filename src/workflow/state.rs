//! Feature run state

use crate::patch::applier::ApplyReport;
use crate::testrun::report::TestSummary;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Phases a feature run moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Planning,
    GeneratingDiff,
    Applying,
    GeneratingTests,
    RunningTests,
    Retrying,
    Success,
    Failed,
    FatalError,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Planning => "PLANNING",
            Phase::GeneratingDiff => "GENERATING_DIFF",
            Phase::Applying => "APPLYING",
            Phase::GeneratingTests => "GENERATING_TESTS",
            Phase::RunningTests => "RUNNING_TESTS",
            Phase::Retrying => "RETRYING",
            Phase::Success => "SUCCESS",
            Phase::Failed => "FAILED",
            Phase::FatalError => "FATAL_ERROR",
        };
        write!(f, "{}", name)
    }
}

/// Terminal status of a feature run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    /// Retry budget exhausted
    Failed,
    /// Aborted on a non-recoverable error
    FatalError,
}

/// Immutable record of one generation attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub index: u32,
    /// The diff the generator produced, if generation got that far
    pub diff_text: Option<String>,
    /// Apply outcome, if the diff parsed
    pub apply: Option<ApplyReport>,
    /// Test results, if tests ran
    pub test_summary: Option<TestSummary>,
    /// What went wrong, for recoverable failures
    pub error: Option<String>,
}

/// A feature request to run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Natural-language description of the change
    pub description: String,
    /// Files the change is expected to touch, relative to the base directory
    #[serde(default)]
    pub target_files: Vec<PathBuf>,
    /// Working tree the change applies to; empty means the invocation directory
    #[serde(default)]
    pub base_directory: PathBuf,
    /// Extra attempts after the first; `None` uses the engine default
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl FeatureSpec {
    /// Target files as a set, for overlap scheduling
    pub fn target_set(&self) -> BTreeSet<PathBuf> {
        self.target_files.iter().cloned().collect()
    }
}

/// Mutable state of a feature run while the engine drives it
#[derive(Debug)]
pub struct FeatureRun {
    pub spec: FeatureSpec,
    pub phase: Phase,
    attempts: Vec<AttemptRecord>,
    log: Vec<String>,
    status: Option<RunStatus>,
}

impl FeatureRun {
    pub fn new(spec: FeatureSpec) -> Self {
        let mut run = Self {
            spec,
            phase: Phase::Planning,
            attempts: Vec::new(),
            log: Vec::new(),
            status: None,
        };
        let line = format!("run started: {}", run.spec.description);
        run.log_line(line);
        run
    }

    /// Move to a new phase, appending one log line
    pub fn transition(&mut self, phase: Phase) {
        tracing::info!(from = %self.phase, to = %phase, "phase transition");
        self.log_line(format!("{} -> {}", self.phase, phase));
        self.phase = phase;
    }

    /// Append a free-form note to the run log
    pub fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(%message, "run note");
        self.log_line(message);
    }

    fn log_line(&mut self, message: String) {
        let stamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        self.log.push(format!("[{}] {}", stamp, message));
    }

    pub fn push_attempt(&mut self, attempt: AttemptRecord) {
        self.attempts.push(attempt);
    }

    /// Set the terminal status. Later calls are ignored; the first verdict
    /// stands.
    pub fn finish(&mut self, status: RunStatus) {
        if self.status.is_some() {
            return;
        }
        self.transition(match status {
            RunStatus::Success => Phase::Success,
            RunStatus::Failed => Phase::Failed,
            RunStatus::FatalError => Phase::FatalError,
        });
        self.status = Some(status);
    }

    pub fn into_outcome(self) -> FeatureOutcome {
        let final_summary = self
            .attempts
            .iter()
            .rev()
            .find_map(|a| a.test_summary.clone());
        FeatureOutcome {
            status: self.status.unwrap_or(RunStatus::Failed),
            attempts: self.attempts,
            final_summary,
            log: self.log,
        }
    }
}

/// Result of a completed feature run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureOutcome {
    pub status: RunStatus,
    pub attempts: Vec<AttemptRecord>,
    /// Test summary of the last attempt that ran tests
    pub final_summary: Option<TestSummary>,
    /// Chronological transition log
    pub log: Vec<String>,
}

impl FeatureOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Success
    }
}
