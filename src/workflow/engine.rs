//! Feature workflow engine
//!
//! Drives one feature request through planning, diff generation, transactional
//! apply, test generation, and test execution, retrying with failure context
//! under a bounded budget. Recoverable failures consume an attempt; fatal
//! errors end the run immediately.

use super::state::{AttemptRecord, FeatureOutcome, FeatureRun, FeatureSpec, Phase, RunStatus};
use crate::generator::output::parse_test_plan;
use crate::generator::{FileContext, Generator, GeneratorError, TestPlan};
use crate::patch::applier::{ApplierConfig, ApplyMode, PatchApplier};
use crate::patch::parser::parse_diff;
use crate::testrun::report::{ExecutionStatus, TestSummary};
use crate::testrun::runner::run_commands;
use std::fmt::Write as _;
use std::fs;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Engine tunables
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default retry budget when a spec does not set one
    pub max_retries: u32,
    /// Time budget per generator call
    pub generation_timeout: Duration,
    /// Time budget per test command
    pub test_timeout: Duration,
    /// Pause between attempts; zero disables it
    pub retry_delay: Duration,
    /// Add up to 25% jitter to the retry delay
    pub jitter: bool,
    pub applier: ApplierConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            generation_timeout: Duration::from_secs(120),
            test_timeout: Duration::from_secs(300),
            retry_delay: Duration::ZERO,
            jitter: true,
            applier: ApplierConfig::default(),
        }
    }
}

enum AttemptVerdict {
    Success,
    Recoverable {
        failure: String,
        diff: Option<String>,
        failing: Vec<String>,
    },
    Fatal(String),
}

/// Runs feature requests against a working tree.
pub struct WorkflowEngine<G> {
    generator: Arc<G>,
    config: EngineConfig,
}

impl<G> Clone for WorkflowEngine<G> {
    fn clone(&self) -> Self {
        Self {
            generator: Arc::clone(&self.generator),
            config: self.config.clone(),
        }
    }
}

impl<G: Generator> WorkflowEngine<G> {
    pub fn new(generator: Arc<G>, config: EngineConfig) -> Self {
        Self { generator, config }
    }

    /// Run one feature to a terminal status.
    ///
    /// `max_retries = N` allows at most `N + 1` generation attempts.
    pub async fn run_feature(&self, spec: FeatureSpec) -> FeatureOutcome {
        let mut run = FeatureRun::new(spec);

        if !run.spec.base_directory.is_dir() {
            run.note(format!(
                "base directory missing: {}",
                run.spec.base_directory.display()
            ));
            run.finish(RunStatus::FatalError);
            return run.into_outcome();
        }

        let budget = run.spec.max_retries.unwrap_or(self.config.max_retries);
        let applier = PatchApplier::new(&run.spec.base_directory, self.config.applier.clone());

        // The test plan is obtained once and reused across attempts
        let mut plan: Option<TestPlan> = None;
        let mut prior_failure: Option<String> = None;
        let mut prior_diff: Option<String> = None;
        let mut prior_failing: Vec<String> = Vec::new();

        for attempt in 1..=budget + 1 {
            if attempt > 1 {
                run.transition(Phase::Retrying);
                self.pause_before_retry().await;
            }

            let verdict = self
                .run_attempt(
                    &mut run,
                    attempt,
                    &applier,
                    &mut plan,
                    prior_diff.as_deref(),
                    prior_failure.as_deref(),
                    &prior_failing,
                )
                .await;

            match verdict {
                AttemptVerdict::Success => {
                    run.finish(RunStatus::Success);
                    return run.into_outcome();
                }
                AttemptVerdict::Recoverable {
                    failure,
                    diff,
                    failing,
                } => {
                    prior_failure = Some(failure);
                    if diff.is_some() {
                        prior_diff = diff;
                    }
                    prior_failing = failing;
                }
                AttemptVerdict::Fatal(message) => {
                    run.note(message);
                    run.finish(RunStatus::FatalError);
                    return run.into_outcome();
                }
            }
        }

        run.finish(RunStatus::Failed);
        run.into_outcome()
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_attempt(
        &self,
        run: &mut FeatureRun,
        attempt: u32,
        applier: &PatchApplier,
        plan: &mut Option<TestPlan>,
        prior_diff: Option<&str>,
        prior_failure: Option<&str>,
        prior_failing: &[String],
    ) -> AttemptVerdict {
        let mut record = AttemptRecord {
            index: attempt,
            diff_text: None,
            apply: None,
            test_summary: None,
            error: None,
        };

        if plan.is_none() {
            if run.phase != Phase::Planning {
                run.transition(Phase::Planning);
            }
            let listing = project_listing(&run.spec);
            match self
                .bounded(self.generator.generate_test_commands(&listing))
                .await
            {
                Ok(raw) => {
                    let parsed = parse_test_plan(&raw).unwrap_or_default();
                    if parsed.is_empty() {
                        run.note("planning produced no test commands");
                    } else {
                        run.note(format!(
                            "test plan: {} command(s), framework {}",
                            parsed.commands.len(),
                            parsed.framework.as_deref().unwrap_or("unspecified")
                        ));
                    }
                    *plan = Some(parsed);
                }
                Err(e) => {
                    let failure = format!("planning failed: {}", e);
                    run.note(failure.clone());
                    record.error = Some(failure.clone());
                    run.push_attempt(record);
                    return AttemptVerdict::Recoverable {
                        failure,
                        diff: None,
                        failing: Vec::new(),
                    };
                }
            }
        }

        run.transition(Phase::GeneratingDiff);
        let contexts = read_contexts(&run.spec);
        let prompt = build_diff_prompt(&run.spec, prior_diff, prior_failure, prior_failing);

        let diff_text = match self
            .bounded(self.generator.generate_diff(&prompt, &contexts))
            .await
        {
            Ok(text) => text,
            Err(e) => {
                let failure = format!("diff generation failed: {}", e);
                run.note(failure.clone());
                record.error = Some(failure.clone());
                run.push_attempt(record);
                return AttemptVerdict::Recoverable {
                    failure,
                    diff: None,
                    failing: Vec::new(),
                };
            }
        };
        record.diff_text = Some(diff_text.clone());

        let doc = match parse_diff(&diff_text) {
            Ok(doc) => doc,
            Err(e) => {
                let failure = format!("diff did not parse: {}", e);
                run.note(failure.clone());
                record.error = Some(failure.clone());
                run.push_attempt(record);
                return AttemptVerdict::Recoverable {
                    failure,
                    diff: Some(diff_text),
                    failing: Vec::new(),
                };
            }
        };

        run.transition(Phase::Applying);
        let report = match applier.apply(&doc, ApplyMode::Apply) {
            Ok(report) => report,
            Err(e) => {
                record.error = Some(e.to_string());
                run.push_attempt(record);
                return AttemptVerdict::Fatal(format!("apply aborted: {}", e));
            }
        };
        record.apply = Some(report.clone());

        if !report.success {
            let failure = report
                .failure_detail()
                .unwrap_or_else(|| "patch rejected".to_string());
            run.note(format!("apply rejected: {}", failure));
            record.error = Some(failure.clone());
            run.push_attempt(record);
            return AttemptVerdict::Recoverable {
                failure,
                diff: Some(diff_text),
                failing: Vec::new(),
            };
        }

        // Test generation is best effort; existing tests still gate the change
        run.transition(Phase::GeneratingTests);
        self.generate_and_apply_tests(run, applier, &diff_text).await;

        run.transition(Phase::RunningTests);
        let commands = plan.as_ref().map(TestPlan::all_commands).unwrap_or_default();
        let summary = run_commands(
            &commands,
            &run.spec.base_directory,
            self.config.test_timeout,
        )
        .await;
        record.test_summary = Some(summary.clone());

        if summary.all_passed() {
            run.note(format!(
                "tests passed ({} passed, {} skipped)",
                summary.passed, summary.skipped
            ));
            run.push_attempt(record);
            return AttemptVerdict::Success;
        }

        let failure = describe_test_failure(&summary);
        run.note(failure.clone());
        record.error = Some(failure.clone());
        let failing = summary.failing_names();
        run.push_attempt(record);
        AttemptVerdict::Recoverable {
            failure,
            diff: Some(diff_text),
            failing,
        }
    }

    async fn generate_and_apply_tests(
        &self,
        run: &mut FeatureRun,
        applier: &PatchApplier,
        diff_text: &str,
    ) {
        let prompt = format!(
            "Write tests covering this change to the project: {}",
            run.spec.description
        );
        let raw = match self
            .bounded(self.generator.generate_tests(&prompt, diff_text))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                run.note(format!("test generation skipped: {}", e));
                return;
            }
        };

        let doc = match parse_diff(&raw) {
            Ok(doc) => doc,
            Err(e) => {
                run.note(format!("generated tests did not parse: {}", e));
                return;
            }
        };

        match applier.apply(&doc, ApplyMode::Apply) {
            Ok(report) if report.success => {
                run.note(format!("generated tests applied ({} file(s))", report.files.len()));
            }
            Ok(report) => {
                run.note(format!(
                    "generated tests rejected: {}",
                    report
                        .failure_detail()
                        .unwrap_or_else(|| "unknown".to_string())
                ));
            }
            Err(e) => {
                run.note(format!("generated tests not applied: {}", e));
            }
        }
    }

    async fn bounded<F>(&self, call: F) -> Result<String, GeneratorError>
    where
        F: Future<Output = Result<String, GeneratorError>>,
    {
        match tokio::time::timeout(self.config.generation_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GeneratorError::Timeout(self.config.generation_timeout)),
        }
    }

    async fn pause_before_retry(&self) {
        if self.config.retry_delay.is_zero() {
            return;
        }
        let base = self.config.retry_delay.as_secs_f64();
        let delay = if self.config.jitter {
            // Up to 25% jitter
            base + rand::random::<f64>() * 0.25 * base
        } else {
            base
        };
        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
    }
}

fn project_listing(spec: &FeatureSpec) -> String {
    let mut listing = String::from(
        "Respond with a JSON object naming the test framework and shell commands \
         that run this project's tests.\nProject files:\n",
    );
    for path in &spec.target_files {
        let _ = writeln!(listing, "  {}", path.display());
    }
    listing
}

fn read_contexts(spec: &FeatureSpec) -> Vec<FileContext> {
    spec.target_files
        .iter()
        .filter_map(|path| {
            let content = fs::read_to_string(spec.base_directory.join(path)).ok()?;
            Some(FileContext {
                path: path.clone(),
                content,
            })
        })
        .collect()
}

fn build_diff_prompt(
    spec: &FeatureSpec,
    prior_diff: Option<&str>,
    prior_failure: Option<&str>,
    prior_failing: &[String],
) -> String {
    let mut prompt = format!(
        "Produce a unified diff implementing this change: {}\n",
        spec.description
    );
    if let Some(failure) = prior_failure {
        let _ = writeln!(prompt, "\nThe previous attempt failed: {}", failure);
        if !prior_failing.is_empty() {
            let _ = writeln!(prompt, "Failing tests: {}", prior_failing.join(", "));
        }
        if let Some(diff) = prior_diff {
            let _ = writeln!(prompt, "Previous diff:\n{}", diff);
        }
        prompt.push_str("Produce a corrected diff against the current file contents.\n");
    }
    prompt
}

fn describe_test_failure(summary: &TestSummary) -> String {
    match summary.status {
        ExecutionStatus::TimedOut => "test run timed out".to_string(),
        ExecutionStatus::InfrastructureFailure => {
            let detail = summary
                .failures
                .first()
                .and_then(|f| f.detail.clone())
                .unwrap_or_else(|| "unknown".to_string());
            format!("test run could not execute: {}", detail)
        }
        ExecutionStatus::Completed => {
            let names = summary.failing_names();
            if names.is_empty() {
                format!("{} test(s) failed", summary.failed)
            } else {
                format!("{} test(s) failed: {}", summary.failed, names.join(", "))
            }
        }
    }
}
