//! Test output parsing
//!
//! Runner output is matched against a fixed, ordered list of format
//! adapters. The first adapter whose gate pattern recognizes the output
//! parses it; when none match, the exit code decides the verdict.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// How the test run itself went, independent of pass/fail counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Commands ran to completion; counts reflect real test results
    Completed,
    /// The runner could not execute or recognize the suite
    InfrastructureFailure,
    /// A command exceeded its time limit and was killed
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    pub name: String,
    pub detail: Option<String>,
}

/// One executed command and its exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRun {
    pub command: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

/// Aggregated result of a test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures: Vec<TestFailure>,
    pub coverage: Option<f64>,
    pub status: ExecutionStatus,
    pub runs: Vec<CommandRun>,
}

impl Default for TestSummary {
    fn default() -> Self {
        Self {
            total: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            failures: Vec::new(),
            coverage: None,
            status: ExecutionStatus::Completed,
            runs: Vec::new(),
        }
    }
}

impl TestSummary {
    pub fn infrastructure(detail: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::InfrastructureFailure,
            failures: vec![TestFailure {
                name: "<runner>".to_string(),
                detail: Some(detail.into()),
            }],
            ..Self::default()
        }
    }

    pub fn all_passed(&self) -> bool {
        self.status == ExecutionStatus::Completed && self.failed == 0
    }

    pub fn failing_names(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.name.clone()).collect()
    }

    /// Fold another command's summary into this one. Counts add up and the
    /// worst execution status wins.
    pub fn merge(&mut self, other: TestSummary) {
        self.total += other.total;
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
        if other.coverage.is_some() {
            self.coverage = other.coverage;
        }
        self.status = self.status.max(other.status);
        self.runs.extend(other.runs);
    }
}

/// Output format adapters, tried in order. Cargo comes before pytest because
/// its result line also contains "N passed" and would satisfy the looser
/// pytest count patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatAdapter {
    CargoTest,
    Pytest,
    CountsLine,
}

pub const ADAPTERS: &[FormatAdapter] = &[
    FormatAdapter::CargoTest,
    FormatAdapter::Pytest,
    FormatAdapter::CountsLine,
];

impl FormatAdapter {
    /// Parse `output` if it looks like this adapter's format.
    pub fn try_parse(&self, output: &str) -> Option<TestSummary> {
        match self {
            FormatAdapter::CargoTest => parse_cargo(output),
            FormatAdapter::Pytest => parse_pytest(output),
            FormatAdapter::CountsLine => parse_counts_line(output),
        }
    }
}

fn parse_cargo(output: &str) -> Option<TestSummary> {
    if !output.contains("test result:") {
        return None;
    }

    let result_re = Regex::new(
        r"test result: (?:ok|FAILED)\. (\d+) passed; (\d+) failed; (\d+) ignored",
    )
    .unwrap();
    let failed_test_re = Regex::new(r"(?m)^test (\S+) \.\.\. FAILED").unwrap();

    let mut summary = TestSummary::default();
    let mut result_lines = 0;
    // A workspace run prints one result line per crate
    for caps in result_re.captures_iter(output) {
        summary.passed += caps[1].parse::<usize>().ok()?;
        summary.failed += caps[2].parse::<usize>().ok()?;
        summary.skipped += caps[3].parse::<usize>().ok()?;
        result_lines += 1;
    }
    if result_lines == 0 {
        // The gate text appeared but no counts did; let the exit code decide
        return None;
    }
    summary.total = summary.passed + summary.failed + summary.skipped;

    for caps in failed_test_re.captures_iter(output) {
        summary.failures.push(TestFailure {
            name: caps[1].to_string(),
            detail: None,
        });
    }
    Some(summary)
}

fn parse_pytest(output: &str) -> Option<TestSummary> {
    let gate_re = Regex::new(r"[=\s](?:passed|failed|skipped|error).* in \d+\.\d+s").unwrap();
    if !gate_re.is_match(output) {
        return None;
    }

    let count = |pattern: &str| {
        Regex::new(pattern)
            .unwrap()
            .captures(output)
            .and_then(|c| c[1].parse::<usize>().ok())
            .unwrap_or(0)
    };

    let errors = count(r"(\d+) errors?");
    let mut summary = TestSummary {
        passed: count(r"(\d+) passed"),
        failed: count(r"(\d+) failed"),
        skipped: count(r"(\d+) skipped"),
        ..TestSummary::default()
    };
    summary.total = summary.passed + summary.failed + summary.skipped;
    if summary.total == 0 && errors == 0 {
        // Nothing actually ran; let the exit code decide
        return None;
    }
    if errors > 0 {
        // Collection or setup errors mean part of the suite never executed
        summary.status = ExecutionStatus::InfrastructureFailure;
        summary.failures.push(TestFailure {
            name: "<runner>".to_string(),
            detail: Some(format!("{} error(s) during collection or setup", errors)),
        });
    }

    let failed_test_re = Regex::new(r"(?m)^FAILED (\S+)(?: - (.*))?$").unwrap();
    for caps in failed_test_re.captures_iter(output) {
        summary.failures.push(TestFailure {
            name: caps[1].to_string(),
            detail: caps.get(2).map(|m| m.as_str().to_string()),
        });
    }

    let coverage_re = Regex::new(r"TOTAL\s+\d+\s+\d+\s+(\d+(?:\.\d+)?)%").unwrap();
    summary.coverage = coverage_re
        .captures(output)
        .and_then(|c| c[1].parse::<f64>().ok());

    Some(summary)
}

fn parse_counts_line(output: &str) -> Option<TestSummary> {
    // jest-style "Tests: 2 failed, 10 passed, 12 total"
    let jest_re = Regex::new(
        r"Tests:\s+(?:(\d+) failed, )?(?:(\d+) skipped, )?(\d+) passed, (\d+) total",
    )
    .unwrap();
    if let Some(caps) = jest_re.captures(output) {
        let num = |i: usize| {
            caps.get(i)
                .and_then(|m| m.as_str().parse::<usize>().ok())
                .unwrap_or(0)
        };
        return Some(TestSummary {
            failed: num(1),
            skipped: num(2),
            passed: num(3),
            total: num(4),
            ..TestSummary::default()
        });
    }

    let passed_re = Regex::new(r"(\d+) (?:tests? )?passed").unwrap();
    let failed_re = Regex::new(r"(\d+) (?:tests? )?failed").unwrap();
    let passed = passed_re.captures(output);
    let failed = failed_re.captures(output);
    if passed.is_none() && failed.is_none() {
        return None;
    }

    let mut summary = TestSummary {
        passed: passed.and_then(|c| c[1].parse().ok()).unwrap_or(0),
        failed: failed.and_then(|c| c[1].parse().ok()).unwrap_or(0),
        ..TestSummary::default()
    };
    summary.total = summary.passed + summary.failed;
    Some(summary)
}

/// Classify one command's output. Recognized formats yield real counts;
/// otherwise exit code 0 means success with unknown counts and a non-zero
/// exit is an infrastructure failure rather than a test assertion failure.
pub fn classify_output(output: &str, exit_code: Option<i32>) -> TestSummary {
    for adapter in ADAPTERS {
        if let Some(summary) = adapter.try_parse(output) {
            return summary;
        }
    }

    match exit_code {
        Some(0) => TestSummary::default(),
        code => {
            let detail = match code {
                Some(c) => format!("unrecognized test output, exit code {}", c),
                None => "unrecognized test output, killed by signal".to_string(),
            };
            TestSummary::infrastructure(detail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pytest_mixed_counts() {
        let output = "\
FAILED tests/test_api.py::test_create - AssertionError: expected 201
FAILED tests/test_api.py::test_delete
============ 2 failed, 13 passed, 1 skipped in 4.21s ============
";
        let summary = classify_output(output, Some(1));
        assert_eq!(summary.total, 16);
        assert_eq!(summary.passed, 13);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.status, ExecutionStatus::Completed);
        assert_eq!(
            summary.failing_names(),
            vec!["tests/test_api.py::test_create", "tests/test_api.py::test_delete"]
        );
        assert_eq!(
            summary.failures[0].detail.as_deref(),
            Some("AssertionError: expected 201")
        );
        assert!(!summary.all_passed());
    }

    #[test]
    fn test_pytest_counts_without_skips() {
        let summary = classify_output("=== 2 failed, 13 passed in 1.10s ===\n", Some(1));
        assert_eq!(summary.total, 15);
        assert_eq!(summary.passed, 13);
        assert_eq!(summary.failed, 2);
    }

    #[test]
    fn test_pytest_error_only_run_is_infrastructure_failure() {
        // A collection error run reports zero tests; it must not read as green
        let summary = classify_output("==== 1 error in 0.12s ====\n", Some(2));
        assert_eq!(summary.status, ExecutionStatus::InfrastructureFailure);
        assert!(!summary.all_passed());
    }

    #[test]
    fn test_pytest_errors_alongside_passes_not_green() {
        let summary = classify_output("=== 2 passed, 1 error in 0.54s ===\n", Some(1));
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.status, ExecutionStatus::InfrastructureFailure);
        assert!(!summary.all_passed());
    }

    #[test]
    fn test_cargo_gate_without_result_counts_falls_through() {
        // "test result:" prose with no parseable counts must defer to the exit code
        let summary = classify_output("error: test result: borked\n", Some(101));
        assert_eq!(summary.status, ExecutionStatus::InfrastructureFailure);
        assert!(!summary.all_passed());
    }

    #[test]
    fn test_pytest_all_passed_with_coverage() {
        let output = "\
============ 15 passed in 2.03s ============
Name           Stmts   Miss  Cover
----------------------------------
TOTAL            210     21  90.0%
";
        let summary = classify_output(output, Some(0));
        assert_eq!(summary.passed, 15);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.coverage, Some(90.0));
        assert!(summary.all_passed());
    }

    #[test]
    fn test_cargo_test_output() {
        let output = "\
running 3 tests
test parser::tests::test_basic ... ok
test parser::tests::test_hunks ... FAILED
test applier::tests::test_apply ... ok

test result: FAILED. 2 passed; 1 failed; 0 ignored; 0 measured; 0 filtered out
";
        let summary = classify_output(output, Some(101));
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.failing_names(), vec!["parser::tests::test_hunks"]);
    }

    #[test]
    fn test_cargo_workspace_sums_result_lines() {
        let output = "\
test result: ok. 4 passed; 0 failed; 1 ignored; 0 measured; 0 filtered out
test result: ok. 7 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out
";
        let summary = classify_output(output, Some(0));
        assert_eq!(summary.passed, 11);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.total, 12);
        assert!(summary.all_passed());
    }

    #[test]
    fn test_cargo_not_misread_as_pytest() {
        let output = "test result: ok. 5 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out\n";
        let summary = FormatAdapter::CargoTest.try_parse(output).unwrap();
        assert_eq!(summary.passed, 5);
        // The pytest gate must not claim this line
        assert!(FormatAdapter::Pytest.try_parse(output).is_none());
    }

    #[test]
    fn test_jest_counts_line() {
        let output = "\
Tests:       2 failed, 10 passed, 12 total
Snapshots:   0 total
Time:        3.4 s
";
        let summary = classify_output(output, Some(1));
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.passed, 10);
        assert_eq!(summary.total, 12);
    }

    #[test]
    fn test_generic_counts_line() {
        let summary = classify_output("Ran suite: 8 tests passed, 0 tests failed\n", Some(0));
        assert_eq!(summary.passed, 8);
        assert_eq!(summary.failed, 0);
        assert!(summary.all_passed());
    }

    #[test]
    fn test_unrecognized_zero_exit_passes_with_unknown_counts() {
        let summary = classify_output("everything looks fine\n", Some(0));
        assert_eq!(summary.total, 0);
        assert!(summary.all_passed());
    }

    #[test]
    fn test_unrecognized_nonzero_exit_is_infrastructure_failure() {
        let summary = classify_output("sh: pytest: command not found\n", Some(127));
        assert_eq!(summary.status, ExecutionStatus::InfrastructureFailure);
        assert!(!summary.all_passed());
        assert!(summary.failures[0]
            .detail
            .as_deref()
            .unwrap()
            .contains("127"));
    }

    #[test]
    fn test_merge_takes_worst_status_and_sums_counts() {
        let mut a = TestSummary {
            total: 3,
            passed: 3,
            ..TestSummary::default()
        };
        let b = TestSummary {
            total: 2,
            passed: 1,
            failed: 1,
            status: ExecutionStatus::TimedOut,
            failures: vec![TestFailure {
                name: "slow_test".to_string(),
                detail: None,
            }],
            ..TestSummary::default()
        };
        a.merge(b);
        assert_eq!(a.total, 5);
        assert_eq!(a.passed, 4);
        assert_eq!(a.failed, 1);
        assert_eq!(a.status, ExecutionStatus::TimedOut);
        assert_eq!(a.failing_names(), vec!["slow_test"]);
    }
}
