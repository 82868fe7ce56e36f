//! Concurrent batch execution
//!
//! Features whose target-file sets overlap must not race on the same tree
//! paths, so they are serialized in input order within one task; disjoint
//! groups run concurrently. Results come back in input order.

use super::engine::WorkflowEngine;
use super::state::{FeatureOutcome, FeatureSpec, RunStatus};
use crate::generator::Generator;
use tokio::task::JoinSet;

impl<G: Generator + 'static> WorkflowEngine<G> {
    pub async fn run_batch(&self, specs: Vec<FeatureSpec>) -> Vec<FeatureOutcome> {
        let groups = group_by_overlap(&specs);
        let total = specs.len();
        tracing::info!(features = total, groups = groups.len(), "running batch");

        let mut specs: Vec<Option<FeatureSpec>> = specs.into_iter().map(Some).collect();
        let mut tasks = JoinSet::new();

        for group in groups {
            let engine = self.clone();
            let batch: Vec<(usize, FeatureSpec)> = group
                .iter()
                .map(|&i| (i, specs[i].take().unwrap_or_else(FeatureSpec::placeholder)))
                .collect();

            tasks.spawn(async move {
                let mut outcomes = Vec::with_capacity(batch.len());
                for (index, spec) in batch {
                    outcomes.push((index, engine.run_feature(spec).await));
                }
                outcomes
            });
        }

        let mut results: Vec<Option<FeatureOutcome>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcomes) => {
                    for (index, outcome) in outcomes {
                        results[index] = Some(outcome);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "batch task failed");
                }
            }
        }

        results
            .into_iter()
            .map(|slot| slot.unwrap_or_else(aborted_outcome))
            .collect()
    }
}

impl FeatureSpec {
    fn placeholder() -> Self {
        Self {
            description: String::new(),
            target_files: Vec::new(),
            base_directory: std::path::PathBuf::new(),
            max_retries: Some(0),
        }
    }
}

/// Outcome for a feature whose task never reported back
fn aborted_outcome() -> FeatureOutcome {
    FeatureOutcome {
        status: RunStatus::FatalError,
        attempts: Vec::new(),
        final_summary: None,
        log: vec!["run aborted: batch task failed".to_string()],
    }
}

/// Partition feature indices into groups whose target-file sets overlap,
/// transitively. Group members keep their input order.
pub(crate) fn group_by_overlap(specs: &[FeatureSpec]) -> Vec<Vec<usize>> {
    let sets: Vec<_> = specs.iter().map(|s| s.target_set()).collect();
    let mut groups: Vec<(std::collections::BTreeSet<std::path::PathBuf>, Vec<usize>)> = Vec::new();

    for (index, set) in sets.iter().enumerate() {
        // Collect every existing group this feature touches
        let (touching, mut rest): (Vec<_>, Vec<_>) = groups
            .drain(..)
            .partition(|(paths, _)| !paths.is_disjoint(set));

        let mut merged_paths = set.clone();
        let mut merged_members = Vec::new();
        for (paths, members) in touching {
            merged_paths.extend(paths);
            merged_members.extend(members);
        }
        merged_members.push(index);
        merged_members.sort_unstable();

        rest.push((merged_paths, merged_members));
        groups = rest;
    }

    groups.sort_by_key(|(_, members)| members[0]);
    groups.into_iter().map(|(_, members)| members).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{FileContext, GeneratorError};
    use crate::workflow::engine::EngineConfig;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn spec_for(files: &[&str], dir: &std::path::Path) -> FeatureSpec {
        FeatureSpec {
            description: format!("touch {}", files.join(",")),
            target_files: files.iter().map(PathBuf::from).collect(),
            base_directory: dir.to_path_buf(),
            max_retries: Some(0),
        }
    }

    #[test]
    fn test_disjoint_specs_get_own_groups() {
        let dir = PathBuf::from(".");
        let specs = vec![
            spec_for(&["a.py"], &dir),
            spec_for(&["b.py"], &dir),
            spec_for(&["c.py"], &dir),
        ];
        assert_eq!(group_by_overlap(&specs), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_overlapping_specs_share_a_group() {
        let dir = PathBuf::from(".");
        let specs = vec![
            spec_for(&["a.py", "shared.py"], &dir),
            spec_for(&["b.py"], &dir),
            spec_for(&["shared.py", "c.py"], &dir),
        ];
        assert_eq!(group_by_overlap(&specs), vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn test_transitive_overlap_merges_groups() {
        let dir = PathBuf::from(".");
        // 0 and 1 are disjoint until 2 bridges them
        let specs = vec![
            spec_for(&["a.py"], &dir),
            spec_for(&["b.py"], &dir),
            spec_for(&["a.py", "b.py"], &dir),
        ];
        assert_eq!(group_by_overlap(&specs), vec![vec![0, 1, 2]]);
    }

    /// Generator that turns "set <file> to <n>" descriptions into diffs
    struct ScriptedGenerator;

    #[async_trait]
    impl crate::generator::Generator for ScriptedGenerator {
        async fn generate_diff(
            &self,
            prompt: &str,
            files: &[FileContext],
        ) -> Result<String, GeneratorError> {
            let file = files
                .first()
                .ok_or_else(|| GeneratorError::service("no file context"))?;
            // Bump the single integer in the file
            let current: u32 = file
                .content
                .trim()
                .parse()
                .map_err(|_| GeneratorError::service("unexpected content"))?;
            let _ = prompt;
            Ok(format!(
                "--- a/{p}\n+++ b/{p}\n@@ -1,1 +1,1 @@\n-{old}\n+{new}\n",
                p = file.path.display(),
                old = current,
                new = current + 1
            ))
        }

        async fn generate_tests(
            &self,
            _prompt: &str,
            _diff: &str,
        ) -> Result<String, GeneratorError> {
            Err(GeneratorError::service("none"))
        }

        async fn generate_test_commands(
            &self,
            _project_listing: &str,
        ) -> Result<String, GeneratorError> {
            Ok(r#"{"commands": ["true"]}"#.to_string())
        }
    }

    #[tokio::test]
    async fn test_batch_returns_results_in_input_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "1\n").unwrap();
        std::fs::write(dir.path().join("b.txt"), "1\n").unwrap();

        let engine = WorkflowEngine::new(Arc::new(ScriptedGenerator), EngineConfig::default());
        let specs = vec![
            spec_for(&["a.txt"], dir.path()),
            spec_for(&["b.txt"], dir.path()),
            // Overlaps the first, so it runs after it and sees its edit
            spec_for(&["a.txt"], dir.path()),
        ];

        let outcomes = engine.run_batch(specs).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.succeeded()));
        // Both features against a.txt applied, in order
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "3\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("b.txt")).unwrap(),
            "2\n"
        );
    }
}
