//! Code and test generation seam
//!
//! The workflow engine talks to a [`Generator`], an asynchronous collaborator
//! that turns prompts into unified diffs and test plans. The shipped
//! implementation shells out to an external command; tests substitute mocks.

pub mod command;
pub mod output;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from a generation call
#[derive(Debug, Clone, Error)]
pub enum GeneratorError {
    /// The call exceeded its time budget
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    /// The generation service failed or returned unusable output
    #[error("generation service error: {0}")]
    Service(String),
}

impl GeneratorError {
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service(message.into())
    }
}

/// A file handed to the generator as context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContext {
    pub path: PathBuf,
    pub content: String,
}

/// Test plan produced alongside generated tests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestPlan {
    /// Framework the generator picked, if it said
    pub framework: Option<String>,
    /// Commands to run before the suite (installs, migrations)
    pub setup_commands: Vec<String>,
    /// Commands that run the suite
    pub commands: Vec<String>,
}

impl TestPlan {
    pub fn all_commands(&self) -> Vec<String> {
        self.setup_commands
            .iter()
            .chain(self.commands.iter())
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.setup_commands.is_empty() && self.commands.is_empty()
    }
}

/// Trait for diff and test generators
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce a unified diff implementing the described change
    async fn generate_diff(
        &self,
        prompt: &str,
        files: &[FileContext],
    ) -> Result<String, GeneratorError>;

    /// Produce a unified diff that adds tests for an applied change
    async fn generate_tests(&self, prompt: &str, diff: &str) -> Result<String, GeneratorError>;

    /// Produce a test plan: shell commands that exercise the suite
    async fn generate_test_commands(
        &self,
        project_listing: &str,
    ) -> Result<String, GeneratorError>;
}

#[async_trait]
impl<G: Generator + ?Sized> Generator for Box<G> {
    async fn generate_diff(
        &self,
        prompt: &str,
        files: &[FileContext],
    ) -> Result<String, GeneratorError> {
        (**self).generate_diff(prompt, files).await
    }

    async fn generate_tests(&self, prompt: &str, diff: &str) -> Result<String, GeneratorError> {
        (**self).generate_tests(prompt, diff).await
    }

    async fn generate_test_commands(
        &self,
        project_listing: &str,
    ) -> Result<String, GeneratorError> {
        (**self).generate_test_commands(project_listing).await
    }
}
