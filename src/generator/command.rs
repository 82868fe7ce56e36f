//! Generator backed by an external command
//!
//! Shells out to a configured program, writes the prompt to its stdin, and
//! returns its stdout. That keeps the binary usable against any local LLM
//! CLI without baking in a provider.

use super::{FileContext, Generator, GeneratorError};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    async fn invoke(&self, prompt: String) -> Result<String, GeneratorError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                GeneratorError::service(format!("failed to spawn '{}': {}", self.program, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A program that exits without reading the prompt breaks the
            // pipe; its exit status is the real story then
            let _ = stdin.write_all(prompt.as_bytes()).await;
            // Dropping stdin closes it so the program sees EOF
        }

        let output = child.wait_with_output().await.map_err(|e| {
            GeneratorError::service(format!("failed to read generator output: {}", e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GeneratorError::service(format!(
                "'{}' exited with {:?}: {}",
                self.program,
                output.status.code(),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn render_files(files: &[FileContext]) -> String {
    let mut out = String::new();
    for file in files {
        out.push_str(&format!("==== {} ====\n{}\n", file.path.display(), file.content));
    }
    out
}

#[async_trait]
impl Generator for CommandGenerator {
    async fn generate_diff(
        &self,
        prompt: &str,
        files: &[FileContext],
    ) -> Result<String, GeneratorError> {
        let full = format!("{}\n\n{}", prompt, render_files(files));
        self.invoke(full).await
    }

    async fn generate_tests(&self, prompt: &str, diff: &str) -> Result<String, GeneratorError> {
        let full = format!("{}\n\nChange under test:\n{}", prompt, diff);
        self.invoke(full).await
    }

    async fn generate_test_commands(
        &self,
        project_listing: &str,
    ) -> Result<String, GeneratorError> {
        self.invoke(project_listing.to_string()).await
    }
}
