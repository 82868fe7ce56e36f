//! Configuration loading

use crate::patch::applier::ApplierConfig;
use crate::workflow::EngineConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level patchflow configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PatchflowConfig {
    /// Engine defaults
    #[serde(default)]
    pub defaults: Defaults,

    /// Patch matching tunables
    #[serde(default)]
    pub applier: ApplierConfig,

    /// External generator command
    #[serde(default)]
    pub generator: GeneratorConfig,
}

/// Default engine settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Extra attempts after the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Time budget per generator call, seconds
    #[serde(default = "default_generation_timeout")]
    pub generation_timeout_secs: u64,

    /// Time budget per test command, seconds
    #[serde(default = "default_test_timeout")]
    pub test_timeout_secs: u64,

    /// Pause between attempts, milliseconds; zero disables
    #[serde(default)]
    pub retry_delay_ms: u64,

    /// Add up to 25% jitter to the retry pause
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_generation_timeout() -> u64 {
    120
}

fn default_test_timeout() -> u64 {
    300
}

fn default_jitter() -> bool {
    true
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            generation_timeout_secs: default_generation_timeout(),
            test_timeout_secs: default_test_timeout(),
            retry_delay_ms: 0,
            jitter: default_jitter(),
        }
    }
}

/// External command used for diff and test generation
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Program receiving the prompt on stdin
    #[serde(default = "default_generator_command")]
    pub command: String,

    /// Arguments passed before the prompt
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_generator_command() -> String {
    "claude".to_string()
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: default_generator_command(),
            args: Vec::new(),
        }
    }
}

impl PatchflowConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (first match wins):
    /// 1. {project_dir}/patchflow.toml
    /// 2. ~/.config/patchflow/config.toml
    /// 3. Built-in defaults
    pub fn load(project_dir: &Path) -> Result<Self> {
        let project_path = project_dir.join("patchflow.toml");
        if project_path.exists() {
            return Self::load_file(&project_path);
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                return Self::load_file(&user_path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Get the user config path (~/.config/patchflow/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("patchflow/config.toml"))
    }

    /// Build the engine configuration from the loaded settings
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_retries: self.defaults.max_retries,
            generation_timeout: Duration::from_secs(self.defaults.generation_timeout_secs),
            test_timeout: Duration::from_secs(self.defaults.test_timeout_secs),
            retry_delay: Duration::from_millis(self.defaults.retry_delay_ms),
            jitter: self.defaults.jitter,
            applier: self.applier.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PatchflowConfig::default();
        assert_eq!(config.defaults.max_retries, 3);
        assert_eq!(config.defaults.generation_timeout_secs, 120);
        assert_eq!(config.defaults.test_timeout_secs, 300);
        assert_eq!(config.applier.search_window, 3);
        assert_eq!(config.generator.command, "claude");
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("patchflow.toml");

        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
            [defaults]
            max_retries = 1
            retry_delay_ms = 250

            [applier]
            search_window = 5

            [generator]
            command = "llm"
            args = ["--no-stream"]
        "#
        )
        .unwrap();

        let config = PatchflowConfig::load(dir.path()).unwrap();
        assert_eq!(config.defaults.max_retries, 1);
        assert_eq!(config.defaults.retry_delay_ms, 250);
        assert_eq!(config.applier.search_window, 5);
        assert_eq!(config.generator.command, "llm");
        assert_eq!(config.generator.args, vec!["--no-stream"]);

        let engine = config.engine_config();
        assert_eq!(engine.max_retries, 1);
        assert_eq!(engine.retry_delay, Duration::from_millis(250));
        assert_eq!(engine.applier.search_window, 5);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let config = PatchflowConfig::load(dir.path()).unwrap();
        assert_eq!(config.defaults.max_retries, 3);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("patchflow.toml");
        std::fs::write(&config_path, "[defaults]\nmax_retirez = 9\n").unwrap();

        assert!(PatchflowConfig::load(dir.path()).is_err());
    }
}
