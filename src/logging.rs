//! Tracing setup shared by every subcommand

use anyhow::Context;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Console verbosity, derived from the CLI flags. Debug wins over quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Debug,
}

impl Verbosity {
    pub fn from_flags(debug: bool, quiet: bool) -> Self {
        if debug {
            Self::Debug
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    fn filter(self) -> EnvFilter {
        EnvFilter::new(match self {
            Self::Debug => "patchflow=debug",
            Self::Quiet => "patchflow=error",
            Self::Normal => "patchflow=info",
        })
    }
}

/// Initialize the global subscriber.
///
/// Console output goes to stderr at the requested verbosity. An explicit
/// `log_file` additionally gets a plain-text layer with call-site detail;
/// under `Debug` with no file given, a timestamped file under the user
/// config dir is opened instead so verbose runs stay reviewable.
///
/// Returns the log file path actually in use, if any.
pub fn init(verbosity: Verbosity, log_file: Option<PathBuf>) -> anyhow::Result<Option<PathBuf>> {
    let debug = verbosity == Verbosity::Debug;

    let console = fmt::layer()
        .with_target(false)
        .with_line_number(debug)
        .with_file(debug)
        .with_writer(std::io::stderr);

    let log_path = match log_file {
        Some(path) => Some(path),
        None if debug => Some(default_log_path()?),
        None => None,
    };

    let registry = tracing_subscriber::registry()
        .with(verbosity.filter())
        .with(console);

    match &log_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating log directory {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            registry
                .with(
                    fmt::layer()
                        .with_ansi(false)
                        .with_line_number(true)
                        .with_file(true)
                        .with_writer(file),
                )
                .init();
        }
        None => registry.init(),
    }

    Ok(log_path)
}

fn default_log_path() -> anyhow::Result<PathBuf> {
    let log_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?
        .join("patchflow")
        .join("logs");

    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    Ok(log_dir.join(format!("run-{}.log", timestamp)))
}
