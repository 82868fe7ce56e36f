mod config;
mod generator;
mod logging;
mod patch;
mod testrun;
mod workflow;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use generator::command::CommandGenerator;
use patch::applier::{ApplyMode, FileOutcome, PatchApplier};
use std::path::PathBuf;
use std::sync::Arc;
use workflow::{FeatureOutcome, FeatureSpec, RunStatus, WorkflowEngine};

#[derive(Parser)]
#[command(name = "patchflow")]
#[command(about = "Turn feature requests into validated code changes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Working directory (defaults to current)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Also write logs to this file (defaults to the config dir when --debug)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Suppress normal output
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one feature request against the working tree
    Run {
        /// Natural-language description of the change
        description: String,

        /// Files the change is expected to touch
        #[arg(long = "file", value_name = "PATH")]
        files: Vec<PathBuf>,

        /// Extra attempts after the first
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// Run a batch of feature requests from a JSON manifest
    Batch {
        /// JSON file holding an array of feature specs
        manifest: PathBuf,
    },

    /// Apply a unified diff file to the working tree
    Apply {
        /// Path to the diff file
        diff: PathBuf,

        /// Validate without writing
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbosity = logging::Verbosity::from_flags(cli.debug, cli.quiet);
    logging::init(verbosity, cli.log_file.clone())?;

    let project_dir = cli
        .dir
        .clone()
        .map(Ok)
        .unwrap_or_else(std::env::current_dir)
        .context("resolving working directory")?;

    let config = config::PatchflowConfig::load(&project_dir)?;

    match cli.command {
        Commands::Run {
            description,
            files,
            max_retries,
        } => {
            let engine = build_engine(&config);
            let outcome = engine
                .run_feature(FeatureSpec {
                    description,
                    target_files: files,
                    base_directory: project_dir,
                    max_retries,
                })
                .await;
            report_outcome(&outcome, cli.quiet);
            exit_for(&[outcome]);
        }

        Commands::Batch { manifest } => {
            let contents = std::fs::read_to_string(&manifest)
                .with_context(|| format!("reading {}", manifest.display()))?;
            let mut specs: Vec<FeatureSpec> = serde_json::from_str(&contents)
                .with_context(|| format!("parsing {}", manifest.display()))?;
            for spec in &mut specs {
                if spec.base_directory.as_os_str().is_empty() {
                    spec.base_directory = project_dir.clone();
                }
            }

            let engine = build_engine(&config);
            let outcomes = engine.run_batch(specs).await;
            for (i, outcome) in outcomes.iter().enumerate() {
                if !cli.quiet {
                    println!("--- feature {} ---", i + 1);
                }
                report_outcome(outcome, cli.quiet);
            }
            exit_for(&outcomes);
        }

        Commands::Apply { diff, dry_run } => {
            let text = std::fs::read_to_string(&diff)
                .with_context(|| format!("reading {}", diff.display()))?;
            let doc = patch::parser::parse_diff(&text)?;

            let applier = PatchApplier::new(&project_dir, config.applier.clone());
            let mode = if dry_run {
                ApplyMode::DryRun
            } else {
                ApplyMode::Apply
            };
            let report = applier.apply(&doc, mode)?;

            for file in &report.files {
                match &file.outcome {
                    FileOutcome::Applied { .. } => {
                        println!("ok      {} ({:?})", file.path.display(), file.kind);
                    }
                    FileOutcome::Rejected { reason } => {
                        println!("reject  {}: {}", file.path.display(), reason);
                    }
                }
            }
            if !report.success {
                eprintln!("patch rejected; no files were modified");
                std::process::exit(1);
            }
            if dry_run {
                println!("dry run: all {} file(s) validate", report.files.len());
            }
        }
    }

    Ok(())
}

fn build_engine(config: &config::PatchflowConfig) -> WorkflowEngine<CommandGenerator> {
    let generator = CommandGenerator::new(config.generator.command.clone())
        .with_args(config.generator.args.clone());
    WorkflowEngine::new(Arc::new(generator), config.engine_config())
}

fn report_outcome(outcome: &FeatureOutcome, quiet: bool) {
    if !quiet {
        for line in &outcome.log {
            println!("{}", line);
        }
    }
    let verdict = match outcome.status {
        RunStatus::Success => "SUCCESS",
        RunStatus::Failed => "FAILED",
        RunStatus::FatalError => "FATAL ERROR",
    };
    println!("{} after {} attempt(s)", verdict, outcome.attempts.len());
    if let Some(summary) = &outcome.final_summary {
        println!(
            "tests: {} passed, {} failed, {} skipped",
            summary.passed, summary.failed, summary.skipped
        );
    }
}

fn exit_for(outcomes: &[FeatureOutcome]) {
    if outcomes.iter().any(|o| !o.succeeded()) {
        std::process::exit(1);
    }
}
