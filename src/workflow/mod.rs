//! Feature workflow state machine
//!
//! This module handles:
//! - Run state, attempt records, and the append-only transition log
//! - The retrying engine that drives plan, generate, apply, test
//! - Batch scheduling of features with overlap-aware concurrency
//!
//! # Example
//!
//! ```ignore
//! use patchflow::workflow::{EngineConfig, FeatureSpec, WorkflowEngine};
//! use std::sync::Arc;
//!
//! let engine = WorkflowEngine::new(Arc::new(generator), EngineConfig::default());
//! let outcome = engine.run_feature(spec).await;
//!
//! if outcome.succeeded() {
//!     println!("Feature landed!");
//! }
//! ```

mod batch;
mod engine;
mod state;

pub use engine::{EngineConfig, WorkflowEngine};
pub use state::{AttemptRecord, FeatureOutcome, FeatureRun, FeatureSpec, Phase, RunStatus};
