//! Configuration types and loading for patchflow

mod loader;

pub use loader::{Defaults, GeneratorConfig, PatchflowConfig};
