//! Experiment configuration and launching.

pub mod experiment;
pub mod variant;

pub use experiment::{run_experiment, ExperimentMeta, LaunchContext, LaunchError};
pub use variant::{Variant, VariantError};
