//! Hindsight twin soft actor-critic.

pub mod config;
pub mod entropy;
pub mod trainer;

pub use config::{HerConfig, HerTwinSacConfig};
pub use entropy::{target_entropy_continuous, EntropyTuner};
pub use trainer::{HerTwinSac, TrainingSnapshot};
