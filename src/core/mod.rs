//! Shared building blocks: normalization, trajectories, target networks.

pub mod normalizer;
pub mod path;
pub mod target_network;

pub use normalizer::{
    CompositeNormalizer, RunningMeanStd, SharedCompositeNormalizer, DEFAULT_CLIP_RANGE,
};
pub use path::{GoalStep, Path};
pub use target_network::soft_update;
