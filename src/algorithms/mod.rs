//! Training algorithms.

pub mod her_twin_sac;
pub mod squashed_gaussian;

pub use her_twin_sac::{HerConfig, HerTwinSac, HerTwinSacConfig};
