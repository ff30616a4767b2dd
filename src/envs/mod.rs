//! Goal-conditioned block-construction environments.

use std::fmt;

pub mod block_construction;
pub mod env_id;
pub mod goal_env;
pub mod registry;

pub use block_construction::BlockConstructionEnv;
pub use env_id::{CaseType, EnvId, ObsType, RewardType};
pub use goal_env::{GoalEnv, GoalObservation, GoalStepResult, ObsDims, StepInfo};
pub use registry::{make_env, EnvRegistry};

/// Errors from environment lookup and registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvError {
    /// Identifier parsed but no environment is registered under it.
    UnknownId(String),
    /// Identifier does not follow the family's naming scheme.
    InvalidId(String),
    /// Variant could not be registered.
    Registration(String),
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvError::UnknownId(id) => write!(f, "unknown environment id: {id}"),
            EnvError::InvalidId(id) => write!(f, "invalid environment id: {id}"),
            EnvError::Registration(msg) => write!(f, "registration failed: {msg}"),
        }
    }
}

impl std::error::Error for EnvError {}
