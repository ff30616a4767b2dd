//! Environment registry.
//!
//! Environments are constructed by identifier string. The full
//! block-construction family is registered up front; registration of any
//! single variant is best-effort, so one malformed identifier never takes
//! down the rest of the family.

use std::collections::BTreeMap;

use super::block_construction::BlockConstructionEnv;
use super::env_id::{CaseType, EnvId, RewardType};
use super::goal_env::GoalEnv;
use super::EnvError;

/// Largest block count registered by default.
pub const MAX_REGISTERED_BLOCKS: usize = 8;

type EnvCtor = Box<dyn Fn() -> Box<dyn GoalEnv> + Send + Sync>;

/// String-keyed environment constructors.
pub struct EnvRegistry {
    ctors: BTreeMap<String, EnvCtor>,
}

impl EnvRegistry {
    pub fn empty() -> Self {
        Self {
            ctors: BTreeMap::new(),
        }
    }

    /// Registry pre-populated with every block-construction variant up to
    /// [`MAX_REGISTERED_BLOCKS`] blocks.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for num_blocks in 1..=MAX_REGISTERED_BLOCKS {
            for reward_type in [RewardType::Incremental, RewardType::Sparse] {
                for stackonly in [false, true] {
                    for case in [CaseType::Singletower, CaseType::Pyramid, CaseType::Multitower] {
                        let id = EnvId::new(num_blocks)
                            .with_reward_type(reward_type)
                            .with_stackonly(stackonly)
                            .with_case(case);
                        registry.register_best_effort(id);
                    }
                }
            }
        }
        registry
    }

    /// Register one variant, reporting rather than propagating failure.
    pub fn register_best_effort(&mut self, id: EnvId) {
        if let Err(err) = self.register(id) {
            eprintln!("skipping registration of {id}: {err}");
        }
    }

    /// Register one variant under its identifier string.
    pub fn register(&mut self, id: EnvId) -> Result<(), EnvError> {
        if id.num_blocks == 0 {
            return Err(EnvError::Registration(
                "environment needs at least one block".to_string(),
            ));
        }
        let key = id.to_string();
        if self.ctors.contains_key(&key) {
            return Err(EnvError::Registration(format!("{key} already registered")));
        }
        self.ctors
            .insert(key, Box::new(move || Box::new(BlockConstructionEnv::new(id))));
        Ok(())
    }

    /// Construct an environment from its identifier string.
    pub fn make(&self, id: &str) -> Result<Box<dyn GoalEnv>, EnvError> {
        // Parse first so malformed strings report as invalid, not unknown.
        let _: EnvId = id.parse()?;
        match self.ctors.get(id) {
            Some(ctor) => Ok(ctor()),
            None => Err(EnvError::UnknownId(id.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.ctors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ctors.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ctors.keys().map(String::as_str)
    }
}

/// Construct an environment from the default registry.
pub fn make_env(id: &str) -> Result<Box<dyn GoalEnv>, EnvError> {
    EnvRegistry::with_defaults().make(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PICK_AND_PLACE_1: &str =
        "FetchBlockConstruction_1Blocks_IncrementalReward_DictstateObs_42Rendersize_FalseStackonly_SingletowerCase-v1";

    #[test]
    fn test_defaults_cover_family() {
        let registry = EnvRegistry::with_defaults();
        // 8 block counts x 2 rewards x 2 stackonly x 3 cases.
        assert_eq!(registry.len(), 96);
    }

    #[test]
    fn test_make_pick_and_place() {
        let env = make_env(PICK_AND_PLACE_1).unwrap();
        assert_eq!(env.num_blocks(), 1);
        assert_eq!(env.action_dim(), 4);
        assert_eq!(env.obs_dims().row_dim(), 28);
    }

    #[test]
    fn test_make_unknown_id() {
        let registry = EnvRegistry::with_defaults();
        let id = EnvId::new(MAX_REGISTERED_BLOCKS + 1).to_string();
        match registry.make(&id) {
            Err(EnvError::UnknownId(s)) => assert_eq!(s, id),
            Err(other) => panic!("expected UnknownId, got {other:?}"),
            Ok(_) => panic!("expected UnknownId, got an environment"),
        }
    }

    #[test]
    fn test_make_invalid_id() {
        let registry = EnvRegistry::with_defaults();
        assert!(matches!(
            registry.make("NotAnEnvironment-v1"),
            Err(EnvError::InvalidId(_))
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = EnvRegistry::empty();
        registry.register(EnvId::new(1)).unwrap();
        assert!(registry.register(EnvId::new(1)).is_err());
    }

    #[test]
    fn test_zero_blocks_rejected() {
        let mut registry = EnvRegistry::empty();
        assert!(matches!(
            registry.register(EnvId::new(0)),
            Err(EnvError::Registration(_))
        ));
    }
}
