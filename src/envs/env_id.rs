//! Environment identifier strings for the block-construction family.
//!
//! Every experiment selects its environment variant through a single
//! formatted identifier encoding block count, reward structure, observation
//! type, render size, the stack-only flag, and the task case:
//!
//! ```text
//! FetchBlockConstruction_1Blocks_IncrementalReward_DictstateObs_42Rendersize_FalseStackonly_SingletowerCase-v1
//! ```
//!
//! Booleans render in Python style (`True`/`False`) to stay byte-compatible
//! with the identifiers used by the original environment suite.

use std::fmt;
use std::str::FromStr;

use super::EnvError;

/// Identifier prefix shared by the whole family.
pub const FAMILY: &str = "FetchBlockConstruction";

/// Version suffix of the registered environments.
pub const VERSION: &str = "v1";

/// Reward structure of the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardType {
    /// One unit of reward per block at its goal, plus the hand-clearance
    /// bonus once the tower is complete.
    Incremental,
    /// -1 until the full construction is in place, 0 afterwards.
    Sparse,
}

impl RewardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardType::Incremental => "Incremental",
            RewardType::Sparse => "Sparse",
        }
    }
}

/// Observation encoding. Only flat dict-state observations are supported;
/// image observations are out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObsType {
    Dictstate,
}

impl ObsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObsType::Dictstate => "Dictstate",
        }
    }
}

/// Goal layout of the construction task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseType {
    /// All blocks stacked into one tower at a single site.
    Singletower,
    /// Blocks arranged into a pyramid footprint.
    Pyramid,
    /// Blocks split across multiple tower sites.
    Multitower,
}

impl CaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseType::Singletower => "Singletower",
            CaseType::Pyramid => "Pyramid",
            CaseType::Multitower => "Multitower",
        }
    }
}

/// Parsed form of a block-construction environment identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvId {
    pub num_blocks: usize,
    pub reward_type: RewardType,
    pub obs_type: ObsType,
    pub render_size: usize,
    pub stackonly: bool,
    pub case: CaseType,
}

impl EnvId {
    /// Identifier with the conventional defaults for a given block count:
    /// incremental reward, dict-state observations, render size 42,
    /// stack-only off, single tower.
    pub fn new(num_blocks: usize) -> Self {
        Self {
            num_blocks,
            reward_type: RewardType::Incremental,
            obs_type: ObsType::Dictstate,
            render_size: 42,
            stackonly: false,
            case: CaseType::Singletower,
        }
    }

    pub fn with_reward_type(mut self, reward_type: RewardType) -> Self {
        self.reward_type = reward_type;
        self
    }

    pub fn with_render_size(mut self, render_size: usize) -> Self {
        self.render_size = render_size;
        self
    }

    pub fn with_stackonly(mut self, stackonly: bool) -> Self {
        self.stackonly = stackonly;
        self
    }

    pub fn with_case(mut self, case: CaseType) -> Self {
        self.case = case;
        self
    }
}

fn python_bool(b: bool) -> &'static str {
    if b {
        "True"
    } else {
        "False"
    }
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}Blocks_{}Reward_{}Obs_{}Rendersize_{}Stackonly_{}Case-{}",
            FAMILY,
            self.num_blocks,
            self.reward_type.as_str(),
            self.obs_type.as_str(),
            self.render_size,
            python_bool(self.stackonly),
            self.case.as_str(),
            VERSION,
        )
    }
}

/// Strip a known suffix from an identifier segment.
fn strip_marker<'a>(segment: &'a str, marker: &str, id: &str) -> Result<&'a str, EnvError> {
    segment
        .strip_suffix(marker)
        .ok_or_else(|| EnvError::InvalidId(format!("{id}: expected segment ending in {marker}")))
}

impl FromStr for EnvId {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EnvError::InvalidId(s.to_string());

        let body = s.strip_prefix(FAMILY).ok_or_else(invalid)?;
        let body = body.strip_prefix('_').ok_or_else(invalid)?;
        let body = body
            .strip_suffix(&format!("-{VERSION}"))
            .ok_or_else(invalid)?;

        let segments: Vec<&str> = body.split('_').collect();
        if segments.len() != 6 {
            return Err(invalid());
        }

        let num_blocks = strip_marker(segments[0], "Blocks", s)?
            .parse::<usize>()
            .map_err(|_| invalid())?;

        let reward_type = match strip_marker(segments[1], "Reward", s)? {
            "Incremental" => RewardType::Incremental,
            "Sparse" => RewardType::Sparse,
            _ => return Err(invalid()),
        };

        let obs_type = match strip_marker(segments[2], "Obs", s)? {
            "Dictstate" => ObsType::Dictstate,
            _ => return Err(invalid()),
        };

        let render_size = strip_marker(segments[3], "Rendersize", s)?
            .parse::<usize>()
            .map_err(|_| invalid())?;

        let stackonly = match strip_marker(segments[4], "Stackonly", s)? {
            "True" => true,
            "False" => false,
            _ => return Err(invalid()),
        };

        let case = match strip_marker(segments[5], "Case", s)? {
            "Singletower" => CaseType::Singletower,
            "Pyramid" => CaseType::Pyramid,
            "Multitower" => CaseType::Multitower,
            _ => return Err(invalid()),
        };

        Ok(EnvId {
            num_blocks,
            reward_type,
            obs_type,
            render_size,
            stackonly,
            case,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_block_identifier() {
        let id = EnvId::new(1);
        assert_eq!(
            id.to_string(),
            "FetchBlockConstruction_1Blocks_IncrementalReward_DictstateObs_42Rendersize_FalseStackonly_SingletowerCase-v1"
        );
    }

    #[test]
    fn test_stackonly_renders_python_true() {
        let id = EnvId::new(3).with_stackonly(true);
        assert_eq!(
            id.to_string(),
            "FetchBlockConstruction_3Blocks_IncrementalReward_DictstateObs_42Rendersize_TrueStackonly_SingletowerCase-v1"
        );
    }

    #[test]
    fn test_roundtrip() {
        let id = EnvId::new(4)
            .with_reward_type(RewardType::Sparse)
            .with_stackonly(true)
            .with_case(CaseType::Pyramid)
            .with_render_size(84);
        let parsed: EnvId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_parse_rejects_wrong_family() {
        let err = "FetchPickAndPlace_1Blocks_IncrementalReward_DictstateObs_42Rendersize_FalseStackonly_SingletowerCase-v1"
            .parse::<EnvId>();
        assert!(err.is_err());
    }

    #[test]
    fn test_parse_rejects_lowercase_bool() {
        let err = "FetchBlockConstruction_1Blocks_IncrementalReward_DictstateObs_42Rendersize_falseStackonly_SingletowerCase-v1"
            .parse::<EnvId>();
        assert!(err.is_err());
    }

    #[test]
    fn test_parse_rejects_missing_segment() {
        let err = "FetchBlockConstruction_1Blocks_IncrementalReward_DictstateObs_42Rendersize_FalseStackonly-v1"
            .parse::<EnvId>();
        assert!(err.is_err());
    }
}
