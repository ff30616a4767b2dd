//! Typed experiment configuration.
//!
//! The variant is the single channel of configuration into a run: it names
//! the environment, the relational architecture knobs, and the nested
//! algorithm / replay-buffer / relabeling sub-configurations. It is built
//! once, validated before anything is constructed, and then read-only for
//! the rest of the run. Validation reports the offending field instead of
//! letting a bad value surface as a shape mismatch deep inside training.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::algorithms::her_twin_sac::{HerConfig, HerTwinSacConfig};
use crate::buffers::RelabelingBufferConfig;
use crate::envs::block_construction::{ACTION_DIM, GOAL_DIM, OBJECT_DIM, SHARED_DIM};
use crate::envs::{EnvId, ObsDims};
use crate::nn::RelationalNetConfig;

/// Configuration errors surfaced before dispatch.
#[derive(Debug, Clone)]
pub enum VariantError {
    /// A required nested section is absent from the serialized form.
    MissingSection(&'static str),
    /// The serialized form could not be decoded.
    Parse(String),
    /// A field holds an unusable value.
    InvalidField { field: &'static str, reason: String },
}

impl fmt::Display for VariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantError::MissingSection(section) => {
                write!(f, "variant is missing required section `{section}`")
            }
            VariantError::Parse(msg) => write!(f, "variant failed to parse: {msg}"),
            VariantError::InvalidField { field, reason } => {
                write!(f, "variant field `{field}` is invalid: {reason}")
            }
        }
    }
}

impl std::error::Error for VariantError {}

/// Full hyperparameter surface of one experiment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    /// Environment identifier, e.g.
    /// `FetchBlockConstruction_1Blocks_IncrementalReward_DictstateObs_42Rendersize_FalseStackonly_SingletowerCase-v1`.
    pub env_id: String,
    pub num_blocks: usize,
    #[serde(default)]
    pub stackonly: bool,
    #[serde(default)]
    pub render: bool,
    /// Episode-length override applied to the environment after
    /// construction. `None` keeps the environment default.
    #[serde(default)]
    pub max_episode_steps: Option<usize>,

    // Relational architecture.
    pub embedding_dim: usize,
    pub num_relational_blocks: usize,
    /// Learned pooling queries; the readout input is
    /// `num_query_heads * embedding_dim`.
    pub num_query_heads: usize,
    /// Attention heads in the relational blocks and the pooling readout.
    pub pooling_heads: usize,
    pub mlp_hidden_sizes: Vec<usize>,
    pub layer_norm: bool,
    pub recurrent_graph: bool,

    // Observation layout.
    pub action_dim: usize,
    pub shared_dim: usize,
    pub object_dim: usize,
    pub goal_dim: usize,

    pub algo_kwargs: HerTwinSacConfig,
    pub replay_buffer_kwargs: RelabelingBufferConfig,
    pub her_kwargs: HerConfig,
}

impl Variant {
    /// The single-block pick-and-place setup: incremental reward, three
    /// recurrent-off relational blocks over 64-dim embeddings, and per-epoch
    /// step counts scaled by the block count.
    pub fn pick_and_place(num_blocks: usize, stackonly: bool) -> Self {
        let env_id = EnvId::new(num_blocks).with_stackonly(stackonly).to_string();

        Self {
            env_id,
            num_blocks,
            stackonly,
            render: false,
            max_episode_steps: None,
            embedding_dim: 64,
            num_relational_blocks: 3,
            num_query_heads: 1,
            pooling_heads: 1,
            mlp_hidden_sizes: vec![64, 64, 64],
            layer_norm: true,
            recurrent_graph: false,
            action_dim: ACTION_DIM,
            shared_dim: SHARED_DIM,
            object_dim: OBJECT_DIM,
            goal_dim: GOAL_DIM,
            algo_kwargs: HerTwinSacConfig::default().scaled_for_blocks(num_blocks),
            replay_buffer_kwargs: RelabelingBufferConfig::default(),
            her_kwargs: HerConfig::default(),
        }
    }

    /// Decode a variant from JSON, requiring the nested sections to be
    /// spelled out rather than silently defaulted.
    pub fn from_json(json: &str) -> Result<Self, VariantError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| VariantError::Parse(e.to_string()))?;

        for section in ["algo_kwargs", "replay_buffer_kwargs", "her_kwargs"] {
            if value.get(section).is_none() {
                return Err(VariantError::MissingSection(section));
            }
        }

        serde_json::from_value(value).map_err(|e| VariantError::Parse(e.to_string()))
    }

    /// Check every field before any construction happens.
    pub fn validate(&self) -> Result<(), VariantError> {
        let invalid = |field: &'static str, reason: String| VariantError::InvalidField {
            field,
            reason,
        };

        let parsed: EnvId = self
            .env_id
            .parse()
            .map_err(|e| invalid("env_id", format!("{e}")))?;
        if parsed.num_blocks != self.num_blocks {
            return Err(invalid(
                "num_blocks",
                format!(
                    "id encodes {} blocks but num_blocks is {}",
                    parsed.num_blocks, self.num_blocks
                ),
            ));
        }
        if parsed.stackonly != self.stackonly {
            return Err(invalid(
                "stackonly",
                format!(
                    "id encodes stackonly={} but variant says {}",
                    parsed.stackonly, self.stackonly
                ),
            ));
        }

        if self.embedding_dim == 0 {
            return Err(invalid("embedding_dim", "must be positive".to_string()));
        }
        if self.pooling_heads == 0 {
            return Err(invalid("pooling_heads", "must be positive".to_string()));
        }
        if self.embedding_dim % self.pooling_heads != 0 {
            return Err(invalid(
                "embedding_dim",
                format!(
                    "{} is not divisible by pooling_heads {}",
                    self.embedding_dim, self.pooling_heads
                ),
            ));
        }
        if self.num_query_heads == 0 {
            return Err(invalid("num_query_heads", "must be positive".to_string()));
        }
        if self.num_relational_blocks == 0 {
            return Err(invalid(
                "num_relational_blocks",
                "must be positive".to_string(),
            ));
        }

        for (field, value) in [
            ("action_dim", self.action_dim),
            ("shared_dim", self.shared_dim),
            ("object_dim", self.object_dim),
            ("goal_dim", self.goal_dim),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be positive".to_string()));
            }
        }

        self.algo_kwargs
            .validate()
            .map_err(|reason| invalid("algo_kwargs", reason))?;
        self.replay_buffer_kwargs
            .validate()
            .map_err(|reason| invalid("replay_buffer_kwargs", reason))?;
        self.her_kwargs
            .validate()
            .map_err(|reason| invalid("her_kwargs", reason))?;

        Ok(())
    }

    pub fn obs_dims(&self) -> ObsDims {
        ObsDims {
            shared_dim: self.shared_dim,
            object_dim: self.object_dim,
            goal_dim: self.goal_dim,
        }
    }

    /// Network configuration with every knob flowing from this variant.
    pub fn net_config(&self) -> RelationalNetConfig {
        RelationalNetConfig::new(self.embedding_dim)
            .with_num_heads(self.pooling_heads)
            .with_num_query_heads(self.num_query_heads)
            .with_num_relational_blocks(self.num_relational_blocks)
            .with_layer_norm(self.layer_norm)
            .with_recurrent_graph(self.recurrent_graph)
            .with_readout_hidden(self.mlp_hidden_sizes.clone())
    }

    /// Readout input size, `num_query_heads * embedding_dim`.
    pub fn pooling_input_size(&self) -> usize {
        self.num_query_heads * self.embedding_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_is_valid() {
        let variant = Variant::pick_and_place(1, false);
        assert!(variant.validate().is_ok());
        assert_eq!(
            variant.env_id,
            "FetchBlockConstruction_1Blocks_IncrementalReward_DictstateObs_42Rendersize_FalseStackonly_SingletowerCase-v1"
        );
        assert_eq!(variant.algo_kwargs.max_path_length, 50);
    }

    #[test]
    fn test_preset_scales_with_blocks() {
        let variant = Variant::pick_and_place(3, false);
        assert_eq!(variant.algo_kwargs.max_path_length, 150);
        assert_eq!(variant.algo_kwargs.num_steps_per_eval, 1500);
        assert!(variant.validate().is_ok());
    }

    #[test]
    fn test_json_roundtrip() {
        let variant = Variant::pick_and_place(2, true);
        let json = serde_json::to_string(&variant).unwrap();
        let decoded = Variant::from_json(&json).unwrap();
        assert_eq!(decoded.env_id, variant.env_id);
        assert_eq!(decoded.num_blocks, 2);
        assert!(decoded.stackonly);
    }

    #[test]
    fn test_missing_section_is_named() {
        let mut value: serde_json::Value =
            serde_json::to_value(Variant::pick_and_place(1, false)).unwrap();
        value.as_object_mut().unwrap().remove("her_kwargs");

        let err = Variant::from_json(&value.to_string()).unwrap_err();
        match err {
            VariantError::MissingSection(section) => assert_eq!(section, "her_kwargs"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validation_names_bad_field() {
        let mut variant = Variant::pick_and_place(1, false);
        variant.embedding_dim = 65;
        variant.pooling_heads = 2;

        let err = variant.validate().unwrap_err();
        match err {
            VariantError::InvalidField { field, .. } => assert_eq!(field, "embedding_dim"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validation_catches_id_mismatch() {
        let mut variant = Variant::pick_and_place(2, false);
        variant.num_blocks = 3;
        assert!(variant.validate().is_err());
    }

    #[test]
    fn test_validation_checks_nested_sections() {
        let mut variant = Variant::pick_and_place(1, false);
        variant.algo_kwargs.discount = 2.0;
        let err = variant.validate().unwrap_err();
        match err {
            VariantError::InvalidField { field, .. } => assert_eq!(field, "algo_kwargs"),
            other => panic!("unexpected error: {other}"),
        }

        let mut variant = Variant::pick_and_place(1, false);
        variant.her_kwargs.desired_goal_key = "state_desired_goal".to_string();
        let err = variant.validate().unwrap_err();
        match err {
            VariantError::InvalidField { field, .. } => assert_eq!(field, "her_kwargs"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_pooling_input_size_propagates() {
        let mut variant = Variant::pick_and_place(1, false);
        variant.num_query_heads = 3;
        assert_eq!(variant.pooling_input_size(), 192);
        assert_eq!(variant.net_config().pooling_input_size(), 192);
    }
}
