//! Observation-to-vertex embedding.
//!
//! The input module turns dict-shaped observations into per-block vertex
//! embeddings. Normalization happens on the CPU through the experiment's
//! shared [`SharedCompositeNormalizer`]; every network's input module holds
//! a clone of the same handle, so the policy and all critics see inputs on
//! an identical scale.
//!
//! Action-conditioned networks receive the action as a tensor, normalized
//! with tensor arithmetic and broadcast to every block row, so gradients
//! flow from the critic back through sampled actions into the policy.

use burn::module::{Ignored, Module};
use burn::prelude::*;
use burn::tensor::TensorData;

use crate::core::normalizer::SharedCompositeNormalizer;

use super::dense::{Dense, DenseConfig, LayerNorm};

/// Configuration for [`FetchInputModule`].
#[derive(Debug, Clone)]
pub struct FetchInputModuleConfig {
    pub embedding_dim: usize,
    /// Append the action to every block row.
    pub with_action: bool,
    /// Layer-normalize the embedded vertices.
    pub layer_norm: bool,
}

impl FetchInputModuleConfig {
    pub fn new(embedding_dim: usize) -> Self {
        Self {
            embedding_dim,
            with_action: false,
            layer_norm: true,
        }
    }

    pub fn with_action(mut self, with_action: bool) -> Self {
        self.with_action = with_action;
        self
    }

    pub fn with_layer_norm(mut self, layer_norm: bool) -> Self {
        self.layer_norm = layer_norm;
        self
    }

    pub fn init<B: Backend>(
        &self,
        normalizer: SharedCompositeNormalizer,
        device: &B::Device,
    ) -> FetchInputModule<B> {
        let row_dim = normalizer.row_dim()
            + if self.with_action {
                normalizer.action_dim()
            } else {
                0
            };

        FetchInputModule {
            embed: DenseConfig::new(row_dim, self.embedding_dim).init(device),
            layer_norm: self.layer_norm.then(|| LayerNorm::new(self.embedding_dim, device)),
            normalizer: Ignored(normalizer),
            with_action: self.with_action,
        }
    }
}

/// Embeds dict observations into `[batch, num_blocks, embedding_dim]`.
#[derive(Module, Debug)]
pub struct FetchInputModule<B: Backend> {
    embed: Dense<B>,
    layer_norm: Option<LayerNorm<B>>,
    normalizer: Ignored<SharedCompositeNormalizer>,
    with_action: bool,
}

impl<B: Backend> FetchInputModule<B> {
    /// Embed a batch of observations without actions.
    ///
    /// `observations[i]` is a flat observation and `goals[i]` its desired
    /// goal. All entries must describe `num_blocks` blocks.
    pub fn forward(
        &self,
        observations: &[Vec<f32>],
        goals: &[Vec<f32>],
        num_blocks: usize,
        device: &B::Device,
    ) -> Tensor<B, 3> {
        assert!(!self.with_action, "action-conditioned input module needs actions");
        let rows = self.rows_tensor(observations, goals, num_blocks, device);
        self.embed_vertices(rows)
    }

    /// Embed a batch of observations with a `[batch, action_dim]` action
    /// tensor appended to every block row.
    pub fn forward_with_actions(
        &self,
        observations: &[Vec<f32>],
        goals: &[Vec<f32>],
        actions: Tensor<B, 2>,
        num_blocks: usize,
        device: &B::Device,
    ) -> Tensor<B, 3> {
        assert!(self.with_action, "input module was built without action input");
        let [batch, action_dim] = actions.dims();
        assert_eq!(observations.len(), batch, "batch size mismatch");

        let rows = self.rows_tensor(observations, goals, num_blocks, device);
        let actions = self
            .normalize_action_tensor(actions, device)
            .reshape([batch, 1, action_dim])
            .expand([batch, num_blocks, action_dim]);

        self.embed_vertices(Tensor::cat(vec![rows, actions], 2))
    }

    /// Normalized per-block rows as a `[batch, num_blocks, row_dim]` tensor.
    fn rows_tensor(
        &self,
        observations: &[Vec<f32>],
        goals: &[Vec<f32>],
        num_blocks: usize,
        device: &B::Device,
    ) -> Tensor<B, 3> {
        assert_eq!(observations.len(), goals.len(), "batch size mismatch");
        let batch = observations.len();
        let row_dim = self.normalizer.0.row_dim();

        let mut flat = Vec::with_capacity(batch * num_blocks * row_dim);
        for i in 0..batch {
            for row in self
                .normalizer
                .0
                .normalized_rows(&observations[i], &goals[i], num_blocks)
            {
                flat.extend_from_slice(&row);
            }
        }

        Tensor::from_data(TensorData::new(flat, [batch, num_blocks, row_dim]), device)
    }

    /// Normalize actions with tensor arithmetic so gradients pass through.
    fn normalize_action_tensor(&self, actions: Tensor<B, 2>, device: &B::Device) -> Tensor<B, 2> {
        let (mean, std) = self.normalizer.0.action_mean_std();
        let clip = self.normalizer.0.clip_range();
        let dim = mean.len();

        let mean = Tensor::<B, 1>::from_data(TensorData::new(mean, [dim]), device).unsqueeze_dim(0);
        let std = Tensor::<B, 1>::from_data(TensorData::new(std, [dim]), device).unsqueeze_dim(0);

        ((actions - mean) / std).clamp(-clip, clip)
    }

    fn embed_vertices(&self, rows: Tensor<B, 3>) -> Tensor<B, 3> {
        let embedded = self.embed.forward_3d(rows);
        match &self.layer_norm {
            Some(norm) => norm.forward(embedded),
            None => embedded,
        }
    }

    /// Handle to the shared normalizer.
    pub fn normalizer(&self) -> &SharedCompositeNormalizer {
        &self.normalizer.0
    }

    pub fn embedding_dim(&self) -> usize {
        self.embed.d_output()
    }
}
