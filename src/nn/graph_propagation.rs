//! Relational message passing over block embeddings.
//!
//! A [`GraphPropagation`] module applies a stack of relational blocks, each
//! one round of self-attention plus a position-wise feed-forward update,
//! both with residual connections. With `recurrent` set, a single block's
//! weights are reused for every round, which keeps the parameter count
//! independent of depth.

use burn::module::Module;
use burn::prelude::*;
use burn::tensor::activation::leaky_relu;

use super::dense::{Dense, DenseConfig, LayerNorm, LEAKY_SLOPE};
use super::graph_attention::{BlockAttention, BlockAttentionConfig};

/// Configuration for [`GraphPropagation`].
#[derive(Debug, Clone)]
pub struct GraphPropagationConfig {
    pub embedding_dim: usize,
    /// Attention heads per relational block.
    pub num_heads: usize,
    /// Number of message-passing rounds.
    pub num_relational_blocks: usize,
    /// Apply layer normalization after each residual update.
    pub layer_norm: bool,
    /// Share one relational block across all rounds.
    pub recurrent: bool,
}

impl GraphPropagationConfig {
    pub fn new(embedding_dim: usize, num_heads: usize, num_relational_blocks: usize) -> Self {
        Self {
            embedding_dim,
            num_heads,
            num_relational_blocks,
            layer_norm: true,
            recurrent: true,
        }
    }

    pub fn with_layer_norm(mut self, layer_norm: bool) -> Self {
        self.layer_norm = layer_norm;
        self
    }

    pub fn with_recurrent(mut self, recurrent: bool) -> Self {
        self.recurrent = recurrent;
        self
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> GraphPropagation<B> {
        let distinct = if self.recurrent {
            1
        } else {
            self.num_relational_blocks
        };
        let blocks = (0..distinct)
            .map(|_| RelationalBlock::new(self.embedding_dim, self.num_heads, self.layer_norm, device))
            .collect();

        GraphPropagation {
            blocks,
            num_rounds: self.num_relational_blocks,
            embedding_dim: self.embedding_dim,
        }
    }
}

/// One round of relational message passing.
#[derive(Module, Debug)]
struct RelationalBlock<B: Backend> {
    attention: BlockAttention<B>,
    feed_forward: Dense<B>,
    norm_attention: Option<LayerNorm<B>>,
    norm_feed_forward: Option<LayerNorm<B>>,
}

impl<B: Backend> RelationalBlock<B> {
    fn new(embedding_dim: usize, num_heads: usize, layer_norm: bool, device: &B::Device) -> Self {
        Self {
            attention: BlockAttentionConfig::new(embedding_dim, num_heads).init(device),
            feed_forward: DenseConfig::new(embedding_dim, embedding_dim).init(device),
            norm_attention: layer_norm.then(|| LayerNorm::new(embedding_dim, device)),
            norm_feed_forward: layer_norm.then(|| LayerNorm::new(embedding_dim, device)),
        }
    }

    fn forward(&self, vertices: Tensor<B, 3>) -> Tensor<B, 3> {
        let attended = self.attention.self_attention(vertices.clone());
        let x = vertices + attended;
        let x = match &self.norm_attention {
            Some(norm) => norm.forward(x),
            None => x,
        };

        let updated = leaky_relu(self.feed_forward.forward_3d(x.clone()), LEAKY_SLOPE);
        let x = x + updated;
        match &self.norm_feed_forward {
            Some(norm) => norm.forward(x),
            None => x,
        }
    }
}

/// Stack of relational message-passing rounds.
#[derive(Module, Debug)]
pub struct GraphPropagation<B: Backend> {
    blocks: Vec<RelationalBlock<B>>,
    num_rounds: usize,
    embedding_dim: usize,
}

impl<B: Backend> GraphPropagation<B> {
    /// Propagate `[batch, num_blocks, embedding_dim]` vertex embeddings.
    pub fn forward(&self, vertices: Tensor<B, 3>) -> Tensor<B, 3> {
        let mut x = vertices;
        for round in 0..self.num_rounds {
            // With shared weights there is a single block at index 0.
            let block = &self.blocks[round % self.blocks.len()];
            x = block.forward(x);
        }
        x
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub fn num_rounds(&self) -> usize {
        self.num_rounds
    }

    pub fn is_recurrent(&self) -> bool {
        self.blocks.len() == 1 && self.num_rounds > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    fn get_device() -> <TestBackend as Backend>::Device {
        Default::default()
    }

    #[test]
    fn test_forward_preserves_shape() {
        let device = get_device();
        let graph: GraphPropagation<TestBackend> =
            GraphPropagationConfig::new(64, 4, 3).init(&device);

        let vertices = Tensor::random([2, 5, 64], Distribution::Normal(0.0, 1.0), &device);
        let out = graph.forward(vertices);
        assert_eq!(out.dims(), [2, 5, 64]);
    }

    #[test]
    fn test_recurrent_shares_weights() {
        let device = get_device();
        let graph: GraphPropagation<TestBackend> =
            GraphPropagationConfig::new(32, 2, 3).init(&device);
        assert!(graph.is_recurrent());
        assert_eq!(graph.blocks.len(), 1);
        assert_eq!(graph.num_rounds(), 3);
    }

    #[test]
    fn test_non_recurrent_has_distinct_blocks() {
        let device = get_device();
        let graph: GraphPropagation<TestBackend> = GraphPropagationConfig::new(32, 2, 3)
            .with_recurrent(false)
            .init(&device);
        assert!(!graph.is_recurrent());
        assert_eq!(graph.blocks.len(), 3);
    }

    #[test]
    fn test_without_layer_norm() {
        let device = get_device();
        let graph: GraphPropagation<TestBackend> = GraphPropagationConfig::new(16, 1, 2)
            .with_layer_norm(false)
            .init(&device);

        let vertices = Tensor::random([1, 3, 16], Distribution::Normal(0.0, 1.0), &device);
        let out = graph.forward(vertices);
        assert_eq!(out.dims(), [1, 3, 16]);
    }
}
