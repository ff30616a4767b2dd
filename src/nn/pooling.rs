//! Attentive pooling from a variable number of block vertices to a fixed
//! readout vector.
//!
//! After message passing, the per-block embeddings are summarized by a set
//! of learned query vectors. Each query head cross-attends over all blocks,
//! and the attended results are concatenated, so the readout size is always
//! `num_query_heads * embedding_dim` no matter how many blocks the scene
//! contains.

use burn::module::{Module, Param};
use burn::prelude::*;
use burn::tensor::Distribution;

use super::graph_attention::{BlockAttention, BlockAttentionConfig};

/// Configuration for [`AttentiveGraphPooling`].
#[derive(Debug, Clone)]
pub struct AttentiveGraphPoolingConfig {
    pub embedding_dim: usize,
    /// Number of learned query vectors.
    pub num_query_heads: usize,
    /// Attention heads used inside the cross-attention.
    pub num_heads: usize,
}

impl AttentiveGraphPoolingConfig {
    pub fn new(embedding_dim: usize, num_query_heads: usize, num_heads: usize) -> Self {
        Self {
            embedding_dim,
            num_query_heads,
            num_heads,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> AttentiveGraphPooling<B> {
        let init_std = (1.0 / self.embedding_dim as f64).sqrt();
        let queries = Tensor::<B, 2>::random(
            [self.num_query_heads, self.embedding_dim],
            Distribution::Normal(0.0, init_std),
            device,
        );

        AttentiveGraphPooling {
            queries: Param::from_tensor(queries),
            attention: BlockAttentionConfig::new(self.embedding_dim, self.num_heads).init(device),
            num_query_heads: self.num_query_heads,
            embedding_dim: self.embedding_dim,
        }
    }
}

/// Learned-query pooling over block embeddings.
#[derive(Module, Debug)]
pub struct AttentiveGraphPooling<B: Backend> {
    /// Learned queries of shape [num_query_heads, embedding_dim].
    queries: Param<Tensor<B, 2>>,
    attention: BlockAttention<B>,
    num_query_heads: usize,
    embedding_dim: usize,
}

impl<B: Backend> AttentiveGraphPooling<B> {
    /// Pool `[batch, num_blocks, embedding_dim]` vertices down to
    /// `[batch, num_query_heads * embedding_dim]`.
    pub fn forward(&self, vertices: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch, _, _] = vertices.dims();

        let queries = self
            .queries
            .val()
            .unsqueeze_dim::<3>(0)
            .expand([batch, self.num_query_heads, self.embedding_dim]);

        let attended = self.attention.forward(queries, vertices.clone(), vertices);
        attended.reshape([batch, self.num_query_heads * self.embedding_dim])
    }

    /// Size of the pooled readout vector.
    pub fn output_dim(&self) -> usize {
        self.num_query_heads * self.embedding_dim
    }

    pub fn num_query_heads(&self) -> usize {
        self.num_query_heads
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn get_device() -> <TestBackend as Backend>::Device {
        Default::default()
    }

    #[test]
    fn test_pooled_size_is_heads_times_embedding() {
        let device = get_device();
        let pooling: AttentiveGraphPooling<TestBackend> =
            AttentiveGraphPoolingConfig::new(64, 3, 4).init(&device);

        assert_eq!(pooling.output_dim(), 192);

        let vertices = Tensor::random([2, 5, 64], Distribution::Normal(0.0, 1.0), &device);
        let out = pooling.forward(vertices);
        assert_eq!(out.dims(), [2, 192]);
    }

    #[test]
    fn test_output_size_independent_of_block_count() {
        let device = get_device();
        let pooling: AttentiveGraphPooling<TestBackend> =
            AttentiveGraphPoolingConfig::new(32, 2, 2).init(&device);

        for num_blocks in [1, 3, 7] {
            let vertices =
                Tensor::random([1, num_blocks, 32], Distribution::Normal(0.0, 1.0), &device);
            assert_eq!(pooling.forward(vertices).dims(), [1, 64]);
        }
    }
}
