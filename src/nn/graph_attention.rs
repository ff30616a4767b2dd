//! Scaled dot-product attention over block embeddings.
//!
//! The block-construction scene is a fully connected graph whose vertices
//! are per-block embeddings. Message passing between vertices is multi-head
//! self-attention: every block attends to every block, including itself, so
//! relational structure (which block is stacked on which, which block the
//! gripper holds) can be read out of the pairwise interactions.

use burn::module::{Module, Param};
use burn::prelude::*;
use burn::tensor::Distribution;

/// Configuration for [`BlockAttention`].
#[derive(Debug, Clone)]
pub struct BlockAttentionConfig {
    /// Embedding dimension of each vertex (must be divisible by `num_heads`).
    pub embedding_dim: usize,
    /// Number of attention heads.
    pub num_heads: usize,
}

impl BlockAttentionConfig {
    pub fn new(embedding_dim: usize, num_heads: usize) -> Self {
        assert!(
            embedding_dim % num_heads == 0,
            "embedding_dim ({}) must be divisible by num_heads ({})",
            embedding_dim,
            num_heads
        );
        Self {
            embedding_dim,
            num_heads,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> BlockAttention<B> {
        let d = self.embedding_dim;
        let d_head = d / self.num_heads;
        let init_std = (2.0 / (d + d) as f64).sqrt();

        let projection = |device: &B::Device| {
            Param::from_tensor(Tensor::<B, 2>::random(
                [d, d],
                Distribution::Normal(0.0, init_std),
                device,
            ))
        };

        BlockAttention {
            w_query: projection(device),
            w_key: projection(device),
            w_value: projection(device),
            w_out: projection(device),
            num_heads: self.num_heads,
            embedding_dim: d,
            d_head,
            scale: (d_head as f32).sqrt(),
        }
    }
}

/// Multi-head attention between block vertices.
#[derive(Module, Debug)]
pub struct BlockAttention<B: Backend> {
    w_query: Param<Tensor<B, 2>>,
    w_key: Param<Tensor<B, 2>>,
    w_value: Param<Tensor<B, 2>>,
    w_out: Param<Tensor<B, 2>>,
    num_heads: usize,
    embedding_dim: usize,
    d_head: usize,
    scale: f32,
}

impl<B: Backend> BlockAttention<B> {
    /// Attend queries over keys/values.
    ///
    /// `query` is `[batch, n_query, embedding_dim]` and `key`/`value` are
    /// `[batch, n_vertex, embedding_dim]`. Output is
    /// `[batch, n_query, embedding_dim]`.
    pub fn forward(
        &self,
        query: Tensor<B, 3>,
        key: Tensor<B, 3>,
        value: Tensor<B, 3>,
    ) -> Tensor<B, 3> {
        let [batch, n_query, _] = query.dims();
        let [_, n_vertex, _] = key.dims();

        let q = self.project(query, &self.w_query);
        let k = self.project(key, &self.w_key);
        let v = self.project(value, &self.w_value);

        // [batch, seq, d] -> [batch, heads, seq, d_head]
        let q = q
            .reshape([batch, n_query, self.num_heads, self.d_head])
            .swap_dims(1, 2);
        let k = k
            .reshape([batch, n_vertex, self.num_heads, self.d_head])
            .swap_dims(1, 2);
        let v = v
            .reshape([batch, n_vertex, self.num_heads, self.d_head])
            .swap_dims(1, 2);

        let scores = q.matmul(k.swap_dims(2, 3)) / self.scale;
        let weights = burn::tensor::activation::softmax(scores, 3);

        let attended = weights
            .matmul(v)
            .swap_dims(1, 2)
            .reshape([batch, n_query, self.embedding_dim]);

        self.project(attended, &self.w_out)
    }

    /// Self-attention over one set of vertices.
    pub fn self_attention(&self, vertices: Tensor<B, 3>) -> Tensor<B, 3> {
        self.forward(vertices.clone(), vertices.clone(), vertices)
    }

    fn project(&self, x: Tensor<B, 3>, weight: &Param<Tensor<B, 2>>) -> Tensor<B, 3> {
        let [batch, seq, _] = x.dims();
        x.reshape([batch * seq, self.embedding_dim])
            .matmul(weight.val().transpose())
            .reshape([batch, seq, self.embedding_dim])
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    pub fn num_heads(&self) -> usize {
        self.num_heads
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
    fn test_self_attention_shape() {
        let device = get_device();
        let attention: BlockAttention<TestBackend> =
            BlockAttentionConfig::new(64, 4).init(&device);

        let vertices = Tensor::random([2, 3, 64], Distribution::Normal(0.0, 1.0), &device);
        let out = attention.self_attention(vertices);
        assert_eq!(out.dims(), [2, 3, 64]);
    }

    #[test]
    fn test_query_count_sets_output_rows() {
        let device = get_device();
        let attention: BlockAttention<TestBackend> =
            BlockAttentionConfig::new(32, 2).init(&device);

        let query = Tensor::random([2, 5, 32], Distribution::Normal(0.0, 1.0), &device);
        let kv = Tensor::random([2, 9, 32], Distribution::Normal(0.0, 1.0), &device);
        let out = attention.forward(query, kv.clone(), kv);
        assert_eq!(out.dims(), [2, 5, 32]);
    }

    #[test]
    fn test_single_vertex_is_projection_only() {
        let device = get_device();
        let attention: BlockAttention<TestBackend> =
            BlockAttentionConfig::new(16, 1).init(&device);

        // One vertex attends only to itself; output must still be finite
        // and correctly shaped.
        let vertices = Tensor::random([1, 1, 16], Distribution::Normal(0.0, 1.0), &device);
        let out = attention.self_attention(vertices);
        assert_eq!(out.dims(), [1, 1, 16]);
    }

    #[test]
    #[should_panic(expected = "must be divisible")]
    fn test_invalid_head_count() {
        let _ = BlockAttentionConfig::new(65, 4);
    }
}
