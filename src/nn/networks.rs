//! Value, twin-Q, and policy networks over the relational backbone.
//!
//! All three network kinds share one architecture: embed dict observations
//! into per-block vertices, run relational message passing, pool with
//! learned queries, then read out through an MLP head. They differ only in
//! the input (the Q-function also sees the action) and the head (the policy
//! emits a squashed-Gaussian mean and log-std per action dimension).

use burn::module::Module;
use burn::prelude::*;
use burn::tensor::activation::leaky_relu;

use crate::algorithms::squashed_gaussian::clamp_log_std;
use crate::core::normalizer::SharedCompositeNormalizer;

use super::dense::{Dense, DenseConfig, Mlp, MlpConfig, LEAKY_SLOPE};
use super::graph_propagation::{GraphPropagation, GraphPropagationConfig};
use super::input_module::{FetchInputModule, FetchInputModuleConfig};
use super::pooling::{AttentiveGraphPooling, AttentiveGraphPoolingConfig};

/// Shared configuration for the relational networks of one experiment.
///
/// `embedding_dim` and the head counts flow through every stage: the input
/// embedding, each relational block, the pooling queries, and the readout
/// input, which is always `num_query_heads * embedding_dim`.
#[derive(Debug, Clone)]
pub struct RelationalNetConfig {
    pub embedding_dim: usize,
    /// Attention heads inside each relational block.
    pub num_heads: usize,
    /// Learned pooling queries.
    pub num_query_heads: usize,
    /// Message-passing rounds.
    pub num_relational_blocks: usize,
    pub layer_norm: bool,
    /// Share relational-block weights across rounds.
    pub recurrent_graph: bool,
    /// Hidden sizes of the readout MLP.
    pub readout_hidden: Vec<usize>,
}

impl RelationalNetConfig {
    pub fn new(embedding_dim: usize) -> Self {
        Self {
            embedding_dim,
            num_heads: 1,
            num_query_heads: 1,
            num_relational_blocks: 3,
            layer_norm: true,
            recurrent_graph: true,
            readout_hidden: vec![64, 64],
        }
    }

    pub fn with_num_heads(mut self, num_heads: usize) -> Self {
        self.num_heads = num_heads;
        self
    }

    pub fn with_num_query_heads(mut self, num_query_heads: usize) -> Self {
        self.num_query_heads = num_query_heads;
        self
    }

    pub fn with_num_relational_blocks(mut self, num_relational_blocks: usize) -> Self {
        self.num_relational_blocks = num_relational_blocks;
        self
    }

    pub fn with_layer_norm(mut self, layer_norm: bool) -> Self {
        self.layer_norm = layer_norm;
        self
    }

    pub fn with_recurrent_graph(mut self, recurrent_graph: bool) -> Self {
        self.recurrent_graph = recurrent_graph;
        self
    }

    pub fn with_readout_hidden(mut self, readout_hidden: Vec<usize>) -> Self {
        self.readout_hidden = readout_hidden;
        self
    }

    /// Pooled readout size fed into every head.
    pub fn pooling_input_size(&self) -> usize {
        self.num_query_heads * self.embedding_dim
    }

    fn backbone<B: Backend>(
        &self,
        normalizer: SharedCompositeNormalizer,
        with_action: bool,
        device: &B::Device,
    ) -> (FetchInputModule<B>, GraphPropagation<B>, AttentiveGraphPooling<B>) {
        let input = FetchInputModuleConfig::new(self.embedding_dim)
            .with_action(with_action)
            .with_layer_norm(self.layer_norm)
            .init(normalizer, device);
        let graph = GraphPropagationConfig::new(
            self.embedding_dim,
            self.num_heads,
            self.num_relational_blocks,
        )
        .with_layer_norm(self.layer_norm)
        .with_recurrent(self.recurrent_graph)
        .init(device);
        let pooling = AttentiveGraphPoolingConfig::new(
            self.embedding_dim,
            self.num_query_heads,
            self.num_heads,
        )
        .init(device);

        (input, graph, pooling)
    }

    /// Build a state-value network.
    pub fn init_value<B: Backend>(
        &self,
        normalizer: SharedCompositeNormalizer,
        device: &B::Device,
    ) -> ValueNet<B> {
        let (input, graph, pooling) = self.backbone(normalizer, false, device);
        let readout =
            MlpConfig::new(self.pooling_input_size(), self.readout_hidden.clone(), 1).init(device);

        ValueNet {
            input,
            graph,
            pooling,
            readout,
        }
    }

    /// Build an action-value network.
    pub fn init_q<B: Backend>(
        &self,
        normalizer: SharedCompositeNormalizer,
        device: &B::Device,
    ) -> QValueNet<B> {
        let (input, graph, pooling) = self.backbone(normalizer, true, device);
        let readout =
            MlpConfig::new(self.pooling_input_size(), self.readout_hidden.clone(), 1).init(device);

        QValueNet {
            input,
            graph,
            pooling,
            readout,
        }
    }

    /// Build a squashed-Gaussian policy network.
    pub fn init_policy<B: Backend>(
        &self,
        normalizer: SharedCompositeNormalizer,
        device: &B::Device,
    ) -> PolicyNet<B> {
        let action_dim = normalizer.action_dim();
        let (input, graph, pooling) = self.backbone(normalizer, false, device);

        let trunk_out = *self.readout_hidden.last().unwrap_or(&self.pooling_input_size());
        let hidden = if self.readout_hidden.is_empty() {
            Vec::new()
        } else {
            self.readout_hidden[..self.readout_hidden.len() - 1].to_vec()
        };
        let trunk = MlpConfig::new(self.pooling_input_size(), hidden, trunk_out).init(device);

        PolicyNet {
            input,
            graph,
            pooling,
            trunk,
            mean_head: DenseConfig::new(trunk_out, action_dim).init(device),
            log_std_head: DenseConfig::new(trunk_out, action_dim).init(device),
        }
    }
}

// ============================================================================
// Value network
// ============================================================================

/// State-value network `V(s, g)`.
#[derive(Module, Debug)]
pub struct ValueNet<B: Backend> {
    input: FetchInputModule<B>,
    graph: GraphPropagation<B>,
    pooling: AttentiveGraphPooling<B>,
    readout: Mlp<B>,
}

impl<B: Backend> ValueNet<B> {
    /// Value estimates of shape `[batch, 1]`.
    pub fn forward(
        &self,
        observations: &[Vec<f32>],
        goals: &[Vec<f32>],
        num_blocks: usize,
        device: &B::Device,
    ) -> Tensor<B, 2> {
        let vertices = self.input.forward(observations, goals, num_blocks, device);
        let pooled = self.pooling.forward(self.graph.forward(vertices));
        self.readout.forward(pooled)
    }

    pub fn normalizer(&self) -> &SharedCompositeNormalizer {
        self.input.normalizer()
    }

    pub fn embedding_dim(&self) -> usize {
        self.input.embedding_dim()
    }

    pub fn pooling_input_size(&self) -> usize {
        self.pooling.output_dim()
    }
}

// ============================================================================
// Q network
// ============================================================================

/// Action-value network `Q(s, a, g)`.
///
/// The action arrives as a tensor so critic gradients reach actions sampled
/// from the policy.
#[derive(Module, Debug)]
pub struct QValueNet<B: Backend> {
    input: FetchInputModule<B>,
    graph: GraphPropagation<B>,
    pooling: AttentiveGraphPooling<B>,
    readout: Mlp<B>,
}

impl<B: Backend> QValueNet<B> {
    /// Q estimates of shape `[batch, 1]` for a `[batch, action_dim]` action
    /// tensor.
    pub fn forward(
        &self,
        observations: &[Vec<f32>],
        goals: &[Vec<f32>],
        actions: Tensor<B, 2>,
        num_blocks: usize,
        device: &B::Device,
    ) -> Tensor<B, 2> {
        let vertices =
            self.input
                .forward_with_actions(observations, goals, actions, num_blocks, device);
        let pooled = self.pooling.forward(self.graph.forward(vertices));
        self.readout.forward(pooled)
    }

    pub fn normalizer(&self) -> &SharedCompositeNormalizer {
        self.input.normalizer()
    }

    pub fn embedding_dim(&self) -> usize {
        self.input.embedding_dim()
    }

    pub fn pooling_input_size(&self) -> usize {
        self.pooling.output_dim()
    }
}

// ============================================================================
// Policy network
// ============================================================================

/// Squashed-Gaussian policy network `π(a | s, g)`.
#[derive(Module, Debug)]
pub struct PolicyNet<B: Backend> {
    input: FetchInputModule<B>,
    graph: GraphPropagation<B>,
    pooling: AttentiveGraphPooling<B>,
    trunk: Mlp<B>,
    mean_head: Dense<B>,
    log_std_head: Dense<B>,
}

impl<B: Backend> PolicyNet<B> {
    /// Pre-squash mean and clamped log standard deviation, each of shape
    /// `[batch, action_dim]`.
    pub fn forward(
        &self,
        observations: &[Vec<f32>],
        goals: &[Vec<f32>],
        num_blocks: usize,
        device: &B::Device,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let vertices = self.input.forward(observations, goals, num_blocks, device);
        let pooled = self.pooling.forward(self.graph.forward(vertices));
        let features = leaky_relu(self.trunk.forward(pooled), LEAKY_SLOPE);

        let mean = self.mean_head.forward(features.clone());
        let log_std = clamp_log_std(self.log_std_head.forward(features));
        (mean, log_std)
    }

    /// Deterministic action, `tanh(mean)`.
    pub fn deterministic_action(
        &self,
        observations: &[Vec<f32>],
        goals: &[Vec<f32>],
        num_blocks: usize,
        device: &B::Device,
    ) -> Tensor<B, 2> {
        let (mean, _) = self.forward(observations, goals, num_blocks, device);
        mean.tanh()
    }

    pub fn normalizer(&self) -> &SharedCompositeNormalizer {
        self.input.normalizer()
    }

    pub fn embedding_dim(&self) -> usize {
        self.input.embedding_dim()
    }

    pub fn pooling_input_size(&self) -> usize {
        self.pooling.output_dim()
    }

    pub fn action_dim(&self) -> usize {
        self.mean_head.d_output()
    }
}
