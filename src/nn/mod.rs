//! Relational neural networks for goal-conditioned manipulation.

pub mod dense;
pub mod graph_attention;
pub mod graph_propagation;
pub mod input_module;
pub mod networks;
pub mod pooling;

pub use dense::{Dense, DenseConfig, LayerNorm, Mlp, MlpConfig};
pub use graph_attention::{BlockAttention, BlockAttentionConfig};
pub use graph_propagation::{GraphPropagation, GraphPropagationConfig};
pub use input_module::{FetchInputModule, FetchInputModuleConfig};
pub use networks::{PolicyNet, QValueNet, RelationalNetConfig, ValueNet};
pub use pooling::{AttentiveGraphPooling, AttentiveGraphPoolingConfig};
