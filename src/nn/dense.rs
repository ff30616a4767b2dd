//! Basic dense building blocks: linear layers, layer normalization, and
//! a small multilayer perceptron used for readout heads.

use burn::module::{Module, Param};
use burn::prelude::*;
use burn::tensor::activation::leaky_relu;
use burn::tensor::Distribution;

/// Negative slope used by every leaky ReLU in the relational networks.
pub const LEAKY_SLOPE: f64 = 0.01;

// ============================================================================
// Dense layer
// ============================================================================

/// Configuration for a [`Dense`] layer.
#[derive(Debug, Clone)]
pub struct DenseConfig {
    pub d_input: usize,
    pub d_output: usize,
    pub bias: bool,
}

impl DenseConfig {
    pub fn new(d_input: usize, d_output: usize) -> Self {
        Self {
            d_input,
            d_output,
            bias: true,
        }
    }

    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    /// Initialize with Xavier-normal weights.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Dense<B> {
        let init_std = (2.0 / (self.d_input + self.d_output) as f64).sqrt();
        let weight = Tensor::<B, 2>::random(
            [self.d_output, self.d_input],
            Distribution::Normal(0.0, init_std),
            device,
        );
        let bias = self
            .bias
            .then(|| Param::from_tensor(Tensor::zeros([self.d_output], device)));

        Dense {
            weight: Param::from_tensor(weight),
            bias,
            d_input: self.d_input,
            d_output: self.d_output,
        }
    }
}

/// Fully connected layer, `y = x W^T + b`.
#[derive(Module, Debug)]
pub struct Dense<B: Backend> {
    /// Weight matrix of shape [d_output, d_input].
    weight: Param<Tensor<B, 2>>,
    bias: Option<Param<Tensor<B, 1>>>,
    d_input: usize,
    d_output: usize,
}

impl<B: Backend> Dense<B> {
    /// Forward for `[batch, d_input]` input.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let output = input.matmul(self.weight.val().transpose());
        match &self.bias {
            Some(bias) => output + bias.val().unsqueeze_dim(0),
            None => output,
        }
    }

    /// Forward for `[batch, seq, d_input]` input.
    pub fn forward_3d(&self, input: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, seq, _] = input.dims();
        let flat = input.reshape([batch * seq, self.d_input]);
        self.forward(flat).reshape([batch, seq, self.d_output])
    }

    pub fn d_input(&self) -> usize {
        self.d_input
    }

    pub fn d_output(&self) -> usize {
        self.d_output
    }
}

// ============================================================================
// Layer normalization
// ============================================================================

/// Layer normalization over the last dimension with learned scale and shift.
#[derive(Module, Debug)]
pub struct LayerNorm<B: Backend> {
    gamma: Param<Tensor<B, 1>>,
    beta: Param<Tensor<B, 1>>,
    epsilon: f64,
}

impl<B: Backend> LayerNorm<B> {
    pub fn new(d_model: usize, device: &B::Device) -> Self {
        Self {
            gamma: Param::from_tensor(Tensor::ones([d_model], device)),
            beta: Param::from_tensor(Tensor::zeros([d_model], device)),
            epsilon: 1e-5,
        }
    }

    pub fn forward<const D: usize>(&self, input: Tensor<B, D>) -> Tensor<B, D> {
        let mean = input.clone().mean_dim(D - 1);
        let centered = input - mean;
        let var = centered.clone().powf_scalar(2.0).mean_dim(D - 1);
        let normed = centered / var.add_scalar(self.epsilon).sqrt();

        let gamma = self.gamma.val().unsqueeze::<D>();
        let beta = self.beta.val().unsqueeze::<D>();
        normed * gamma + beta
    }
}

// ============================================================================
// MLP
// ============================================================================

/// Configuration for an [`Mlp`] readout head.
#[derive(Debug, Clone)]
pub struct MlpConfig {
    pub d_input: usize,
    pub hidden_sizes: Vec<usize>,
    pub d_output: usize,
}

impl MlpConfig {
    pub fn new(d_input: usize, hidden_sizes: Vec<usize>, d_output: usize) -> Self {
        Self {
            d_input,
            hidden_sizes,
            d_output,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        let mut layers = Vec::with_capacity(self.hidden_sizes.len() + 1);
        let mut d_in = self.d_input;
        for &d_hidden in &self.hidden_sizes {
            layers.push(DenseConfig::new(d_in, d_hidden).init(device));
            d_in = d_hidden;
        }
        layers.push(DenseConfig::new(d_in, self.d_output).init(device));
        Mlp { layers }
    }
}

/// Stack of dense layers with leaky-ReLU activations between them.
///
/// The final layer is linear.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    layers: Vec<Dense<B>>,
}

impl<B: Backend> Mlp<B> {
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let last = self.layers.len() - 1;
        let mut x = input;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if i < last {
                x = leaky_relu(x, LEAKY_SLOPE);
            }
        }
        x
    }

    pub fn d_input(&self) -> usize {
        self.layers[0].d_input()
    }

    pub fn d_output(&self) -> usize {
        self.layers[self.layers.len() - 1].d_output()
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
    fn test_dense_forward_shapes() {
        let device = get_device();
        let dense: Dense<TestBackend> = DenseConfig::new(5, 3).init(&device);

        let out = dense.forward(Tensor::zeros([4, 5], &device));
        assert_eq!(out.dims(), [4, 3]);

        let out = dense.forward_3d(Tensor::zeros([4, 2, 5], &device));
        assert_eq!(out.dims(), [4, 2, 3]);
    }

    #[test]
    fn test_dense_no_bias_zero_input_is_zero() {
        let device = get_device();
        let dense: Dense<TestBackend> = DenseConfig::new(5, 3).with_bias(false).init(&device);
        let out = dense.forward(Tensor::zeros([1, 5], &device));
        let sum: f32 = out.abs().sum().into_scalar();
        assert_eq!(sum, 0.0);
    }

    #[test]
    fn test_layer_norm_standardizes() {
        let device = get_device();
        let ln: LayerNorm<TestBackend> = LayerNorm::new(4, &device);

        let input = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0, 4.0]], &device);
        let out = ln.forward(input);

        let mean: f32 = out.clone().mean().into_scalar();
        assert!(mean.abs() < 1e-5);
        let var: f32 = out.powf_scalar(2.0).mean().into_scalar();
        assert!((var - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_mlp_shapes() {
        let device = get_device();
        let mlp: Mlp<TestBackend> = MlpConfig::new(6, vec![16, 16], 1).init(&device);

        assert_eq!(mlp.d_input(), 6);
        assert_eq!(mlp.d_output(), 1);

        let out = mlp.forward(Tensor::zeros([3, 6], &device));
        assert_eq!(out.dims(), [3, 1]);
    }
}
