//! Tanh-squashed Gaussian action distribution.
//!
//! The policy emits a Gaussian in pre-squash space; actions are `tanh` of a
//! reparameterized sample, so they stay inside the unit box and gradients
//! flow from the critic through the sample back into the policy.
//!
//! The log-density accounts for the squashing with the numerically stable
//! form of `log(1 - tanh(u)^2)`:
//!
//! ```text
//! log(1 - tanh(u)^2) = 2 * (log 2 - u - softplus(-2u))
//! ```

use burn::prelude::*;
use burn::tensor::activation::softplus;
use burn::tensor::Distribution;

/// Lower bound on the policy's log standard deviation.
pub const LOG_STD_MIN: f32 = -20.0;
/// Upper bound on the policy's log standard deviation.
pub const LOG_STD_MAX: f32 = 2.0;

const LN_2: f32 = std::f32::consts::LN_2;
const LN_SQRT_2PI: f32 = 0.918_938_5;

/// Clamp a log-std head output into `[LOG_STD_MIN, LOG_STD_MAX]`.
pub fn clamp_log_std<B: Backend>(log_std: Tensor<B, 2>) -> Tensor<B, 2> {
    log_std.clamp(LOG_STD_MIN, LOG_STD_MAX)
}

/// Reparameterized sample from the squashed Gaussian.
///
/// Returns `(action, log_prob)` with shapes `[batch, action_dim]` and
/// `[batch, 1]`. The log-prob is summed over action dimensions.
pub fn sample_squashed<B: Backend>(
    mean: Tensor<B, 2>,
    log_std: Tensor<B, 2>,
    device: &B::Device,
) -> (Tensor<B, 2>, Tensor<B, 2>) {
    let dims = mean.dims();
    let noise = Tensor::<B, 2>::random(dims, Distribution::Normal(0.0, 1.0), device);

    let std = log_std.clone().exp();
    let pre_squash = mean + std * noise.clone();
    let action = pre_squash.clone().tanh();

    // Gaussian log-density of the pre-squash sample, per dimension:
    // -0.5 * eps^2 - log_std - log(sqrt(2 pi))
    let gaussian = noise.powf_scalar(2.0).mul_scalar(-0.5) - log_std - LN_SQRT_2PI;
    let correction = squash_correction(pre_squash);

    let log_prob = (gaussian - correction).sum_dim(1);
    (action, log_prob)
}

/// Per-dimension `log(1 - tanh(u)^2)` in its stable form.
fn squash_correction<B: Backend>(pre_squash: Tensor<B, 2>) -> Tensor<B, 2> {
    (-(pre_squash.clone()) - softplus(pre_squash.mul_scalar(-2.0), 1.0))
        .mul_scalar(2.0)
        .add_scalar(2.0 * LN_2)
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
    fn test_clamp_log_std_bounds() {
        let device = get_device();
        let raw = Tensor::<TestBackend, 2>::from_floats([[-50.0, 0.0, 50.0]], &device);
        let clamped = clamp_log_std(raw);
        let values: Vec<f32> = clamped.into_data().to_vec().unwrap();
        assert_eq!(values, vec![LOG_STD_MIN, 0.0, LOG_STD_MAX]);
    }

    #[test]
    fn test_sample_stays_in_unit_box() {
        let device = get_device();
        let mean = Tensor::<TestBackend, 2>::zeros([64, 4], &device);
        let log_std = Tensor::<TestBackend, 2>::ones([64, 4], &device);

        let (action, log_prob) = sample_squashed(mean, log_std, &device);
        assert_eq!(action.dims(), [64, 4]);
        assert_eq!(log_prob.dims(), [64, 1]);

        let max: f32 = action.abs().max().into_scalar();
        assert!(max < 1.0);
    }

    #[test]
    fn test_log_prob_finite_at_extremes() {
        let device = get_device();
        // Large means push tanh into saturation where the naive
        // log(1 - a^2) would overflow.
        let mean = Tensor::<TestBackend, 2>::from_floats([[8.0, -8.0]], &device);
        let log_std = Tensor::<TestBackend, 2>::from_floats([[-3.0, -3.0]], &device);

        let (_, log_prob) = sample_squashed(mean, log_std, &device);
        let value: f32 = log_prob.into_scalar();
        assert!(value.is_finite());
    }

    #[test]
    fn test_tight_gaussian_log_prob_is_high() {
        let device = get_device();
        let mean = Tensor::<TestBackend, 2>::zeros([1, 1], &device);
        let tight = Tensor::<TestBackend, 2>::from_floats([[-4.0]], &device);
        let wide = Tensor::<TestBackend, 2>::from_floats([[1.0]], &device);

        let (_, lp_tight) = sample_squashed(mean.clone(), tight, &device);
        let (_, lp_wide) = sample_squashed(mean, wide, &device);

        let tight_val: f32 = lp_tight.into_scalar();
        let wide_val: f32 = lp_wide.into_scalar();
        assert!(tight_val > wide_val);
    }

    #[test]
    fn test_correction_matches_direct_formula() {
        let device = get_device();
        let u = Tensor::<TestBackend, 2>::from_floats([[0.5, -1.0, 2.0]], &device);

        let stable: Vec<f32> = squash_correction(u.clone()).into_data().to_vec().unwrap();
        let direct: Vec<f32> = u
            .tanh()
            .powf_scalar(2.0)
            .neg()
            .add_scalar(1.0)
            .log()
            .into_data()
            .to_vec()
            .unwrap();

        for (s, d) in stable.iter().zip(&direct) {
            assert!((s - d).abs() < 1e-4);
        }
    }
}
