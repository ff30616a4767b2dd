//! Polyak-averaged target networks.
//!
//! The TD targets for the twin Q-functions bootstrap through a slowly
//! moving copy of the value function:
//!
//! ```text
//! θ_target = τ * θ_online + (1 - τ) * θ_target
//! ```
//!
//! Parameters are matched between the two modules by traversal order, which
//! is deterministic for modules of identical architecture. Tensors are
//! flattened to 1D for storage so parameters of different ranks can live in
//! one collection.

use burn::module::{Module, ModuleMapper, ParamId};
use burn::prelude::*;

/// Collects every float parameter of a module, flattened to 1D.
struct ParamCollector<B: Backend> {
    params: Vec<Tensor<B, 1>>,
}

impl<B: Backend> ParamCollector<B> {
    fn new() -> Self {
        Self { params: Vec::new() }
    }
}

impl<B: Backend> ModuleMapper<B> for ParamCollector<B> {
    fn map_float<const D: usize>(&mut self, _id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let total: usize = tensor.dims().iter().product();
        self.params.push(tensor.clone().reshape([total]));
        tensor
    }
}

/// Interpolates target parameters toward the collected online parameters.
struct PolyakMapper<B: Backend> {
    online: Vec<Tensor<B, 1>>,
    tau: f32,
    index: usize,
}

impl<B: Backend> ModuleMapper<B> for PolyakMapper<B> {
    fn map_float<const D: usize>(&mut self, _id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let shape = tensor.dims();
        let total: usize = shape.iter().product();

        let idx = self.index;
        self.index += 1;

        match self.online.get(idx) {
            Some(online) => {
                let mixed = online.clone().mul_scalar(self.tau)
                    + tensor.reshape([total]).mul_scalar(1.0 - self.tau);
                mixed.reshape(shape)
            }
            // Architectures are expected to match; keep the target param if not.
            None => tensor,
        }
    }
}

/// Polyak-average the target module toward the online module.
///
/// Returns the updated target. `tau = 1` is a hard copy, `tau = 0` leaves
/// the target untouched.
pub fn soft_update<B, M>(online: &M, target: M, tau: f32) -> M
where
    B: Backend,
    M: Module<B>,
{
    if (tau - 1.0).abs() < 1e-6 {
        return online.clone();
    }
    if tau.abs() < 1e-6 {
        return target;
    }

    let mut collector = ParamCollector::new();
    let _ = online.clone().map(&mut collector);

    let mut mapper = PolyakMapper {
        online: collector.params,
        tau,
        index: 0,
    };
    target.map(&mut mapper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::module::Param;

    type B = NdArray<f32>;

    #[derive(Module, Debug)]
    struct Toy<B: Backend> {
        w: Param<Tensor<B, 2>>,
    }

    fn toy(value: f32, device: &<B as Backend>::Device) -> Toy<B> {
        Toy {
            w: Param::from_tensor(Tensor::ones([2, 2], device).mul_scalar(value)),
        }
    }

    fn first_weight(m: &Toy<B>) -> f32 {
        m.w.val().into_data().as_slice::<f32>().unwrap()[0]
    }

    #[test]
    fn test_soft_update_interpolates() {
        let device = Default::default();
        let online = toy(1.0, &device);
        let target = toy(0.0, &device);

        let updated = soft_update(&online, target, 0.1);
        assert!((first_weight(&updated) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_tau_one_is_hard_copy() {
        let device = Default::default();
        let online = toy(3.0, &device);
        let target = toy(0.0, &device);

        let updated = soft_update(&online, target, 1.0);
        assert!((first_weight(&updated) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_tau_zero_is_noop() {
        let device = Default::default();
        let online = toy(3.0, &device);
        let target = toy(0.5, &device);

        let updated = soft_update(&online, target, 0.0);
        assert!((first_weight(&updated) - 0.5).abs() < 1e-6);
    }

    #[derive(Module, Debug)]
    struct MixedRank<B: Backend> {
        w: Param<Tensor<B, 2>>,
        b: Param<Tensor<B, 1>>,
    }

    #[test]
    fn test_mixed_rank_params_update_in_order() {
        let device: <B as Backend>::Device = Default::default();
        let online = MixedRank::<B> {
            w: Param::from_tensor(Tensor::ones([2, 3], &device)),
            b: Param::from_tensor(Tensor::ones([3], &device).mul_scalar(2.0)),
        };
        let target = MixedRank::<B> {
            w: Param::from_tensor(Tensor::zeros([2, 3], &device)),
            b: Param::from_tensor(Tensor::zeros([3], &device)),
        };

        let updated = soft_update(&online, target, 0.5);
        let w = updated.w.val().into_data().as_slice::<f32>().unwrap()[0];
        let b = updated.b.val().into_data().as_slice::<f32>().unwrap()[0];
        assert!((w - 0.5).abs() < 1e-6);
        assert!((b - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_repeated_updates_converge() {
        let device = Default::default();
        let online = toy(1.0, &device);
        let mut target = toy(0.0, &device);

        for _ in 0..2000 {
            target = soft_update(&online, target, 0.01);
        }
        assert!((first_weight(&target) - 1.0).abs() < 1e-3);
    }
}
