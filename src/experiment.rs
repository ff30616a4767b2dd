//! Experiment assembly for block-construction runs.
//!
//! Construction order is fixed by the sharing structure: the normalizer is
//! built once and handed into every network; networks come before the
//! algorithm; the environment comes before the buffer and the algorithm.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::algorithms::HerTwinSac;
use crate::buffers::ObsDictRelabelingBuffer;
use crate::core::normalizer::{CompositeNormalizer, SharedCompositeNormalizer};
use crate::envs::make_env;
use crate::launch::{LaunchContext, LaunchError, Variant};
use crate::nn::{PolicyNet, QValueNet, ValueNet};

/// The networks of one run, all bound to the same normalizer.
pub struct NetworkSet<B: Backend> {
    pub policy: PolicyNet<B>,
    pub qf1: QValueNet<B>,
    pub qf2: QValueNet<B>,
    pub vf: ValueNet<B>,
    pub normalizer: SharedCompositeNormalizer,
}

/// Build the policy, twin Q-functions, and value function from a variant.
///
/// The normalizer is constructed once; every network holds a clone of the
/// same shared handle, never an independent copy.
pub fn build_networks<B: Backend>(variant: &Variant, device: &B::Device) -> NetworkSet<B> {
    let normalizer = SharedCompositeNormalizer::new(CompositeNormalizer::new(
        variant.obs_dims(),
        variant.action_dim,
    ));
    let config = variant.net_config();

    NetworkSet {
        policy: config.init_policy(normalizer.clone(), device),
        qf1: config.init_q(normalizer.clone(), device),
        qf2: config.init_q(normalizer.clone(), device),
        vf: config.init_value(normalizer.clone(), device),
        normalizer,
    }
}

/// The experiment function handed to `run_experiment`: resolve the
/// environment, assemble networks, buffer, and trainer, then train.
pub fn block_construction_experiment<B: AutodiffBackend>(
    variant: &Variant,
    mut ctx: LaunchContext,
    device: B::Device,
) -> Result<(), LaunchError> {
    let mut env = make_env(&variant.env_id)?;
    env.seed(ctx.seed);
    env.set_render(variant.render);
    if let Some(steps) = variant.max_episode_steps {
        env.set_max_episode_steps(steps);
    }

    let networks = build_networks::<B>(variant, &device);

    let buffer = ObsDictRelabelingBuffer::new(variant.replay_buffer_kwargs.clone());
    buffer.seed(ctx.seed);

    let mut trainer = HerTwinSac::new(
        networks.policy,
        networks.qf1,
        networks.qf2,
        networks.vf,
        variant.algo_kwargs.clone(),
        variant.her_kwargs.clone(),
        device,
    );

    trainer.train(
        env.as_mut(),
        &buffer,
        &mut ctx.logger,
        Some(&ctx.checkpointer),
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_networks_share_the_normalizer() {
        let device = Default::default();
        let variant = Variant::pick_and_place(1, false);
        let nets = build_networks::<TestBackend>(&variant, &device);

        assert!(nets.policy.normalizer().ptr_eq(&nets.normalizer));
        assert!(nets.qf1.normalizer().ptr_eq(&nets.normalizer));
        assert!(nets.qf2.normalizer().ptr_eq(&nets.normalizer));
        assert!(nets.vf.normalizer().ptr_eq(&nets.normalizer));
    }

    #[test]
    fn test_variant_knobs_reach_every_network() {
        let device = Default::default();
        let mut variant = Variant::pick_and_place(1, false);
        variant.embedding_dim = 32;
        variant.num_query_heads = 2;

        let nets = build_networks::<TestBackend>(&variant, &device);
        assert_eq!(nets.policy.embedding_dim(), 32);
        assert_eq!(nets.qf1.embedding_dim(), 32);
        assert_eq!(nets.vf.embedding_dim(), 32);
        assert_eq!(nets.policy.pooling_input_size(), 64);
        assert_eq!(nets.qf2.pooling_input_size(), 64);
    }

    #[test]
    fn test_normalizer_matches_environment_layout() {
        let device = Default::default();
        let variant = Variant::pick_and_place(2, false);
        let nets = build_networks::<TestBackend>(&variant, &device);

        // shared 10 + object 15 + goal 3
        assert_eq!(nets.normalizer.row_dim(), 28);
        assert_eq!(nets.normalizer.action_dim(), 4);
    }
}
