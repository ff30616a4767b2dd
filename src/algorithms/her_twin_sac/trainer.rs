//! HER twin soft actor-critic trainer.
//!
//! Soft actor-critic with a state-value function and twin Q-functions,
//! trained on hindsight-relabeled batches:
//!
//! ```text
//! Q_target(s, a) = r + (1 - d) * gamma * V_target(s')
//! V_target(s)    = min_i Q_i(s, a~pi) - alpha * log pi(a~|s)
//! J(pi)          = E[alpha * log pi(a~|s) - min_i Q_i(s, a~)]
//! ```
//!
//! Each epoch collects rollout episodes into the relabeling buffer, runs a
//! fixed number of gradient updates, and periodically evaluates the
//! deterministic policy. The value target network trails the value
//! function by Polyak averaging.

use burn::grad_clipping::GradientClippingConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, TensorData};

use crate::buffers::{HerBatch, ObsDictRelabelingBuffer};
use crate::checkpoint::Checkpointer;
use crate::core::path::{GoalStep, Path};
use crate::core::target_network::soft_update;
use crate::envs::goal_env::{GoalEnv, GoalObservation};
use crate::metrics::{EpochSnapshot, MetricsLogger};
use crate::nn::{PolicyNet, QValueNet, ValueNet};

use super::super::squashed_gaussian::sample_squashed;
use super::config::{HerConfig, HerTwinSacConfig};
use super::entropy::{target_entropy_continuous, EntropyTuner};

/// Loss values from one gradient update.
#[derive(Debug, Clone, Copy, Default)]
struct StepLosses {
    policy: f32,
    qf: f32,
    vf: f32,
}

/// Network bundle written to disk each snapshot epoch.
///
/// Restoring a run needs all five modules plus the shared normalizer
/// statistics, which are not module state and are saved separately as
/// `normalizer_*.json` next to the model snapshots.
#[derive(Module, Debug)]
pub struct TrainingSnapshot<B: Backend> {
    pub policy: PolicyNet<B>,
    pub qf1: QValueNet<B>,
    pub qf2: QValueNet<B>,
    pub vf: ValueNet<B>,
    pub vf_target: ValueNet<B>,
}

/// Twin soft actor-critic with hindsight experience relabeling.
pub struct HerTwinSac<B: AutodiffBackend> {
    policy: PolicyNet<B>,
    qf1: QValueNet<B>,
    qf2: QValueNet<B>,
    vf: ValueNet<B>,
    vf_target: ValueNet<B>,
    entropy: EntropyTuner,
    config: HerTwinSacConfig,
    her: HerConfig,
    device: B::Device,
    env_steps: usize,
    episodes: usize,
}

impl<B: AutodiffBackend> HerTwinSac<B> {
    pub fn new(
        policy: PolicyNet<B>,
        qf1: QValueNet<B>,
        qf2: QValueNet<B>,
        vf: ValueNet<B>,
        config: HerTwinSacConfig,
        her: HerConfig,
        device: B::Device,
    ) -> Self {
        let entropy = EntropyTuner::new(0.2, target_entropy_continuous(policy.action_dim()));
        let vf_target = vf.clone();

        Self {
            policy,
            qf1,
            qf2,
            vf,
            vf_target,
            entropy,
            config,
            her,
            device,
            env_steps: 0,
            episodes: 0,
        }
    }

    pub fn config(&self) -> &HerTwinSacConfig {
        &self.config
    }

    pub fn policy(&self) -> &PolicyNet<B> {
        &self.policy
    }

    pub fn alpha(&self) -> f32 {
        self.entropy.alpha()
    }

    pub fn env_steps(&self) -> usize {
        self.env_steps
    }

    /// Bundle the current networks for checkpointing.
    pub fn snapshot(&self) -> TrainingSnapshot<B> {
        TrainingSnapshot {
            policy: self.policy.clone(),
            qf1: self.qf1.clone(),
            qf2: self.qf2.clone(),
            vf: self.vf.clone(),
            vf_target: self.vf_target.clone(),
        }
    }

    /// Run the full training loop.
    pub fn train(
        &mut self,
        env: &mut dyn GoalEnv,
        buffer: &ObsDictRelabelingBuffer,
        logger: &mut dyn MetricsLogger,
        checkpointer: Option<&Checkpointer>,
    ) {
        let clip = GradientClippingConfig::Norm(self.config.grad_clip_max);
        let mut policy_opt = AdamConfig::new()
            .with_grad_clipping(Some(clip.clone()))
            .init();
        let mut qf1_opt = AdamConfig::new()
            .with_grad_clipping(Some(clip.clone()))
            .init();
        let mut qf2_opt = AdamConfig::new()
            .with_grad_clipping(Some(clip.clone()))
            .init();
        let mut vf_opt = AdamConfig::new().with_grad_clipping(Some(clip)).init();

        let num_blocks = env.num_blocks();
        let mut last_eval = (0.0, 0.0);

        for epoch in 0..self.config.num_epochs {
            // Collection phase.
            let mut collected = 0;
            while collected < self.config.num_steps_per_epoch {
                let path = self.collect_episode(env, true);
                collected += path.len();
                self.env_steps += path.len();
                self.episodes += 1;
                buffer.push_path(path);
            }

            // Update phase.
            buffer.drain_pending();
            let mut totals = StepLosses::default();
            let mut updates = 0;
            if buffer.num_steps_can_sample() >= self.config.min_steps_before_training {
                for _ in 0..self.config.num_updates_per_epoch {
                    let Some(batch) = buffer.sample(self.config.batch_size, env) else {
                        break;
                    };
                    let losses = self.train_batch(
                        &batch,
                        num_blocks,
                        &mut policy_opt,
                        &mut qf1_opt,
                        &mut qf2_opt,
                        &mut vf_opt,
                    );
                    totals.policy += losses.policy;
                    totals.qf += losses.qf;
                    totals.vf += losses.vf;
                    updates += 1;
                }
            }

            // Evaluation phase.
            if epoch % self.config.num_epochs_per_eval == 0 {
                last_eval = self.evaluate(env);
            }

            let denom = updates.max(1) as f32;
            let snapshot = EpochSnapshot::new(epoch, self.env_steps, self.episodes)
                .with_eval(last_eval.0, last_eval.1)
                .with_losses(totals.policy / denom, totals.qf / denom, totals.vf / denom)
                .with_alpha(self.entropy.alpha());
            logger.log(&snapshot);

            if let Some(ckpt) = checkpointer {
                if let Err(err) = ckpt.save_epoch(&self.snapshot(), epoch) {
                    eprintln!("snapshot save failed at epoch {epoch}: {err}");
                }
                let stats = self.policy.normalizer().snapshot();
                if let Err(err) = ckpt.save_state("normalizer", &stats, epoch) {
                    eprintln!("normalizer save failed at epoch {epoch}: {err}");
                }
            }
        }

        logger.flush();
    }

    /// One gradient update on a relabeled batch.
    fn train_batch<OP, O1, O2, OV>(
        &mut self,
        batch: &HerBatch,
        num_blocks: usize,
        policy_opt: &mut OP,
        qf1_opt: &mut O1,
        qf2_opt: &mut O2,
        vf_opt: &mut OV,
    ) -> StepLosses
    where
        OP: Optimizer<PolicyNet<B>, B>,
        O1: Optimizer<QValueNet<B>, B>,
        O2: Optimizer<QValueNet<B>, B>,
        OV: Optimizer<ValueNet<B>, B>,
    {
        let device = self.device.clone();
        let alpha = self.entropy.alpha();

        let actions = rows_tensor::<B>(&batch.actions, &device);
        let rewards = column_tensor::<B>(&batch.rewards, &device)
            .mul_scalar(self.config.reward_scale);
        let not_done = column_tensor::<B>(
            &batch
                .terminals
                .iter()
                .map(|&t| if t { 0.0 } else { 1.0 })
                .collect::<Vec<f32>>(),
            &device,
        );

        // Q-function update against the value target network.
        let v_next = self
            .vf_target
            .forward(&batch.next_observations, &batch.goals, num_blocks, &device)
            .detach();
        let q_target = rewards + not_done * v_next.mul_scalar(self.config.discount);

        let q1_pred = self.qf1.forward(
            &batch.observations,
            &batch.goals,
            actions.clone(),
            num_blocks,
            &device,
        );
        let qf1_loss = (q1_pred - q_target.clone()).powf_scalar(2.0).mean();
        let qf1_loss_val = scalar(&qf1_loss);
        let grads = GradientsParams::from_grads(qf1_loss.backward(), &self.qf1);
        self.qf1 = qf1_opt.step(self.config.qf_lr, self.qf1.clone(), grads);

        let q2_pred = self.qf2.forward(
            &batch.observations,
            &batch.goals,
            actions,
            num_blocks,
            &device,
        );
        let qf2_loss = (q2_pred - q_target).powf_scalar(2.0).mean();
        let qf2_loss_val = scalar(&qf2_loss);
        let grads = GradientsParams::from_grads(qf2_loss.backward(), &self.qf2);
        self.qf2 = qf2_opt.step(self.config.qf_lr, self.qf2.clone(), grads);

        // Fresh actions from the current policy.
        let (mean, log_std) =
            self.policy
                .forward(&batch.observations, &batch.goals, num_blocks, &device);
        let (new_actions, log_pi) = sample_squashed(mean, log_std, &device);

        let q1_new = self.qf1.forward(
            &batch.observations,
            &batch.goals,
            new_actions.clone(),
            num_blocks,
            &device,
        );
        let q2_new = self.qf2.forward(
            &batch.observations,
            &batch.goals,
            new_actions,
            num_blocks,
            &device,
        );
        let min_q = q1_new.min_pair(q2_new);

        // Value-function update toward the entropy-regularized target.
        let v_pred = self
            .vf
            .forward(&batch.observations, &batch.goals, num_blocks, &device);
        let v_target = (min_q.clone() - log_pi.clone().mul_scalar(alpha)).detach();
        let vf_loss = (v_pred - v_target).powf_scalar(2.0).mean();
        let vf_loss_val = scalar(&vf_loss);
        let grads = GradientsParams::from_grads(vf_loss.backward(), &self.vf);
        self.vf = vf_opt.step(self.config.vf_lr, self.vf.clone(), grads);

        // Policy update through the reparameterized sample.
        let policy_loss = (log_pi.clone().mul_scalar(alpha) - min_q).mean();
        let policy_loss_val = scalar(&policy_loss);
        let grads = GradientsParams::from_grads(policy_loss.backward(), &self.policy);
        self.policy = policy_opt.step(self.config.policy_lr, self.policy.clone(), grads);

        if self.config.auto_entropy_tuning {
            let mean_log_pi = scalar(&log_pi.mean());
            self.entropy.update(mean_log_pi, self.config.alpha_lr);
        }

        self.vf_target = soft_update(
            &self.vf,
            self.vf_target.clone(),
            self.config.soft_target_tau,
        );

        StepLosses {
            policy: policy_loss_val,
            qf: 0.5 * (qf1_loss_val + qf2_loss_val),
            vf: vf_loss_val,
        }
    }

    /// Collect one episode. With `explore` set the policy samples, feeds
    /// the shared normalizer, and, under exploration masking, switches to
    /// deterministic actions once the goal has been reached.
    fn collect_episode(&mut self, env: &mut dyn GoalEnv, explore: bool) -> Path {
        let num_blocks = env.num_blocks();
        let mut obs = env.reset();
        let mut path = Path::with_capacity(self.config.max_path_length);
        let mut solved = false;

        for _ in 0..self.config.max_path_length {
            let masked = self.her.exploration_masking && solved;
            let action = if explore && !masked {
                self.sample_action(&obs, num_blocks)
            } else {
                self.greedy_action(&obs, num_blocks)
            };

            if explore {
                let normalizer = self.policy.normalizer();
                normalizer.update_obs(&obs.observation, &obs.desired_goal, num_blocks);
                normalizer.update_action(&action);
            }

            let result = env.step(&action);
            solved = solved || result.is_success;

            path.push(GoalStep {
                observation: obs.observation,
                achieved_goal: obs.achieved_goal,
                desired_goal: obs.desired_goal,
                action,
                reward: result.reward,
                next_observation: result.observation.observation.clone(),
                next_achieved_goal: result.observation.achieved_goal.clone(),
                terminal: result.terminal,
                info: result.info,
            });

            obs = result.observation;
            if result.terminal {
                break;
            }
        }

        path
    }

    /// Deterministic-policy evaluation: mean return and success rate.
    fn evaluate(&mut self, env: &mut dyn GoalEnv) -> (f32, f32) {
        let episodes = (self.config.num_steps_per_eval / self.config.max_path_length).max(1);
        let mut returns = 0.0;
        let mut successes = 0.0;

        for _ in 0..episodes {
            let path = self.collect_episode(env, false);
            returns += path.total_return();
            if let (Some(achieved), Some(step)) = (path.final_achieved_goal(), path.steps.last()) {
                if env.is_success(achieved, &step.desired_goal) {
                    successes += 1.0;
                }
            }
        }

        (returns / episodes as f32, successes / episodes as f32)
    }

    fn sample_action(&self, obs: &GoalObservation, num_blocks: usize) -> Vec<f32> {
        let (mean, log_std) = self.policy.forward(
            std::slice::from_ref(&obs.observation),
            std::slice::from_ref(&obs.desired_goal),
            num_blocks,
            &self.device,
        );
        let (action, _) = sample_squashed(mean, log_std, &self.device);
        tensor_row(action)
    }

    fn greedy_action(&self, obs: &GoalObservation, num_blocks: usize) -> Vec<f32> {
        let action = self.policy.deterministic_action(
            std::slice::from_ref(&obs.observation),
            std::slice::from_ref(&obs.desired_goal),
            num_blocks,
            &self.device,
        );
        tensor_row(action)
    }
}

fn rows_tensor<B: Backend>(rows: &[Vec<f32>], device: &B::Device) -> Tensor<B, 2> {
    let batch = rows.len();
    let dim = rows.first().map_or(0, Vec::len);
    let mut flat = Vec::with_capacity(batch * dim);
    for row in rows {
        flat.extend_from_slice(row);
    }
    Tensor::from_data(TensorData::new(flat, [batch, dim]), device)
}

fn column_tensor<B: Backend>(values: &[f32], device: &B::Device) -> Tensor<B, 2> {
    Tensor::from_data(TensorData::new(values.to_vec(), [values.len(), 1]), device)
}

fn scalar<B: Backend>(loss: &Tensor<B, 1>) -> f32 {
    loss.clone().into_scalar().elem()
}

fn tensor_row<B: Backend>(row: Tensor<B, 2>) -> Vec<f32> {
    row.into_data()
        .to_vec()
        .unwrap_or_default()
}
