//! Configuration for HER twin soft actor-critic.

use serde::{Deserialize, Serialize};

/// Algorithm hyperparameters.
///
/// Defaults follow the single-block pick-and-place setup: one rollout
/// episode and fifty gradient updates per epoch, a discount of 0.98, and a
/// slow value-target update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HerTwinSacConfig {
    pub num_epochs: usize,
    /// Steps per rollout episode before truncation.
    pub max_path_length: usize,
    pub batch_size: usize,
    pub discount: f32,
    pub num_updates_per_epoch: usize,
    /// Environment steps collected per epoch.
    pub num_steps_per_epoch: usize,
    /// Environment steps per evaluation phase.
    pub num_steps_per_eval: usize,
    pub num_epochs_per_eval: usize,
    /// Transitions required in the buffer before updates start.
    pub min_steps_before_training: usize,
    pub soft_target_tau: f32,
    pub policy_lr: f64,
    pub qf_lr: f64,
    pub vf_lr: f64,
    pub alpha_lr: f64,
    /// Gradient-norm clip applied to every optimizer.
    pub grad_clip_max: f32,
    pub reward_scale: f32,
    /// Learn the entropy coefficient toward `-action_dim` target entropy.
    pub auto_entropy_tuning: bool,
}

impl Default for HerTwinSacConfig {
    fn default() -> Self {
        Self {
            num_epochs: 30_000,
            max_path_length: 50,
            batch_size: 256,
            discount: 0.98,
            num_updates_per_epoch: 50,
            num_steps_per_epoch: 50,
            num_steps_per_eval: 500,
            num_epochs_per_eval: 10,
            min_steps_before_training: 256,
            soft_target_tau: 0.001,
            policy_lr: 3e-4,
            qf_lr: 3e-4,
            vf_lr: 3e-4,
            alpha_lr: 3e-4,
            grad_clip_max: 1000.0,
            reward_scale: 1.0,
            auto_entropy_tuning: true,
        }
    }
}

impl HerTwinSacConfig {
    pub fn with_num_epochs(mut self, num_epochs: usize) -> Self {
        self.num_epochs = num_epochs;
        self
    }

    pub fn with_max_path_length(mut self, max_path_length: usize) -> Self {
        self.max_path_length = max_path_length;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_discount(mut self, discount: f32) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_soft_target_tau(mut self, tau: f32) -> Self {
        self.soft_target_tau = tau;
        self
    }

    /// Scale the per-epoch step counts for an `n`-block task: one episode
    /// collected and one update per step per epoch, ten episodes per eval.
    pub fn scaled_for_blocks(mut self, num_blocks: usize) -> Self {
        let episode = self.max_path_length * num_blocks;
        self.max_path_length = episode;
        self.num_steps_per_epoch = episode;
        self.num_updates_per_epoch = episode;
        self.num_steps_per_eval = episode * 10;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.num_epochs == 0 {
            return Err("num_epochs must be positive".to_string());
        }
        if self.max_path_length == 0 {
            return Err("max_path_length must be positive".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(format!("discount {} outside [0, 1]", self.discount));
        }
        if !(0.0..=1.0).contains(&self.soft_target_tau) {
            return Err(format!("soft_target_tau {} outside [0, 1]", self.soft_target_tau));
        }
        if self.grad_clip_max <= 0.0 {
            return Err("grad_clip_max must be positive".to_string());
        }
        Ok(())
    }
}

/// Hindsight relabeling keys and exploration behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HerConfig {
    pub observation_key: String,
    pub desired_goal_key: String,
    /// Act deterministically for the rest of an episode once the goal is
    /// reached, so exploration noise cannot undo a finished construction.
    pub exploration_masking: bool,
}

impl Default for HerConfig {
    fn default() -> Self {
        Self {
            observation_key: "observation".to_string(),
            desired_goal_key: "desired_goal".to_string(),
            exploration_masking: true,
        }
    }
}

impl HerConfig {
    pub fn with_exploration_masking(mut self, exploration_masking: bool) -> Self {
        self.exploration_masking = exploration_masking;
        self
    }

    /// Achieved-goal key derived from the desired-goal key.
    pub fn achieved_goal_key(&self) -> String {
        self.desired_goal_key.replace("desired", "achieved")
    }

    /// Dict observations expose exactly `observation`, `achieved_goal`, and
    /// `desired_goal`; any other key would select nothing at runtime, so
    /// reject it before dispatch.
    pub fn validate(&self) -> Result<(), String> {
        if self.observation_key != "observation" {
            return Err(format!(
                "observation_key `{}` does not name an observation entry",
                self.observation_key
            ));
        }
        if self.desired_goal_key != "desired_goal" {
            return Err(format!(
                "desired_goal_key `{}` does not name a goal entry",
                self.desired_goal_key
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(HerTwinSacConfig::default().validate().is_ok());
    }

    #[test]
    fn test_block_scaling() {
        let config = HerTwinSacConfig::default().scaled_for_blocks(3);
        assert_eq!(config.max_path_length, 150);
        assert_eq!(config.num_steps_per_epoch, 150);
        assert_eq!(config.num_updates_per_epoch, 150);
        assert_eq!(config.num_steps_per_eval, 1500);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(HerTwinSacConfig::default().with_discount(1.5).validate().is_err());
        assert!(HerTwinSacConfig::default().with_batch_size(0).validate().is_err());
        assert!(HerTwinSacConfig::default()
            .with_soft_target_tau(2.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_achieved_goal_key_derivation() {
        let her = HerConfig::default();
        assert_eq!(her.achieved_goal_key(), "achieved_goal");
    }

    #[test]
    fn test_her_key_validation() {
        assert!(HerConfig::default().validate().is_ok());

        let mut her = HerConfig::default();
        her.observation_key = "obs".to_string();
        assert!(her.validate().unwrap_err().contains("obs"));

        let mut her = HerConfig::default();
        her.desired_goal_key = "goal".to_string();
        assert!(her.validate().unwrap_err().contains("goal"));
    }
}
