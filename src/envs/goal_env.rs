//! Goal-conditioned environment interface.
//!
//! Environments expose dict-shaped observations (flat observation, achieved
//! goal, desired goal) and a reward function that can be re-evaluated for
//! arbitrary goals, which is what hindsight relabeling needs.

use serde::{Deserialize, Serialize};

/// Dimensional layout of a dict-shaped observation.
///
/// The flat observation is `[shared ++ object_0 ++ ... ++ object_{n-1}]`
/// and the goal is `[goal_0 ++ ... ++ goal_{n-1}]` for `n` blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObsDims {
    /// Robot-state segment shared by all blocks.
    pub shared_dim: usize,
    /// Per-block feature segment.
    pub object_dim: usize,
    /// Per-block goal segment.
    pub goal_dim: usize,
}

impl ObsDims {
    /// Dimension of one per-block feature row `[shared ++ object ++ goal]`.
    pub fn row_dim(&self) -> usize {
        self.shared_dim + self.object_dim + self.goal_dim
    }

    /// Flat observation size for `num_blocks` blocks.
    pub fn obs_dim(&self, num_blocks: usize) -> usize {
        self.shared_dim + num_blocks * self.object_dim
    }

    /// Full goal size for `num_blocks` blocks.
    pub fn full_goal_dim(&self, num_blocks: usize) -> usize {
        num_blocks * self.goal_dim
    }
}

/// One dict-shaped observation.
#[derive(Debug, Clone)]
pub struct GoalObservation {
    pub observation: Vec<f32>,
    pub achieved_goal: Vec<f32>,
    pub desired_goal: Vec<f32>,
}

/// Per-transition state the reward function needs beyond the goals.
///
/// Recorded at the post-action state and stored with the transition, so a
/// relabeled reward sees the hand state of the step it belongs to, not
/// whatever the environment looks like at sampling time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInfo {
    /// Gripper empty and clear of every block.
    pub hand_clear: bool,
}

/// Result of one environment step.
#[derive(Debug, Clone)]
pub struct GoalStepResult {
    pub observation: GoalObservation,
    pub reward: f32,
    pub terminal: bool,
    /// All blocks at their goals for this transition.
    pub is_success: bool,
    /// Reward-relevant state at the post-action step.
    pub info: StepInfo,
}

/// A goal-conditioned environment with a relabelable reward.
pub trait GoalEnv: Send {
    /// Action dimensionality. Actions are expected in `[-1, 1]`.
    fn action_dim(&self) -> usize;

    /// Number of movable blocks.
    fn num_blocks(&self) -> usize;

    /// Layout of the dict observation.
    fn obs_dims(&self) -> ObsDims;

    /// Steps per episode before truncation.
    fn max_episode_steps(&self) -> usize;

    fn set_max_episode_steps(&mut self, steps: usize);

    /// Enable or disable rendering. Kinematic simulation ignores this but
    /// keeps the toggle for interface parity.
    fn set_render(&mut self, render: bool);

    /// Reset to a fresh episode and return the initial observation.
    fn reset(&mut self) -> GoalObservation;

    /// Apply an action.
    fn step(&mut self, action: &[f32]) -> GoalStepResult;

    /// Draw a fresh goal from the goal distribution without disturbing the
    /// current episode.
    fn sample_goal(&mut self) -> Vec<f32>;

    /// Reward of a transition whose achieved goal is `achieved` under the
    /// desired goal `desired`, given the transition's recorded step info.
    /// Used for hindsight relabeling; must depend only on its arguments,
    /// never on live environment state.
    fn compute_reward(&self, achieved: &[f32], desired: &[f32], info: &StepInfo) -> f32;

    /// Whether `achieved` satisfies `desired` for every block.
    fn is_success(&self, achieved: &[f32], desired: &[f32]) -> bool;

    /// Reseed the environment's random stream.
    fn seed(&mut self, seed: u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dims_arithmetic() {
        let dims = ObsDims {
            shared_dim: 10,
            object_dim: 15,
            goal_dim: 3,
        };
        assert_eq!(dims.row_dim(), 28);
        assert_eq!(dims.obs_dim(1), 25);
        assert_eq!(dims.obs_dim(3), 55);
        assert_eq!(dims.full_goal_dim(3), 9);
    }
}
