//! Trajectory storage for goal-conditioned rollouts.
//!
//! A [`Path`] is one episode of dict-shaped transitions. The replay buffer
//! stores whole paths so that hindsight relabeling can look forward along
//! the episode for achieved goals.

use crate::envs::goal_env::StepInfo;

/// One transition of a goal-conditioned episode.
#[derive(Debug, Clone)]
pub struct GoalStep {
    /// Flat observation before the action.
    pub observation: Vec<f32>,
    /// Goal actually achieved before the action.
    pub achieved_goal: Vec<f32>,
    /// Goal the policy was conditioned on.
    pub desired_goal: Vec<f32>,
    /// Action taken, in `[-1, 1]` per dimension.
    pub action: Vec<f32>,
    /// Environment reward for this transition.
    pub reward: f32,
    /// Flat observation after the action.
    pub next_observation: Vec<f32>,
    /// Goal achieved after the action.
    pub next_achieved_goal: Vec<f32>,
    /// Episode ended at this transition.
    pub terminal: bool,
    /// Reward-relevant state at the post-action step, kept for relabeling.
    pub info: StepInfo,
}

/// One complete episode.
#[derive(Debug, Clone, Default)]
pub struct Path {
    pub steps: Vec<GoalStep>,
}

impl Path {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            steps: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, step: GoalStep) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Undiscounted episode return.
    pub fn total_return(&self) -> f32 {
        self.steps.iter().map(|s| s.reward).sum()
    }

    /// Achieved goal at the end of the episode.
    pub fn final_achieved_goal(&self) -> Option<&[f32]> {
        self.steps.last().map(|s| s.next_achieved_goal.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(reward: f32, achieved: f32) -> GoalStep {
        GoalStep {
            observation: vec![0.0],
            achieved_goal: vec![achieved],
            desired_goal: vec![1.0],
            action: vec![0.0],
            reward,
            next_observation: vec![0.0],
            next_achieved_goal: vec![achieved + 0.1],
            terminal: false,
            info: StepInfo::default(),
        }
    }

    #[test]
    fn test_total_return() {
        let mut path = Path::new();
        path.push(step(1.0, 0.0));
        path.push(step(2.0, 0.5));
        assert_eq!(path.total_return(), 3.0);
    }

    #[test]
    fn test_final_achieved_goal() {
        let mut path = Path::new();
        assert!(path.final_achieved_goal().is_none());
        path.push(step(0.0, 0.5));
        assert_eq!(path.final_achieved_goal().unwrap(), &[0.6][..]);
    }
}
