//! Episode replay buffer with hindsight goal relabeling.
//!
//! The buffer stores whole episodes so that sampling can relabel a
//! transition's goal with an achieved goal from later in the same episode.
//! Rewards for relabeled transitions are recomputed through the
//! environment's reward function.
//!
//! Pushes go through a lock-free injection queue so rollout code never
//! blocks on a sampler holding the storage lock; pending episodes are
//! drained into storage on the next sample.

use crossbeam_queue::SegQueue;
use fastrand::Rng;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::path::Path;
use crate::envs::goal_env::GoalEnv;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for [`ObsDictRelabelingBuffer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelabelingBufferConfig {
    /// Maximum number of transitions retained. Whole episodes are evicted,
    /// oldest first, once the total exceeds this.
    pub max_size: usize,
    /// Fraction of sampled transitions keeping their original rollout goal.
    pub fraction_goals_rollout_goals: f32,
    /// Fraction of sampled transitions relabeled with a fresh goal from the
    /// environment's goal distribution.
    pub fraction_goals_env_goals: f32,
}

impl Default for RelabelingBufferConfig {
    fn default() -> Self {
        Self {
            max_size: 100_000,
            fraction_goals_rollout_goals: 0.2,
            fraction_goals_env_goals: 0.0,
        }
    }
}

impl RelabelingBufferConfig {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            ..Default::default()
        }
    }

    pub fn with_fraction_goals_rollout_goals(mut self, fraction: f32) -> Self {
        self.fraction_goals_rollout_goals = fraction;
        self
    }

    pub fn with_fraction_goals_env_goals(mut self, fraction: f32) -> Self {
        self.fraction_goals_env_goals = fraction;
        self
    }

    /// Fractions must each lie in [0, 1] and sum to at most 1; the
    /// remainder is the share of future-achieved-goal relabels.
    pub fn validate(&self) -> Result<(), String> {
        let r = self.fraction_goals_rollout_goals;
        let e = self.fraction_goals_env_goals;
        if !(0.0..=1.0).contains(&r) || !(0.0..=1.0).contains(&e) || r + e > 1.0 {
            return Err(format!(
                "invalid goal fractions: rollout {r} + env {e} must stay within [0, 1]"
            ));
        }
        if self.max_size == 0 {
            return Err("max_size must be positive".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Batch
// ============================================================================

/// One training batch of relabeled transitions.
#[derive(Debug, Clone)]
pub struct HerBatch {
    pub observations: Vec<Vec<f32>>,
    pub actions: Vec<Vec<f32>>,
    pub rewards: Vec<f32>,
    pub next_observations: Vec<Vec<f32>>,
    /// Goal each transition is conditioned on after relabeling.
    pub goals: Vec<Vec<f32>>,
    pub terminals: Vec<bool>,
}

impl HerBatch {
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

// ============================================================================
// Buffer
// ============================================================================

struct EpisodeStore {
    episodes: VecDeque<Path>,
    total_transitions: usize,
    rng: Rng,
}

impl EpisodeStore {
    /// Evict oldest episodes until the transition budget is met.
    fn evict_to(&mut self, max_size: usize) {
        while self.total_transitions > max_size {
            if let Some(old) = self.episodes.pop_front() {
                self.total_transitions -= old.len();
            } else {
                break;
            }
        }
    }
}

/// Hindsight-relabeling replay buffer over dict observations.
pub struct ObsDictRelabelingBuffer {
    config: RelabelingBufferConfig,
    pending: SegQueue<Path>,
    store: RwLock<EpisodeStore>,
    /// Transitions visible to samplers, kept outside the lock for cheap
    /// size checks.
    size: AtomicUsize,
}

impl ObsDictRelabelingBuffer {
    pub fn new(config: RelabelingBufferConfig) -> Self {
        Self {
            config,
            pending: SegQueue::new(),
            store: RwLock::new(EpisodeStore {
                episodes: VecDeque::new(),
                total_transitions: 0,
                rng: Rng::with_seed(0),
            }),
            size: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &RelabelingBufferConfig {
        &self.config
    }

    pub fn seed(&self, seed: u64) {
        self.store.write().rng = Rng::with_seed(seed);
    }

    /// Queue a completed episode. Lock-free; the episode becomes sampleable
    /// after the next drain.
    pub fn push_path(&self, path: Path) {
        if path.is_empty() {
            return;
        }
        self.pending.push(path);
    }

    /// Number of transitions currently sampleable.
    pub fn num_steps_can_sample(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Move pending episodes into storage and evict past the size budget.
    pub fn drain_pending(&self) {
        let mut store = self.store.write();
        while let Some(path) = self.pending.pop() {
            store.total_transitions += path.len();
            store.episodes.push_back(path);
        }
        store.evict_to(self.config.max_size);
        self.size.store(store.total_transitions, Ordering::Relaxed);
    }

    /// Sample a relabeled batch.
    ///
    /// The environment supplies fresh goals and recomputes rewards for
    /// relabeled transitions. Returns `None` until at least one episode is
    /// stored.
    pub fn sample(&self, batch_size: usize, env: &mut dyn GoalEnv) -> Option<HerBatch> {
        self.drain_pending();

        let mut guard = self.store.write();
        let store = &mut *guard;
        if store.total_transitions == 0 {
            return None;
        }
        let episodes = &store.episodes;
        let rng = &mut store.rng;

        // Prefix sums over episode lengths for uniform transition draws.
        let mut cumulative = Vec::with_capacity(episodes.len());
        let mut running = 0usize;
        for episode in episodes {
            running += episode.len();
            cumulative.push(running);
        }

        let frac_rollout = self.config.fraction_goals_rollout_goals;
        let frac_env = self.config.fraction_goals_env_goals;

        let mut batch = HerBatch {
            observations: Vec::with_capacity(batch_size),
            actions: Vec::with_capacity(batch_size),
            rewards: Vec::with_capacity(batch_size),
            next_observations: Vec::with_capacity(batch_size),
            goals: Vec::with_capacity(batch_size),
            terminals: Vec::with_capacity(batch_size),
        };

        for _ in 0..batch_size {
            let flat = rng.usize(0..running);
            let episode_idx = cumulative.partition_point(|&c| c <= flat);
            let step_idx = flat
                - if episode_idx == 0 {
                    0
                } else {
                    cumulative[episode_idx - 1]
                };

            let u = rng.f32();
            let (goal, relabeled) = if u < frac_rollout {
                let step = &episodes[episode_idx].steps[step_idx];
                (step.desired_goal.clone(), false)
            } else if u < frac_rollout + frac_env {
                (env.sample_goal(), true)
            } else {
                // Future strategy: an achieved goal from this step onward.
                let episode = &episodes[episode_idx];
                let future_idx = rng.usize(step_idx..episode.len());
                (episode.steps[future_idx].next_achieved_goal.clone(), true)
            };

            let step = &episodes[episode_idx].steps[step_idx];
            let reward = if relabeled {
                // Recompute from the transition's own recorded info so the
                // result never depends on the environment's live state.
                env.compute_reward(&step.next_achieved_goal, &goal, &step.info)
            } else {
                step.reward
            };

            batch.observations.push(step.observation.clone());
            batch.actions.push(step.action.clone());
            batch.rewards.push(reward);
            batch.next_observations.push(step.next_observation.clone());
            batch.goals.push(goal);
            batch.terminals.push(step.terminal);
        }

        Some(batch)
    }
}
