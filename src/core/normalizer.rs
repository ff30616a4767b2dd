//! Input normalization shared across every network of an experiment.
//!
//! Observations from the block-construction environment are dict-shaped:
//! a shared robot-state segment plus one feature segment per block, with a
//! per-block goal. All networks consume per-block feature rows
//! `[shared ++ object_i ++ goal_i]`, and all of them must see those rows on
//! the same scale. `CompositeNormalizer` owns the running statistics for
//! those rows (and for actions), and `SharedCompositeNormalizer` is the
//! handle that the policy, both Q-functions, and the value function hold
//! onto — the same instance, never copies.
//!
//! Statistics use Welford's online algorithm for numerical stability.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::envs::goal_env::ObsDims;

/// Default clip range applied after normalization.
pub const DEFAULT_CLIP_RANGE: f32 = 5.0;

// ============================================================================
// Running statistics (Welford)
// ============================================================================

/// Per-dimension running mean and standard deviation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningMeanStd {
    mean: Vec<f64>,
    /// Sum of squared deviations; variance = var_sum / count.
    var_sum: Vec<f64>,
    count: f64,
    epsilon: f64,
}

impl RunningMeanStd {
    pub fn new(dim: usize) -> Self {
        Self {
            mean: vec![0.0; dim],
            var_sum: vec![0.0; dim],
            count: 0.0,
            epsilon: 1e-8,
        }
    }

    /// Update with a single observation row.
    ///
    /// # Panics
    /// Panics if the row dimensionality doesn't match.
    pub fn update(&mut self, row: &[f32]) {
        assert_eq!(row.len(), self.mean.len(), "row dimension mismatch");

        self.count += 1.0;
        for i in 0..row.len() {
            let x = row[i] as f64;
            let delta = x - self.mean[i];
            self.mean[i] += delta / self.count;
            let delta2 = x - self.mean[i];
            self.var_sum[i] += delta * delta2;
        }
    }

    /// Normalize a row in place, clipping to `[-clip, clip]`.
    pub fn normalize_inplace(&self, row: &mut [f32], clip: f32) {
        assert_eq!(row.len(), self.mean.len(), "row dimension mismatch");

        for (i, x) in row.iter_mut().enumerate() {
            let std = self.std(i);
            *x = (((*x as f64 - self.mean[i]) / std) as f32).clamp(-clip, clip);
        }
    }

    #[inline]
    fn std(&self, i: usize) -> f64 {
        if self.count < 2.0 {
            1.0
        } else {
            (self.var_sum[i] / self.count).sqrt().max(self.epsilon)
        }
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Per-dimension standard deviation as used for normalization.
    ///
    /// Falls back to 1 until at least two samples have been seen.
    pub fn std_vec(&self) -> Vec<f64> {
        (0..self.mean.len()).map(|i| self.std(i)).collect()
    }

    pub fn variance(&self) -> Vec<f64> {
        if self.count < 2.0 {
            vec![1.0; self.mean.len()]
        } else {
            self.var_sum.iter().map(|&v| v / self.count).collect()
        }
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }
}

// ============================================================================
// Composite normalizer
// ============================================================================

/// Joint normalizer for per-block observation rows and actions.
///
/// The observation statistics are shared across blocks: every block's row
/// `[shared ++ object_i ++ goal_i]` updates the same per-dimension stats,
/// so a three-block tower and a one-block task normalize identically per
/// feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeNormalizer {
    obs_stats: RunningMeanStd,
    action_stats: RunningMeanStd,
    dims: ObsDims,
    clip_range: f32,
}

impl CompositeNormalizer {
    /// Create a normalizer for the given observation layout and action size.
    pub fn new(dims: ObsDims, action_dim: usize) -> Self {
        Self {
            obs_stats: RunningMeanStd::new(dims.row_dim()),
            action_stats: RunningMeanStd::new(action_dim),
            dims,
            clip_range: DEFAULT_CLIP_RANGE,
        }
    }

    pub fn with_clip_range(mut self, clip_range: f32) -> Self {
        self.clip_range = clip_range;
        self
    }

    /// Dimension of one per-block feature row (shared + object + goal).
    pub fn row_dim(&self) -> usize {
        self.dims.row_dim()
    }

    pub fn dims(&self) -> ObsDims {
        self.dims
    }

    pub fn clip_range(&self) -> f32 {
        self.clip_range
    }

    pub fn action_dim(&self) -> usize {
        self.action_stats.dim()
    }

    /// Split a flat observation + goal into per-block rows.
    ///
    /// Layout: `observation = [shared, object_0, ..., object_{n-1}]`,
    /// `goal = [goal_0, ..., goal_{n-1}]`.
    pub fn split_rows(&self, observation: &[f32], goal: &[f32], num_blocks: usize) -> Vec<Vec<f32>> {
        let d = self.dims;
        assert_eq!(
            observation.len(),
            d.shared_dim + num_blocks * d.object_dim,
            "flat observation size mismatch"
        );
        assert_eq!(goal.len(), num_blocks * d.goal_dim, "goal size mismatch");

        let shared = &observation[..d.shared_dim];
        (0..num_blocks)
            .map(|i| {
                let obj_start = d.shared_dim + i * d.object_dim;
                let goal_start = i * d.goal_dim;
                let mut row = Vec::with_capacity(d.row_dim());
                row.extend_from_slice(shared);
                row.extend_from_slice(&observation[obj_start..obj_start + d.object_dim]);
                row.extend_from_slice(&goal[goal_start..goal_start + d.goal_dim]);
                row
            })
            .collect()
    }

    /// Update observation statistics from a flat observation + goal.
    pub fn update_obs(&mut self, observation: &[f32], goal: &[f32], num_blocks: usize) {
        for row in self.split_rows(observation, goal, num_blocks) {
            self.obs_stats.update(&row);
        }
    }

    /// Update action statistics.
    pub fn update_action(&mut self, action: &[f32]) {
        self.action_stats.update(action);
    }

    /// Normalize a per-block row in place.
    pub fn normalize_row(&self, row: &mut [f32]) {
        self.obs_stats.normalize_inplace(row, self.clip_range);
    }

    /// Normalize an action in place.
    pub fn normalize_action(&self, action: &mut [f32]) {
        self.action_stats.normalize_inplace(action, self.clip_range);
    }

    pub fn obs_stats(&self) -> &RunningMeanStd {
        &self.obs_stats
    }

    pub fn action_stats(&self) -> &RunningMeanStd {
        &self.action_stats
    }
}

// ============================================================================
// Shared handle
// ============================================================================

/// Thread-safe shared handle to a [`CompositeNormalizer`].
///
/// Cloning the handle clones the `Arc`, not the statistics: every network
/// holding a clone reads and writes the same underlying state.
#[derive(Debug, Clone)]
pub struct SharedCompositeNormalizer {
    inner: Arc<RwLock<CompositeNormalizer>>,
}

impl SharedCompositeNormalizer {
    pub fn new(normalizer: CompositeNormalizer) -> Self {
        Self {
            inner: Arc::new(RwLock::new(normalizer)),
        }
    }

    /// Whether two handles point at the same underlying normalizer.
    pub fn ptr_eq(&self, other: &SharedCompositeNormalizer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn row_dim(&self) -> usize {
        self.inner.read().row_dim()
    }

    pub fn dims(&self) -> ObsDims {
        self.inner.read().dims()
    }

    pub fn action_dim(&self) -> usize {
        self.inner.read().action_dim()
    }

    pub fn clip_range(&self) -> f32 {
        self.inner.read().clip_range()
    }

    /// Mean and standard deviation of the action statistics, for callers
    /// that normalize actions with tensor arithmetic.
    pub fn action_mean_std(&self) -> (Vec<f32>, Vec<f32>) {
        let guard = self.inner.read();
        let stats = guard.action_stats();
        let mean = stats.mean().iter().map(|&x| x as f32).collect();
        let std = stats.std_vec().iter().map(|&x| x as f32).collect();
        (mean, std)
    }

    pub fn update_obs(&self, observation: &[f32], goal: &[f32], num_blocks: usize) {
        self.inner.write().update_obs(observation, goal, num_blocks);
    }

    pub fn update_action(&self, action: &[f32]) {
        self.inner.write().update_action(action);
    }

    /// Build normalized per-block rows from a flat observation + goal.
    pub fn normalized_rows(&self, observation: &[f32], goal: &[f32], num_blocks: usize) -> Vec<Vec<f32>> {
        let guard = self.inner.read();
        let mut rows = guard.split_rows(observation, goal, num_blocks);
        for row in &mut rows {
            guard.normalize_row(row);
        }
        rows
    }

    /// Normalize an action vector.
    pub fn normalized_action(&self, action: &[f32]) -> Vec<f32> {
        let guard = self.inner.read();
        let mut a = action.to_vec();
        guard.normalize_action(&mut a);
        a
    }

    /// Snapshot of the current statistics (for checkpointing).
    pub fn snapshot(&self) -> CompositeNormalizer {
        self.inner.read().clone()
    }

    /// Replace the statistics with a restored snapshot. Every network
    /// holding this handle sees the restored state.
    pub fn restore(&self, state: CompositeNormalizer) {
        *self.inner.write() = state;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> ObsDims {
        ObsDims {
            shared_dim: 2,
            object_dim: 3,
            goal_dim: 1,
        }
    }

    #[test]
    fn test_welford_mean_and_variance() {
        let mut stats = RunningMeanStd::new(1);
        // Values: 2, 4, 4, 4, 5, 5, 7, 9 -> mean 5, variance 4
        for &x in &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.update(&[x]);
        }
        assert!((stats.mean()[0] - 5.0).abs() < 1e-10);
        assert!((stats.variance()[0] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_normalize_clips() {
        let mut stats = RunningMeanStd::new(1);
        for _ in 0..100 {
            stats.update(&[0.0]);
            stats.update(&[1.0]);
        }
        let mut row = [1000.0];
        stats.normalize_inplace(&mut row, 5.0);
        assert_eq!(row[0], 5.0);
    }

    #[test]
    fn test_split_rows_layout() {
        let norm = CompositeNormalizer::new(dims(), 4);
        // shared = [1, 2], objects = [[3,4,5], [6,7,8]], goals = [[9], [10]]
        let obs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let goal = [9.0, 10.0];
        let rows = norm.split_rows(&obs, &goal, 2);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec![1.0, 2.0, 3.0, 4.0, 5.0, 9.0]);
        assert_eq!(rows[1], vec![1.0, 2.0, 6.0, 7.0, 8.0, 10.0]);
    }

    #[test]
    fn test_blocks_share_statistics() {
        let mut norm = CompositeNormalizer::new(dims(), 4);
        let obs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let goal = [9.0, 10.0];
        norm.update_obs(&obs, &goal, 2);
        // Two blocks -> two row updates against the same stats.
        assert_eq!(norm.obs_stats().count(), 2.0);
    }

    #[test]
    fn test_shared_handle_identity() {
        let shared = SharedCompositeNormalizer::new(CompositeNormalizer::new(dims(), 4));
        let a = shared.clone();
        let b = shared.clone();
        assert!(a.ptr_eq(&b));

        let other = SharedCompositeNormalizer::new(CompositeNormalizer::new(dims(), 4));
        assert!(!a.ptr_eq(&other));
    }

    #[test]
    fn test_restore_replaces_statistics() {
        let shared = SharedCompositeNormalizer::new(CompositeNormalizer::new(dims(), 4));
        let clone = shared.clone();

        let mut state = CompositeNormalizer::new(dims(), 4);
        state.update_obs(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], &[9.0, 10.0], 2);
        shared.restore(state);

        // The restored statistics are visible through every handle.
        assert_eq!(clone.snapshot().obs_stats().count(), 2.0);
    }

    #[test]
    fn test_shared_updates_visible_through_clones() {
        let shared = SharedCompositeNormalizer::new(CompositeNormalizer::new(dims(), 4));
        let clone = shared.clone();

        let obs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let goal = [9.0, 10.0];
        shared.update_obs(&obs, &goal, 2);

        assert_eq!(clone.snapshot().obs_stats().count(), 2.0);
    }
}
