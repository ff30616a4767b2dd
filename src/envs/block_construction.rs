//! Kinematic block-construction environment.
//!
//! A simplified stand-in for the physics-based construction task: a gripper
//! moves through free space under position deltas, picks up blocks within
//! its grasp radius, and places them at per-block goal positions. The
//! observation layout, goal distribution, and reward structure match the
//! dict-state task, so policies and buffers exercise the same shapes they
//! would against the full simulator.

use fastrand::Rng;

use super::env_id::{CaseType, EnvId, RewardType};
use super::goal_env::{GoalEnv, GoalObservation, GoalStepResult, ObsDims, StepInfo};

/// Robot-state segment: grip position (3), gripper opening (2),
/// grip velocity (3), finger velocity (2).
pub const SHARED_DIM: usize = 10;
/// Per-block segment: position (3), position relative to gripper (3),
/// rotation (3), linear velocity (3), angular velocity (3).
pub const OBJECT_DIM: usize = 15;
/// Per-block goal: target position (3).
pub const GOAL_DIM: usize = 3;
/// Cartesian deltas (3) plus gripper command (1).
pub const ACTION_DIM: usize = 4;

const BLOCK_SIZE: f32 = 0.05;
const DISTANCE_THRESHOLD: f32 = 0.05;
const GRASP_RADIUS: f32 = 0.05;
const ACTION_SCALE: f32 = 0.05;
const TABLE_HEIGHT: f32 = 0.42;
const TABLE_CENTER: [f32; 2] = [1.3, 0.75];
const TABLE_HALF_EXTENT: f32 = 0.15;
const WORKSPACE_CEILING: f32 = 0.9;
const HAND_CLEAR_DISTANCE: f32 = 0.08;

fn dist3(a: &[f32], b: &[f32]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// The block-construction task under kinematic dynamics.
pub struct BlockConstructionEnv {
    id: EnvId,
    rng: Rng,
    max_episode_steps: usize,
    render: bool,

    grip_pos: [f32; 3],
    grip_vel: [f32; 3],
    gripper_opening: f32,
    block_pos: Vec<[f32; 3]>,
    block_vel: Vec<[f32; 3]>,
    /// Index of the block currently held, if any.
    held: Option<usize>,
    goal: Vec<f32>,
    elapsed: usize,
}

impl BlockConstructionEnv {
    pub fn new(id: EnvId) -> Self {
        let n = id.num_blocks;
        let mut env = Self {
            id,
            rng: Rng::with_seed(0),
            max_episode_steps: 50 * n,
            render: false,
            grip_pos: [TABLE_CENTER[0], TABLE_CENTER[1], TABLE_HEIGHT + 0.2],
            grip_vel: [0.0; 3],
            gripper_opening: 1.0,
            block_pos: vec![[0.0; 3]; n],
            block_vel: vec![[0.0; 3]; n],
            held: None,
            goal: vec![0.0; n * GOAL_DIM],
            elapsed: 0,
        };
        env.reset_state();
        env
    }

    pub fn id(&self) -> &EnvId {
        &self.id
    }

    fn sample_table_xy(&mut self) -> [f32; 2] {
        [
            TABLE_CENTER[0] + (self.rng.f32() * 2.0 - 1.0) * TABLE_HALF_EXTENT,
            TABLE_CENTER[1] + (self.rng.f32() * 2.0 - 1.0) * TABLE_HALF_EXTENT,
        ]
    }

    fn reset_state(&mut self) {
        self.grip_pos = [TABLE_CENTER[0], TABLE_CENTER[1], TABLE_HEIGHT + 0.2];
        self.grip_vel = [0.0; 3];
        self.gripper_opening = 1.0;
        self.held = None;
        self.elapsed = 0;

        // Blocks spawn flat on the table, spaced apart.
        for i in 0..self.id.num_blocks {
            loop {
                let xy = self.sample_table_xy();
                let pos = [xy[0], xy[1], TABLE_HEIGHT + BLOCK_SIZE / 2.0];
                let clear = self.block_pos[..i]
                    .iter()
                    .all(|other| dist3(&pos, other) > 2.0 * BLOCK_SIZE);
                if clear {
                    self.block_pos[i] = pos;
                    break;
                }
            }
            self.block_vel[i] = [0.0; 3];
        }

        self.goal = self.draw_goal();
    }

    /// Sample per-block goal positions for the task case.
    fn draw_goal(&mut self) -> Vec<f32> {
        let n = self.id.num_blocks;
        let mut goal = Vec::with_capacity(n * GOAL_DIM);

        let height_of = |level: usize| TABLE_HEIGHT + (level as f32 + 0.5) * BLOCK_SIZE;
        // With stack-only goals every block sits above table level.
        let base_level = usize::from(self.id.stackonly);

        match self.id.case {
            CaseType::Singletower => {
                let site = self.sample_table_xy();
                for i in 0..n {
                    goal.extend_from_slice(&[site[0], site[1], height_of(base_level + i)]);
                }
            }
            CaseType::Multitower => {
                // Two sites, blocks split round-robin.
                let sites = [self.sample_table_xy(), self.sample_table_xy()];
                let mut levels = [base_level, base_level];
                for i in 0..n {
                    let s = i % 2;
                    goal.extend_from_slice(&[sites[s][0], sites[s][1], height_of(levels[s])]);
                    levels[s] += 1;
                }
            }
            CaseType::Pyramid => {
                // Base row along x, remaining blocks stacked centrally.
                let site = self.sample_table_xy();
                let base = n.div_ceil(2);
                for i in 0..n {
                    if i < base {
                        let offset = (i as f32 - (base as f32 - 1.0) / 2.0) * BLOCK_SIZE;
                        goal.extend_from_slice(&[site[0] + offset, site[1], height_of(base_level)]);
                    } else {
                        goal.extend_from_slice(&[
                            site[0],
                            site[1],
                            height_of(base_level + 1 + (i - base)),
                        ]);
                    }
                }
            }
        }

        goal
    }

    fn blocks_at_goal(&self, achieved: &[f32], desired: &[f32]) -> usize {
        let n = achieved.len() / GOAL_DIM;
        (0..n)
            .filter(|&i| {
                let a = &achieved[i * GOAL_DIM..(i + 1) * GOAL_DIM];
                let d = &desired[i * GOAL_DIM..(i + 1) * GOAL_DIM];
                dist3(a, d) < DISTANCE_THRESHOLD
            })
            .count()
    }

    fn hand_clear(&self) -> bool {
        self.held.is_none()
            && self
                .block_pos
                .iter()
                .all(|b| dist3(&self.grip_pos, b) > HAND_CLEAR_DISTANCE)
    }

    fn observe(&self) -> GoalObservation {
        let n = self.id.num_blocks;
        let mut observation = Vec::with_capacity(SHARED_DIM + n * OBJECT_DIM);

        observation.extend_from_slice(&self.grip_pos);
        observation.extend_from_slice(&[self.gripper_opening, self.gripper_opening]);
        observation.extend_from_slice(&self.grip_vel);
        observation.extend_from_slice(&[0.0, 0.0]);

        let mut achieved = Vec::with_capacity(n * GOAL_DIM);
        for i in 0..n {
            let pos = self.block_pos[i];
            let vel = self.block_vel[i];
            observation.extend_from_slice(&pos);
            observation.extend_from_slice(&[
                pos[0] - self.grip_pos[0],
                pos[1] - self.grip_pos[1],
                pos[2] - self.grip_pos[2],
            ]);
            // Blocks never rotate under kinematic motion.
            observation.extend_from_slice(&[0.0, 0.0, 0.0]);
            observation.extend_from_slice(&vel);
            observation.extend_from_slice(&[0.0, 0.0, 0.0]);
            achieved.extend_from_slice(&pos);
        }

        GoalObservation {
            observation,
            achieved_goal: achieved,
            desired_goal: self.goal.clone(),
        }
    }
}

impl GoalEnv for BlockConstructionEnv {
    fn action_dim(&self) -> usize {
        ACTION_DIM
    }

    fn num_blocks(&self) -> usize {
        self.id.num_blocks
    }

    fn obs_dims(&self) -> ObsDims {
        ObsDims {
            shared_dim: SHARED_DIM,
            object_dim: OBJECT_DIM,
            goal_dim: GOAL_DIM,
        }
    }

    fn max_episode_steps(&self) -> usize {
        self.max_episode_steps
    }

    fn set_max_episode_steps(&mut self, steps: usize) {
        self.max_episode_steps = steps;
    }

    fn set_render(&mut self, render: bool) {
        self.render = render;
    }

    fn reset(&mut self) -> GoalObservation {
        self.reset_state();
        self.observe()
    }

    fn step(&mut self, action: &[f32]) -> GoalStepResult {
        assert_eq!(action.len(), ACTION_DIM, "action dimension mismatch");

        let prev_grip = self.grip_pos;
        for (axis, delta) in action[..3].iter().enumerate() {
            self.grip_pos[axis] += delta.clamp(-1.0, 1.0) * ACTION_SCALE;
        }
        self.grip_pos[0] = self.grip_pos[0].clamp(
            TABLE_CENTER[0] - 2.0 * TABLE_HALF_EXTENT,
            TABLE_CENTER[0] + 2.0 * TABLE_HALF_EXTENT,
        );
        self.grip_pos[1] = self.grip_pos[1].clamp(
            TABLE_CENTER[1] - 2.0 * TABLE_HALF_EXTENT,
            TABLE_CENTER[1] + 2.0 * TABLE_HALF_EXTENT,
        );
        self.grip_pos[2] = self.grip_pos[2].clamp(TABLE_HEIGHT, WORKSPACE_CEILING);
        for axis in 0..3 {
            self.grip_vel[axis] = self.grip_pos[axis] - prev_grip[axis];
        }

        let closing = action[3].clamp(-1.0, 1.0) < 0.0;
        self.gripper_opening = if closing { 0.0 } else { 1.0 };

        match self.held {
            Some(i) => {
                if closing {
                    // Held block tracks the gripper.
                    let prev = self.block_pos[i];
                    self.block_pos[i] = self.grip_pos;
                    for axis in 0..3 {
                        self.block_vel[i][axis] = self.block_pos[i][axis] - prev[axis];
                    }
                } else {
                    // Released blocks settle straight down onto the surface
                    // below, which is the table or an already placed block.
                    let drop_xy = [self.block_pos[i][0], self.block_pos[i][1]];
                    let mut rest = TABLE_HEIGHT + BLOCK_SIZE / 2.0;
                    for (j, other) in self.block_pos.iter().enumerate() {
                        if j != i
                            && dist3(
                                &[drop_xy[0], drop_xy[1], other[2]],
                                other,
                            ) < BLOCK_SIZE
                        {
                            rest = rest.max(other[2] + BLOCK_SIZE);
                        }
                    }
                    self.block_pos[i][2] = rest;
                    self.block_vel[i] = [0.0; 3];
                    self.held = None;
                }
            }
            None => {
                if closing {
                    self.held = (0..self.id.num_blocks)
                        .find(|&i| dist3(&self.grip_pos, &self.block_pos[i]) < GRASP_RADIUS);
                    if let Some(i) = self.held {
                        self.block_pos[i] = self.grip_pos;
                    }
                }
            }
        }

        self.elapsed += 1;
        let observation = self.observe();
        let info = StepInfo {
            hand_clear: self.hand_clear(),
        };
        let reward = self.compute_reward(&observation.achieved_goal, &observation.desired_goal, &info);
        let is_success = self.is_success(&observation.achieved_goal, &observation.desired_goal);
        let terminal = self.elapsed >= self.max_episode_steps;

        GoalStepResult {
            observation,
            reward,
            terminal,
            is_success,
            info,
        }
    }

    fn sample_goal(&mut self) -> Vec<f32> {
        self.draw_goal()
    }

    fn compute_reward(&self, achieved: &[f32], desired: &[f32], info: &StepInfo) -> f32 {
        let n = self.id.num_blocks;
        let at_goal = self.blocks_at_goal(achieved, desired);
        match self.id.reward_type {
            RewardType::Incremental => {
                let mut reward = at_goal as f32;
                // Extra reward for retracting the hand once the construction
                // stands, so the policy learns to let go. The hand state comes
                // from the transition's recorded info, never from live state.
                if at_goal == n && !self.id.stackonly && info.hand_clear {
                    reward += 1.0;
                }
                reward
            }
            RewardType::Sparse => {
                if at_goal == n {
                    0.0
                } else {
                    -1.0
                }
            }
        }
    }

    fn is_success(&self, achieved: &[f32], desired: &[f32]) -> bool {
        self.blocks_at_goal(achieved, desired) == self.id.num_blocks
    }

    fn seed(&mut self, seed: u64) {
        self.rng = Rng::with_seed(seed);
    }
}
