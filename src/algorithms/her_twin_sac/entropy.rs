//! Automatic entropy coefficient tuning.
//!
//! The entropy coefficient is learned to hold the policy near a target
//! entropy:
//!
//! ```text
//! L(alpha) = -alpha * (E[log pi] + H_target)
//! ```
//!
//! The gradient with respect to `log_alpha` has the closed form
//! `-alpha * (E[log pi] + H_target) ~ -(E[log pi] + H_target)` up to the
//! positive factor `alpha`, so the update is a plain SGD step on
//! `log_alpha` with the analytic gradient. Optimizing in log space keeps
//! `alpha` positive.

/// Target entropy heuristic for continuous actions, `-dim(A)`.
pub fn target_entropy_continuous(action_dim: usize) -> f32 {
    -(action_dim as f32)
}

/// Learnable entropy coefficient.
#[derive(Debug, Clone)]
pub struct EntropyTuner {
    log_alpha: f32,
    target_entropy: f32,
}

impl EntropyTuner {
    pub fn new(initial_alpha: f32, target_entropy: f32) -> Self {
        Self {
            log_alpha: initial_alpha.ln(),
            target_entropy,
        }
    }

    /// Current coefficient, `exp(log_alpha)`.
    pub fn alpha(&self) -> f32 {
        self.log_alpha.exp()
    }

    pub fn target_entropy(&self) -> f32 {
        self.target_entropy
    }

    /// One SGD step on `log_alpha` given the batch-mean policy log-prob.
    ///
    /// Returns the loss value for logging.
    pub fn update(&mut self, mean_log_prob: f32, lr: f64) -> f32 {
        let grad = -(mean_log_prob + self.target_entropy);
        self.log_alpha -= lr as f32 * grad;
        self.alpha() * grad
    }
}
