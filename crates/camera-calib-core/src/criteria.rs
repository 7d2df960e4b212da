use serde::{Deserialize, Serialize};

/// Iteration stop rule shared by sub-pixel refinement and the bundle solve:
/// stop after `max_iterations` or once the update is smaller than `epsilon`,
/// whichever comes first.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermCriteria {
    pub max_iterations: usize,
    pub epsilon: f64,
}

impl Default for TermCriteria {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            epsilon: 1e-5,
        }
    }
}

impl TermCriteria {
    pub fn new(max_iterations: usize, epsilon: f64) -> Self {
        Self {
            max_iterations,
            epsilon,
        }
    }

    /// True when an update of size `step` is below the tolerance.
    #[inline]
    pub fn converged(&self, step: f64) -> bool {
        step < self.epsilon
    }
}
