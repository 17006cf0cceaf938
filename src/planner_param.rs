//! planning request parameters

use serde::{Deserialize, Serialize};

use std::f32::consts::PI;

use crate::rrt::RESOLUTION;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    ///single tree, goal biased
    Standard,
    ///bidirectional, extend + connect with tree swapping
    Connect,
}

impl Default for Algorithm {
    fn default() -> Algorithm {
        Algorithm::Connect
    }
}

/// Per-run planner parameters.
///
/// A present `seed` makes the whole run deterministic (sampling, IK restart
/// seeds, near-goal jitter); a missing seed draws one word from a system
/// source at plan entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanParams {
    ///joint-space extension bound, radians
    pub step_size: f32,
    pub max_iter: u32,
    ///probability of sampling the goal configuration instead of uniform
    pub goal_bias: f32,
    pub seed: Option<u32>,
    pub algorithm: Algorithm,
}

impl Default for PlanParams {
    fn default() -> PlanParams {
        PlanParams {
            step_size: 0.2,
            max_iter: 5000,
            goal_bias: 0.15,
            seed: None,
            algorithm: Algorithm::Connect,
        }
    }
}

impl PlanParams {
    ///clamp out-of-range values rather than failing the run
    pub(crate) fn sanitized(&self) -> PlanParams {
        let mut params = self.clone();
        if !(params.step_size > 0.0) {
            warn!(
                "step size {} is not positive, using resolution {}",
                params.step_size, RESOLUTION
            );
            params.step_size = RESOLUTION;
        }
        if params.step_size > PI {
            warn!("step size {} oversized, clamping to pi", params.step_size);
            params.step_size = PI;
        }
        if !(0.0..=1.0).contains(&params.goal_bias) {
            warn!("goal bias {} outside [0, 1], clamping", params.goal_bias);
            params.goal_bias = params.goal_bias.clamp(0.0, 1.0);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_algorithm_is_connect() {
        assert_eq!(PlanParams::default().algorithm, Algorithm::Connect);
    }

    #[test]
    fn test_sanitize_oversized_step() {
        let params = PlanParams {
            step_size: 10.0,
            ..PlanParams::default()
        };
        assert_eq!(params.sanitized().step_size, PI);
    }

    #[test]
    fn test_sanitize_non_positive_step() {
        let params = PlanParams {
            step_size: 0.0,
            ..PlanParams::default()
        };
        assert_eq!(params.sanitized().step_size, RESOLUTION);
    }

    #[test]
    fn test_sanitize_goal_bias() {
        let params = PlanParams {
            goal_bias: 1.5,
            ..PlanParams::default()
        };
        assert_eq!(params.sanitized().goal_bias, 1.0);
    }
}
