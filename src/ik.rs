//! cyclic coordinate descent inverse kinematics

use nalgebra::Point3;
use rand::Rng;

use std::f32::consts::PI;

use crate::collision::{CollisionModel, Obstacle};
use crate::kinematics::{Chain, JointAxis};

///sweeps over the whole chain before giving up
pub const CCD_MAX_SWEEPS: usize = 15;
///tip distance below which a sweep terminates early
pub const CCD_TOLERANCE: f32 = 0.01;
///random restarts attempted by the robust search
pub const IK_MAX_RESTARTS: usize = 100;
///tip distance below which a restart candidate is accepted
pub const IK_ACCEPT_DISTANCE: f32 = 0.1;

///wrap into (-pi, pi]
fn normalize_angle(mut angle: f32) -> f32 {
    while angle > PI {
        angle -= 2.0 * PI;
    }
    while angle <= -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Greedy CCD solve from `q_init` toward `target`.
///
/// Each sweep walks the joints tip to base; per joint the tip and the
/// target are expressed in the joint's local frame and the joint angle is
/// corrected by the azimuth difference about its axis, clamped to limits.
/// Collision-blind: callers validate the result separately.
pub fn ccd(chain: &Chain, target: &Point3<f32>, q_init: &[f32]) -> Vec<f32> {
    let mut q = q_init.to_vec();
    let limits = chain.joint_limits();
    for _ in 0..CCD_MAX_SWEEPS {
        for joint in (0..chain.dof()).rev() {
            let transforms = chain.fk_transforms(&q);
            let tip = Point3::from(transforms[transforms.len() - 1].translation.vector);
            if (tip - target).norm() < CCD_TOLERANCE {
                return q;
            }
            let frame = &transforms[chain.joint_link_index(joint)];
            let local_tip = frame.inverse_transform_point(&tip);
            let local_target = frame.inverse_transform_point(target);
            let delta = match chain.joint_axis(joint) {
                JointAxis::Y => {
                    local_target.x.atan2(local_target.z) - local_tip.x.atan2(local_tip.z)
                }
                JointAxis::Z => {
                    local_target.y.atan2(local_target.x) - local_tip.y.atan2(local_tip.x)
                }
            };
            let [lo, hi] = limits[joint];
            q[joint] = (q[joint] + normalize_angle(delta)).clamp(lo, hi);
        }
    }
    q
}

///collision-free and close enough to the target
fn acceptable(
    chain: &Chain,
    model: &CollisionModel,
    target: &Point3<f32>,
    q: &[f32],
    obstacles: &[Obstacle],
) -> bool {
    (chain.tip_position(q) - target).norm() < IK_ACCEPT_DISTANCE
        && !model.collides(chain, q, obstacles)
}

/// CCD with seeded random restarts.
///
/// Tries the greedy solve from `q_init` first; on failure reseeds every
/// joint uniformly within its limits and retries, returning the first
/// candidate that is collision-free and reaches the target. If no restart
/// succeeds the initial greedy result is returned anyway: even an invalid
/// solve is a usable bias direction for the planner.
pub fn robust_ik(
    chain: &Chain,
    model: &CollisionModel,
    target: &Point3<f32>,
    q_init: &[f32],
    obstacles: &[Obstacle],
    rng: &mut impl Rng,
) -> Vec<f32> {
    let q_direct = ccd(chain, target, q_init);
    if acceptable(chain, model, target, &q_direct, obstacles) {
        return q_direct;
    }
    for restart in 0..IK_MAX_RESTARTS {
        let q_seed = chain.sample_configuration(rng);
        let q = ccd(chain, target, &q_seed);
        if acceptable(chain, model, target, &q, obstacles) {
            debug!("ik restart {} accepted", restart);
            return q;
        }
    }
    debug!("ik restarts exhausted, returning greedy result");
    q_direct
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::Mulberry32;

    #[test]
    fn test_ccd_round_trip_is_identity() {
        let chain = Chain::uniform_arm(5, 1.0);
        let q = vec![0.3, -0.5, 0.8, 0.2, -0.1];
        let tip = chain.tip_position(&q);
        // already on target: the first sweep returns before touching q
        assert_eq!(ccd(&chain, &tip, &q), q);
    }

    #[test]
    fn test_ccd_reaches_planar_target() {
        let chain = Chain::uniform_arm(5, 1.0);
        let target = Point3::new(1.5, 1.5, 0.0);
        let q = ccd(&chain, &target, &[0.0; 5]);
        let err = (chain.tip_position(&q) - target).norm();
        assert!(err < IK_ACCEPT_DISTANCE, "tip error {}", err);
    }

    #[test]
    fn test_ccd_respects_limits() {
        let chain = Chain::uniform_arm(4, 1.0);
        let target = Point3::new(2.0, 0.5, 1.0);
        let q = ccd(&chain, &target, &[0.0; 4]);
        for (angle, &[lo, hi]) in q.iter().zip(chain.joint_limits()) {
            assert!(*angle >= lo && *angle <= hi);
        }
    }

    #[test]
    fn test_robust_ik_open_space() {
        let chain = Chain::uniform_arm(5, 1.0);
        let model = CollisionModel::default();
        let target = Point3::new(1.5, 1.5, 0.0);
        let mut rng = Mulberry32::new(7);
        let q = robust_ik(&chain, &model, &target, &[0.0; 5], &[], &mut rng);
        let err = (chain.tip_position(&q) - target).norm();
        assert!(err < IK_ACCEPT_DISTANCE, "tip error {}", err);
        assert!(!model.collides(&chain, &q, &[]));
    }

    #[test]
    fn test_robust_ik_is_deterministic() {
        let chain = Chain::uniform_arm(5, 1.0);
        let model = CollisionModel::default();
        let target = Point3::new(0.8, 2.5, 0.7);
        let a = robust_ik(
            &chain,
            &model,
            &target,
            &[0.0; 5],
            &[],
            &mut Mulberry32::new(40),
        );
        let b = robust_ik(
            &chain,
            &model,
            &target,
            &[0.0; 5],
            &[],
            &mut Mulberry32::new(40),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalize_angle() {
        assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-6);
        assert!((normalize_angle(-3.0 * PI) - PI).abs() < 1e-6);
        assert!((normalize_angle(0.5) - 0.5).abs() < 1e-6);
    }
}
