//! chain description and forward kinematics

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::f32::consts::PI;

///tolerance for the pivot placement invariant (offset y vs parent length)
const OFFSET_TOLERANCE: f32 = 1e-4;

/// Rotation axis of a revolute link, in the link's local frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JointAxis {
    Y,
    Z,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum LinkKind {
    Fixed,
    Revolute { axis: JointAxis, limits: [f32; 2] },
}

/// One element of a serial chain.
///
/// `offset` translates from the parent's frame to this link's pivot;
/// `visual_length` extends along the local +Y axis and doubles as the
/// collision segment from this pivot to the next. `color` is cosmetic and
/// ignored by the core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkSpec {
    pub name: String,
    pub kind: LinkKind,
    pub offset: Vector3<f32>,
    pub visual_length: f32,
    pub color: Option<[f32; 3]>,
}

impl LinkSpec {
    pub fn fixed(name: &str, offset: Vector3<f32>, visual_length: f32) -> LinkSpec {
        LinkSpec {
            name: name.to_string(),
            kind: LinkKind::Fixed,
            offset,
            visual_length,
            color: None,
        }
    }

    pub fn revolute(
        name: &str,
        axis: JointAxis,
        limits: [f32; 2],
        offset: Vector3<f32>,
        visual_length: f32,
    ) -> LinkSpec {
        LinkSpec {
            name: name.to_string(),
            kind: LinkKind::Revolute { axis, limits },
            offset,
            visual_length,
            color: None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ChainError {
    #[error("chain needs at least a base and a tip, got {0} links")]
    TooShort(usize),
    #[error("first link `{0}` must be fixed")]
    BaseNotFixed(String),
    #[error("last link `{0}` must be fixed")]
    TipNotFixed(String),
    #[error("chain has no revolute links")]
    NoJoints,
    #[error("link `{link}` has negative visual length {length}")]
    BadLength { link: String, length: f32 },
    #[error("link `{link}` has limits [{min}, {max}] with min > max")]
    BadLimits { link: String, min: f32, max: f32 },
    #[error("link `{link}` offset y {found} does not match parent visual length {expected}")]
    OffsetMismatch {
        link: String,
        expected: f32,
        found: f32,
    },
}

/// A validated serial chain: fixed base, revolute links, fixed tip.
///
/// Construction goes through [`Chain::build`], which enforces the pivot
/// placement invariant (each non-root offset y equals its parent's visual
/// length, so segments join pivot to pivot) and well-formed joint limits.
/// All kinematic queries are pure functions of the angle vector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Chain {
    links: Vec<LinkSpec>,
    joints: Vec<usize>,
    limits: Vec<[f32; 2]>,
    reach: f32,
}

impl Chain {
    pub fn build(links: Vec<LinkSpec>) -> Result<Chain, ChainError> {
        if links.len() < 2 {
            return Err(ChainError::TooShort(links.len()));
        }
        if links[0].kind != LinkKind::Fixed {
            return Err(ChainError::BaseNotFixed(links[0].name.clone()));
        }
        if links[links.len() - 1].kind != LinkKind::Fixed {
            return Err(ChainError::TipNotFixed(links[links.len() - 1].name.clone()));
        }

        let mut joints = vec![];
        let mut limits = vec![];
        for (i, link) in links.iter().enumerate() {
            if link.visual_length < 0.0 {
                return Err(ChainError::BadLength {
                    link: link.name.clone(),
                    length: link.visual_length,
                });
            }
            if let LinkKind::Revolute { limits: lim, .. } = link.kind {
                if lim[0] > lim[1] {
                    return Err(ChainError::BadLimits {
                        link: link.name.clone(),
                        min: lim[0],
                        max: lim[1],
                    });
                }
                joints.push(i);
                limits.push(lim);
            }
            if i > 0 {
                let expected = links[i - 1].visual_length;
                if (link.offset.y - expected).abs() > OFFSET_TOLERANCE {
                    return Err(ChainError::OffsetMismatch {
                        link: link.name.clone(),
                        expected,
                        found: link.offset.y,
                    });
                }
            }
        }
        if joints.is_empty() {
            return Err(ChainError::NoJoints);
        }

        let reach = links.iter().map(|x| x.visual_length).sum();

        Ok(Chain {
            links,
            joints,
            limits,
            reach,
        })
    }

    /// The default test arm: a yaw joint about Y followed by pitch joints
    /// about Z, equal-length links, all limits at full circle.
    pub fn uniform_arm(dof: usize, link_length: f32) -> Chain {
        assert!(dof >= 1, "arm needs at least one joint");
        let mut links = vec![LinkSpec::fixed("base", Vector3::zeros(), 0.0)];
        for i in 0..dof {
            let axis = if i == 0 { JointAxis::Y } else { JointAxis::Z };
            let offset = if i == 0 {
                Vector3::zeros()
            } else {
                Vector3::new(0.0, link_length, 0.0)
            };
            links.push(LinkSpec::revolute(
                &format!("joint_{}", i + 1),
                axis,
                [-PI, PI],
                offset,
                link_length,
            ));
        }
        links.push(LinkSpec::fixed(
            "tip",
            Vector3::new(0.0, link_length, 0.0),
            0.0,
        ));
        Chain::build(links).expect("uniform arm construction is valid")
    }

    ///rebuild with all offsets and visual lengths multiplied by factor
    pub fn scaled(&self, factor: f32) -> Chain {
        let links = self
            .links
            .iter()
            .map(|link| LinkSpec {
                offset: link.offset * factor,
                visual_length: link.visual_length * factor,
                ..link.clone()
            })
            .collect();
        Chain {
            links,
            joints: self.joints.clone(),
            limits: self.limits.clone(),
            reach: self.reach * factor,
        }
    }

    ///number of revolute joints
    pub fn dof(&self) -> usize {
        self.joints.len()
    }

    pub fn links(&self) -> &[LinkSpec] {
        &self.links
    }

    ///per-joint angle limits, chain order
    pub fn joint_limits(&self) -> &[[f32; 2]] {
        &self.limits
    }

    ///link index of the given joint slot
    pub fn joint_link_index(&self, joint: usize) -> usize {
        self.joints[joint]
    }

    pub fn joint_axis(&self, joint: usize) -> JointAxis {
        match self.links[self.joints[joint]].kind {
            LinkKind::Revolute { axis, .. } => axis,
            LinkKind::Fixed => unreachable!("joint indices only point at revolute links"),
        }
    }

    ///sum of visual lengths; upper bound on tip distance from the base
    pub fn reach(&self) -> f32 {
        self.reach
    }

    /// World transform of every link, in chain order, for the given angles.
    pub fn fk_transforms(&self, q: &[f32]) -> Vec<Isometry3<f32>> {
        assert_eq!(
            q.len(),
            self.joints.len(),
            "configuration length must match chain dof"
        );
        let mut transforms = Vec::with_capacity(self.links.len());
        let mut world = Isometry3::identity();
        let mut joint = 0;
        for link in &self.links {
            world = world * link_transform(link, q, &mut joint);
            transforms.push(world);
        }
        transforms
    }

    /// World position of every link pivot, in chain order.
    pub fn joint_positions(&self, q: &[f32]) -> Vec<Point3<f32>> {
        self.fk_transforms(q)
            .iter()
            .map(|t| Point3::from(t.translation.vector))
            .collect()
    }

    /// World position of the final link's pivot.
    pub fn tip_position(&self, q: &[f32]) -> Point3<f32> {
        assert_eq!(
            q.len(),
            self.joints.len(),
            "configuration length must match chain dof"
        );
        let mut world = Isometry3::identity();
        let mut joint = 0;
        for link in &self.links {
            world = world * link_transform(link, q, &mut joint);
        }
        Point3::from(world.translation.vector)
    }

    ///one angle per joint, uniform within that joint's limits
    pub fn sample_configuration(&self, rng: &mut impl Rng) -> Vec<f32> {
        self.limits
            .iter()
            .map(|&[lo, hi]| if hi > lo { rng.gen_range(lo..hi) } else { lo })
            .collect()
    }

    ///clamp every angle into its joint's limits
    pub fn clamp_to_limits(&self, q: &mut [f32]) {
        for (angle, &[lo, hi]) in q.iter_mut().zip(self.limits.iter()) {
            *angle = angle.clamp(lo, hi);
        }
    }
}

///local transform of one link: offset translation, then the joint rotation
fn link_transform(link: &LinkSpec, q: &[f32], joint: &mut usize) -> Isometry3<f32> {
    let rotation = match link.kind {
        LinkKind::Revolute { axis, .. } => {
            let angle = q[*joint];
            *joint += 1;
            match axis {
                JointAxis::Y => UnitQuaternion::from_axis_angle(&Vector3::y_axis(), angle),
                JointAxis::Z => UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angle),
            }
        }
        LinkKind::Fixed => UnitQuaternion::identity(),
    };
    Isometry3::from_parts(Translation3::from(link.offset), rotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::Mulberry32;

    #[test]
    fn test_build_rejects_short_chain() {
        let links = vec![LinkSpec::fixed("base", Vector3::zeros(), 0.0)];
        assert_eq!(Chain::build(links).unwrap_err(), ChainError::TooShort(1));
    }

    #[test]
    fn test_build_rejects_revolute_base() {
        let links = vec![
            LinkSpec::revolute("j", JointAxis::Z, [-1.0, 1.0], Vector3::zeros(), 1.0),
            LinkSpec::fixed("tip", Vector3::new(0.0, 1.0, 0.0), 0.0),
        ];
        assert!(matches!(
            Chain::build(links).unwrap_err(),
            ChainError::BaseNotFixed(_)
        ));
    }

    #[test]
    fn test_build_rejects_bad_limits() {
        let links = vec![
            LinkSpec::fixed("base", Vector3::zeros(), 0.0),
            LinkSpec::revolute("j", JointAxis::Z, [1.0, -1.0], Vector3::zeros(), 1.0),
            LinkSpec::fixed("tip", Vector3::new(0.0, 1.0, 0.0), 0.0),
        ];
        assert!(matches!(
            Chain::build(links).unwrap_err(),
            ChainError::BadLimits { .. }
        ));
    }

    #[test]
    fn test_build_rejects_offset_mismatch() {
        let links = vec![
            LinkSpec::fixed("base", Vector3::zeros(), 0.0),
            LinkSpec::revolute("j", JointAxis::Z, [-1.0, 1.0], Vector3::zeros(), 1.0),
            LinkSpec::fixed("tip", Vector3::new(0.0, 0.5, 0.0), 0.0),
        ];
        assert!(matches!(
            Chain::build(links).unwrap_err(),
            ChainError::OffsetMismatch { .. }
        ));
    }

    #[test]
    fn test_build_rejects_jointless_chain() {
        let links = vec![
            LinkSpec::fixed("base", Vector3::zeros(), 1.0),
            LinkSpec::fixed("tip", Vector3::new(0.0, 1.0, 0.0), 0.0),
        ];
        assert_eq!(Chain::build(links).unwrap_err(), ChainError::NoJoints);
    }

    #[test]
    fn test_straight_arm_fk() {
        let chain = Chain::uniform_arm(2, 1.0);
        let tip = chain.tip_position(&[0.0, 0.0]);
        assert!((tip - Point3::new(0.0, 2.0, 0.0)).norm() < 1e-5);
        assert_eq!(chain.reach(), 2.0);
    }

    #[test]
    fn test_pitch_bends_in_plane() {
        use std::f32::consts::FRAC_PI_2;
        let chain = Chain::uniform_arm(2, 1.0);
        // second joint bends about z: local +y maps to -x
        let tip = chain.tip_position(&[0.0, FRAC_PI_2]);
        assert!((tip - Point3::new(-1.0, 1.0, 0.0)).norm() < 1e-5);
    }

    #[test]
    fn test_yaw_rotates_bent_arm_out_of_plane() {
        use std::f32::consts::FRAC_PI_2;
        let chain = Chain::uniform_arm(2, 1.0);
        // yaw about y carries the bent segment from -x onto +z
        let tip = chain.tip_position(&[FRAC_PI_2, FRAC_PI_2]);
        assert!((tip - Point3::new(0.0, 1.0, 1.0)).norm() < 1e-5);
    }

    #[test]
    fn test_joint_positions_lie_on_segment_endpoints() {
        let chain = Chain::uniform_arm(3, 1.0);
        let positions = chain.joint_positions(&[0.0, 0.0, 0.0]);
        assert_eq!(positions.len(), 5);
        for (i, p) in positions.iter().enumerate() {
            let expected_y = (i as f32 - 1.0).max(0.0).min(3.0);
            assert!((p.y - expected_y).abs() < 1e-5, "pivot {} at {:?}", i, p);
        }
    }

    #[test]
    fn test_scaled_chain() {
        let chain = Chain::uniform_arm(4, 1.0).scaled(0.5);
        assert!((chain.reach() - 2.0).abs() < 1e-6);
        let tip = chain.tip_position(&[0.0; 4]);
        assert!((tip - Point3::new(0.0, 2.0, 0.0)).norm() < 1e-5);
    }

    #[test]
    fn test_sampled_configurations_respect_limits() {
        let links = vec![
            LinkSpec::fixed("base", Vector3::zeros(), 0.0),
            LinkSpec::revolute("j1", JointAxis::Y, [-0.5, 0.25], Vector3::zeros(), 1.0),
            LinkSpec::revolute(
                "j2",
                JointAxis::Z,
                [0.1, 0.1],
                Vector3::new(0.0, 1.0, 0.0),
                1.0,
            ),
            LinkSpec::fixed("tip", Vector3::new(0.0, 1.0, 0.0), 0.0),
        ];
        let chain = Chain::build(links).unwrap();
        let mut rng = Mulberry32::new(3);
        for _ in 0..200 {
            let q = chain.sample_configuration(&mut rng);
            assert!(q[0] >= -0.5 && q[0] < 0.25);
            assert_eq!(q[1], 0.1);
        }
    }
}
