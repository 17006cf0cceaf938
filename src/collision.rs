//! arm vs obstacle and arm self-collision tests
//!
//! Segments between consecutive pivots are capsules; revolute pivots and
//! the tip carry extra spheres. Obstacle tests sample each capsule at a
//! fixed number of points and run sphere vs box checks; self-collision uses
//! the analytic closest distance between trimmed segment pairs, which is
//! both tighter and cheaper than resampling every capsule pair.

use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::kinematics::{Chain, LinkKind};

///padding added to arm radii when testing against obstacles
pub const MARGIN_OBSTACLE: f32 = 0.15;
///padding added to arm radii when testing the arm against itself
pub const MARGIN_SELF: f32 = 0.02;
///points sampled per capsule segment, endpoints included
pub const SEGMENT_SAMPLES: usize = 10;
///length cut from each segment end before the self test
pub const SEGMENT_TRIM: f32 = 0.15;
///boxes are pre-expanded by this much to paper over numeric noise
const BOX_EXPAND: f32 = 0.01;

const DEGENERATE_EPS: f32 = 1e-9;

/// Axis-aligned box obstacle.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Aabb {
    min: Point3<f32>,
    max: Point3<f32>,
}

impl Aabb {
    pub fn new(a: Point3<f32>, b: Point3<f32>) -> Aabb {
        Aabb {
            min: Point3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    pub fn min(&self) -> Point3<f32> {
        self.min
    }

    pub fn max(&self) -> Point3<f32> {
        self.max
    }

    ///squared distance to the clamped closest point of the expanded box
    fn intersects_sphere(&self, center: &Point3<f32>, radius: f32) -> bool {
        let closest = Point3::new(
            center.x.clamp(self.min.x - BOX_EXPAND, self.max.x + BOX_EXPAND),
            center.y.clamp(self.min.y - BOX_EXPAND, self.max.y + BOX_EXPAND),
            center.z.clamp(self.min.z - BOX_EXPAND, self.max.z + BOX_EXPAND),
        );
        (center - closest).norm_squared() < radius * radius
    }
}

/// Oriented box obstacle: half extents plus a world transform.
///
/// The inverse transform is cached at construction; obstacles are immutable
/// for the duration of a run.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Obb {
    half_size: Vector3<f32>,
    transform: Matrix4<f32>,
    inverse: Matrix4<f32>,
}

impl Obb {
    pub fn new(half_size: Vector3<f32>, transform: Matrix4<f32>) -> Obb {
        let inverse = match transform.try_inverse() {
            Some(inverse) => inverse,
            None => {
                warn!("obb world transform is singular, treating as identity");
                Matrix4::identity()
            }
        };
        Obb {
            half_size,
            transform,
            inverse,
        }
    }

    pub fn half_size(&self) -> Vector3<f32> {
        self.half_size
    }

    pub fn transform(&self) -> &Matrix4<f32> {
        &self.transform
    }

    fn intersects_sphere(&self, center: &Point3<f32>, radius: f32) -> bool {
        let local = self.inverse.transform_point(center);
        let clamped = Point3::new(
            local.x.clamp(-self.half_size.x, self.half_size.x),
            local.y.clamp(-self.half_size.y, self.half_size.y),
            local.z.clamp(-self.half_size.z, self.half_size.z),
        );
        (local - clamped).norm_squared() < radius * radius
    }
}

/// Obstacle variants; the inner loop dispatches on the tag per sample point.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum Obstacle {
    Aabb(Aabb),
    Obb(Obb),
}

impl Obstacle {
    pub fn intersects_sphere(&self, center: &Point3<f32>, radius: f32) -> bool {
        match self {
            Obstacle::Aabb(aabb) => aabb.intersects_sphere(center, radius),
            Obstacle::Obb(obb) => obb.intersects_sphere(center, radius),
        }
    }
}

/// Arm thickness model: capsule half width plus pivot sphere radii.
///
/// Obstacle tests and the self test use different paddings on top of these,
/// see [`MARGIN_OBSTACLE`] and [`MARGIN_SELF`]; adjacent segments are
/// legitimately close at joints, so the self margin is much tighter.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct CollisionModel {
    pub arm_half_width: f32,
    pub joint_radius: f32,
    pub tip_radius: f32,
}

impl Default for CollisionModel {
    fn default() -> CollisionModel {
        CollisionModel {
            arm_half_width: 0.1,
            joint_radius: 0.12,
            tip_radius: 0.12,
        }
    }
}

impl CollisionModel {
    ///all radii multiplied by factor, for chain rebuild scaling
    pub fn scaled(&self, factor: f32) -> CollisionModel {
        CollisionModel {
            arm_half_width: self.arm_half_width * factor,
            joint_radius: self.joint_radius * factor,
            tip_radius: self.tip_radius * factor,
        }
    }

    fn segment_radius(&self) -> f32 {
        self.arm_half_width + MARGIN_OBSTACLE
    }

    fn joint_sphere_radius(&self) -> f32 {
        self.joint_radius + MARGIN_OBSTACLE.min(0.1)
    }

    fn tip_sphere_radius(&self) -> f32 {
        self.tip_radius + MARGIN_OBSTACLE.min(0.1)
    }

    fn self_radius(&self) -> f32 {
        self.arm_half_width + MARGIN_SELF
    }

    /// True iff the configuration self-collides or hits any obstacle.
    ///
    /// Self is tested first: it is cheaper and independent of the obstacle
    /// count.
    pub fn collides(&self, chain: &Chain, q: &[f32], obstacles: &[Obstacle]) -> bool {
        self.self_collides(chain, q) || self.obstacle_collides(chain, q, obstacles)
    }

    /// True iff any pair of non-adjacent trimmed capsules comes closer than
    /// twice the self radius.
    pub fn self_collides(&self, chain: &Chain, q: &[f32]) -> bool {
        let positions = chain.joint_positions(q);
        let segments = arm_segments(chain, &positions);
        let min_gap = 2.0 * self.self_radius();
        for i in 0..segments.len() {
            for j in i + 2..segments.len() {
                let (a0, a1) = trim_segment(segments[i].0, segments[i].1);
                let (b0, b1) = trim_segment(segments[j].0, segments[j].1);
                if segment_distance(a0, a1, b0, b1) < min_gap {
                    return true;
                }
            }
        }
        false
    }

    /// True iff any sampled capsule point or pivot sphere hits an obstacle.
    pub fn obstacle_collides(&self, chain: &Chain, q: &[f32], obstacles: &[Obstacle]) -> bool {
        if obstacles.is_empty() {
            return false;
        }
        let positions = chain.joint_positions(q);

        let r_segment = self.segment_radius();
        for (start, end) in arm_segments(chain, &positions) {
            let direction = end - start;
            for k in 0..SEGMENT_SAMPLES {
                let t = k as f32 / (SEGMENT_SAMPLES - 1) as f32;
                let point = start + direction * t;
                if obstacles
                    .iter()
                    .any(|obstacle| obstacle.intersects_sphere(&point, r_segment))
                {
                    return true;
                }
            }
        }

        let r_joint = self.joint_sphere_radius();
        for (i, link) in chain.links().iter().enumerate() {
            if let LinkKind::Revolute { .. } = link.kind {
                if obstacles
                    .iter()
                    .any(|obstacle| obstacle.intersects_sphere(&positions[i], r_joint))
                {
                    return true;
                }
            }
        }

        let r_tip = self.tip_sphere_radius();
        let tip = positions[positions.len() - 1];
        obstacles
            .iter()
            .any(|obstacle| obstacle.intersects_sphere(&tip, r_tip))
    }
}

///capsule segments between consecutive pivots, links of zero length skipped
pub fn arm_segments(chain: &Chain, positions: &[Point3<f32>]) -> Vec<(Point3<f32>, Point3<f32>)> {
    let mut segments = vec![];
    for (i, link) in chain.links().iter().enumerate() {
        if link.visual_length > 0.0 && i + 1 < positions.len() {
            segments.push((positions[i], positions[i + 1]));
        }
    }
    segments
}

///pull both endpoints inward, collapsing short segments to their midpoint
fn trim_segment(a: Point3<f32>, b: Point3<f32>) -> (Point3<f32>, Point3<f32>) {
    let direction = b - a;
    let length = direction.norm();
    if length <= 2.0 * SEGMENT_TRIM {
        let mid = a + direction * 0.5;
        (mid, mid)
    } else {
        let unit = direction / length;
        (a + unit * SEGMENT_TRIM, b - unit * SEGMENT_TRIM)
    }
}

/// Minimum distance between segments [p1,q1] and [p2,q2].
///
/// The classic two-segment closest point computation: solve the
/// unconstrained 2x2 system, clamp s into [0,1], recompute t, re-clamp,
/// recompute s. Degenerate (point) segments fall out of the same code path.
pub fn segment_distance(
    p1: Point3<f32>,
    q1: Point3<f32>,
    p2: Point3<f32>,
    q2: Point3<f32>,
) -> f32 {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.norm_squared();
    let e = d2.norm_squared();
    let f = d2.dot(&r);

    let (s, t);
    if a <= DEGENERATE_EPS && e <= DEGENERATE_EPS {
        return r.norm();
    }
    if a <= DEGENERATE_EPS {
        s = 0.0;
        t = (f / e).clamp(0.0, 1.0);
    } else {
        let c = d1.dot(&r);
        if e <= DEGENERATE_EPS {
            t = 0.0;
            s = (-c / a).clamp(0.0, 1.0);
        } else {
            let b = d1.dot(&d2);
            let denom = a * e - b * b;
            let mut s_candidate = if denom.abs() > DEGENERATE_EPS {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t_candidate = (b * s_candidate + f) / e;
            if t_candidate < 0.0 {
                t_candidate = 0.0;
                s_candidate = (-c / a).clamp(0.0, 1.0);
            } else if t_candidate > 1.0 {
                t_candidate = 1.0;
                s_candidate = ((b - c) / a).clamp(0.0, 1.0);
            }
            s = s_candidate;
            t = t_candidate;
        }
    }

    let closest1 = p1 + d1 * s;
    let closest2 = p2 + d2 * t;
    (closest1 - closest2).norm()
}
