//! shared tree engine primitives

pub mod connect;
pub mod standard;

use nalgebra::Point3;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::collision::{CollisionModel, Obstacle};
use crate::kinematics::Chain;
use crate::sampler::Mulberry32;

///joint-space subdivision step for segment validation, radians
pub const RESOLUTION: f32 = 0.05;
///extensions shorter than this are treated as no progress
pub const DUPLICATE_EPS: f32 = 1e-6;
///wall clock budget per plan call, checked at the top of each iteration
pub const WALL_CLOCK_LIMIT_MS: f64 = 3000.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub q: Vec<f32>,
    ///arena index of the parent; the root has none
    pub parent: Option<usize>,
}

/// Arena tree: nodes in insertion order, parents by index.
///
/// Every non-root node's parent precedes it, so path reconstruction and
/// serialization are simple index walks and the nearest query is one linear
/// scan. Swapping two trees is swapping two arena handles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn with_root(q: Vec<f32>) -> Tree {
        Tree {
            nodes: vec![Node { q, parent: None }],
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: usize) -> &Node {
        &self.nodes[idx]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn insert(&mut self, q: Vec<f32>, parent: usize) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node {
            q,
            parent: Some(parent),
        });
        idx
    }

    ///linear scan on squared distance; ties keep the earliest insertion
    pub fn nearest(&self, q: &[f32]) -> usize {
        let mut best = 0;
        let mut best_dist = joint_distance_sq(&self.nodes[0].q, q);
        for (idx, node) in self.nodes.iter().enumerate().skip(1) {
            let dist = joint_distance_sq(&node.q, q);
            if dist < best_dist {
                best_dist = dist;
                best = idx;
            }
        }
        best
    }

    ///configurations from the root to the given node, inclusive
    pub fn path_from_root(&self, idx: usize) -> Vec<Vec<f32>> {
        let mut path = vec![];
        let mut current = Some(idx);
        while let Some(i) = current {
            path.push(self.nodes[i].q.clone());
            current = self.nodes[i].parent;
        }
        path.reverse();
        path
    }
}

pub fn joint_distance_sq(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

pub fn joint_distance(a: &[f32], b: &[f32]) -> f32 {
    joint_distance_sq(a, b).sqrt()
}

///move from `from` toward `to`, at most `step` in joint space
pub fn steer(from: &[f32], to: &[f32], step: f32) -> Vec<f32> {
    let dist = joint_distance(from, to);
    if dist <= step {
        return to.to_vec();
    }
    let scale = step / dist;
    from.iter()
        .zip(to.iter())
        .map(|(a, b)| a + (b - a) * scale)
        .collect()
}

/// Per-run state shared by both engines: borrowed scene, solved goal, and
/// the seeded generator that owns all randomness for the run.
pub(crate) struct PlanContext<'a> {
    pub chain: &'a Chain,
    pub model: &'a CollisionModel,
    pub obstacles: &'a [Obstacle],
    pub q_start: &'a [f32],
    pub q_goal: Vec<f32>,
    pub target: Point3<f32>,
    pub step_size: f32,
    pub max_iter: u32,
    pub goal_bias: f32,
    pub rng: Mulberry32,
}

impl<'a> PlanContext<'a> {
    pub fn collides(&self, q: &[f32]) -> bool {
        self.model.collides(self.chain, q, self.obstacles)
    }

    ///goal-biased sample: the goal configuration or a uniform draw
    pub fn sample(&mut self) -> Vec<f32> {
        if self.rng.gen::<f32>() < self.goal_bias {
            self.q_goal.clone()
        } else {
            self.chain.sample_configuration(&mut self.rng)
        }
    }

    /// Interpolated validity of the straight joint-space segment.
    ///
    /// Short segments check the far endpoint only; longer ones are
    /// subdivided at [`RESOLUTION`] so a large step cannot tunnel through a
    /// thin obstacle.
    pub fn segment_valid(&self, from: &[f32], to: &[f32]) -> bool {
        let dist = joint_distance(from, to);
        if dist < RESOLUTION {
            return !self.collides(to);
        }
        let steps = (dist / RESOLUTION).ceil() as usize;
        let mut q = vec![0.0; from.len()];
        for i in 1..=steps {
            let t = i as f32 / steps as f32;
            for (k, value) in q.iter_mut().enumerate() {
                *value = from[k] + (to[k] - from[k]) * t;
            }
            if self.collides(&q) {
                return false;
            }
        }
        true
    }

    /// One extend: steer from the nearest node toward the sample, validate,
    /// append. `None` when the step makes no progress or is blocked.
    pub fn extend(&self, tree: &mut Tree, sample: &[f32]) -> Option<usize> {
        let nearest = tree.nearest(sample);
        let q_new = steer(&tree.node(nearest).q, sample, self.step_size);
        if joint_distance(&tree.node(nearest).q, &q_new) < DUPLICATE_EPS {
            return None;
        }
        if !self.segment_valid(&tree.node(nearest).q, &q_new) {
            return None;
        }
        Some(tree.insert(q_new, nearest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::Aabb;
    use crate::collision::CollisionModel;
    use crate::kinematics::{Chain, JointAxis, LinkSpec};
    use nalgebra::Vector3;

    #[test]
    fn test_steer_contract() {
        let from = vec![0.0, 0.0, 0.0];
        let to = vec![1.0, 2.0, 2.0];
        for &step in &[0.1, 0.5, 1.0, 2.9, 3.0, 5.0] {
            let q = steer(&from, &to, step);
            let expected = joint_distance(&from, &to).min(step);
            assert!((joint_distance(&from, &q) - expected).abs() < 1e-5);
        }
    }

    #[test]
    fn test_steer_reaches_close_targets_exactly() {
        let from = vec![0.1, 0.2];
        let to = vec![0.2, 0.3];
        assert_eq!(steer(&from, &to, 1.0), to);
    }

    #[test]
    fn test_nearest_tie_keeps_earliest() {
        let mut tree = Tree::with_root(vec![1.0]);
        tree.insert(vec![3.0], 0);
        // query equidistant from both nodes
        assert_eq!(tree.nearest(&[2.0]), 0);
    }

    #[test]
    fn test_path_from_root_order() {
        let mut tree = Tree::with_root(vec![0.0]);
        let a = tree.insert(vec![1.0], 0);
        let b = tree.insert(vec![2.0], a);
        assert_eq!(
            tree.path_from_root(b),
            vec![vec![0.0], vec![1.0], vec![2.0]]
        );
    }

    fn one_dof_context<'a>(
        chain: &'a Chain,
        model: &'a CollisionModel,
        obstacles: &'a [Obstacle],
    ) -> PlanContext<'a> {
        PlanContext {
            chain,
            model,
            obstacles,
            q_start: &[],
            q_goal: vec![0.0],
            target: Point3::origin(),
            step_size: 0.2,
            max_iter: 100,
            goal_bias: 0.1,
            rng: Mulberry32::new(1),
        }
    }

    #[test]
    fn test_segment_validation_catches_tunneling() {
        // a thin wall straddling the upright pose: both endpoints of the
        // swing are free, the middle is not
        let links = vec![
            LinkSpec::fixed("base", Vector3::zeros(), 0.0),
            LinkSpec::revolute(
                "j1",
                JointAxis::Z,
                [-std::f32::consts::PI, std::f32::consts::PI],
                Vector3::zeros(),
                2.0,
            ),
            LinkSpec::fixed("tip", Vector3::new(0.0, 2.0, 0.0), 0.0),
        ];
        let chain = Chain::build(links).unwrap();
        let model = CollisionModel::default();
        let obstacles = vec![Obstacle::Aabb(Aabb::new(
            Point3::new(-0.02, 1.0, -1.0),
            Point3::new(0.02, 3.0, 1.0),
        ))];
        let ctx = one_dof_context(&chain, &model, &obstacles);

        assert!(!ctx.collides(&[-0.6]));
        assert!(!ctx.collides(&[0.6]));
        assert!(ctx.collides(&[0.0]));
        assert!(!ctx.segment_valid(&[-0.6], &[0.6]));
        assert!(ctx.segment_valid(&[-0.6], &[-0.55]));
    }

    #[test]
    fn test_extend_skips_duplicates() {
        let chain = Chain::uniform_arm(1, 1.0);
        let model = CollisionModel::default();
        let ctx = PlanContext {
            chain: &chain,
            model: &model,
            obstacles: &[],
            q_start: &[],
            q_goal: vec![0.0],
            target: Point3::origin(),
            step_size: 0.2,
            max_iter: 100,
            goal_bias: 0.1,
            rng: Mulberry32::new(1),
        };
        let mut tree = Tree::with_root(vec![0.5]);
        assert_eq!(ctx.extend(&mut tree, &[0.5]), None);
        assert_eq!(tree.len(), 1);
        assert!(ctx.extend(&mut tree, &[0.8]).is_some());
        assert_eq!(tree.len(), 2);
    }
}
