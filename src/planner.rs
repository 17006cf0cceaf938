//! planning facade: preflight, engine dispatch, results

use nalgebra::Point3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::collision::{CollisionModel, Obstacle};
use crate::ik;
use crate::instrumentation::Timer;
use crate::kinematics::Chain;
use crate::planner_param::{Algorithm, PlanParams};
use crate::rrt::{connect, standard, PlanContext, Tree};
use crate::sampler::Mulberry32;

///targets beyond this fraction of total reach fail preflight
pub const REACH_FACTOR: f32 = 0.95;
///progressive tip-distance thresholds for the near-goal neighbor search
const NEIGHBOR_THRESHOLDS: [f32; 4] = [0.20, 0.30, 0.40, 0.50];
///candidates sampled per threshold
const NEIGHBOR_CANDIDATES: usize = 75;
///per-joint jitter amplitude around the colliding goal, radians
const NEIGHBOR_JITTER: f32 = 0.8;

/// Why a plan (or greedy solve) produced no path. All variants are values;
/// nothing here aborts the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    None,
    ///iteration budget or wall clock expired; details say which
    Timeout,
    ///target beyond the reachable fraction of total arm length
    Unreachable,
    ///the solved goal and its sampled neighbors all collide
    GoalInCollision,
    ///a direct greedy solve self-intersects (planner retries instead)
    SelfCollision,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    pub start_nodes: usize,
    pub goal_nodes: usize,
    pub meet_iteration: Option<u32>,
}

/// Outcome of [`ArmPlanner::plan`].
///
/// On success `path` starts at the requested configuration and ends with
/// the tip inside the goal tolerance; on failure it is `None` and
/// `failure`/`details` say why. `tree_stats` is present whenever trees were
/// grown, success or not.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    pub path: Option<Vec<Vec<f32>>>,
    pub failure: FailureReason,
    pub details: String,
    pub tree_stats: Option<TreeStats>,
}

impl PlanResult {
    pub fn is_success(&self) -> bool {
        self.failure == FailureReason::None
    }

    fn preflight_failure(failure: FailureReason, details: String) -> PlanResult {
        PlanResult {
            path: None,
            failure,
            details,
            tree_stats: None,
        }
    }
}

///result of the direct greedy solve
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IkSolution {
    pub q: Vec<f32>,
    pub failure: FailureReason,
    pub details: String,
}

///one tree node in parent-index form, for external consumers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedNode {
    pub angles: Vec<f32>,
    pub parent: Option<usize>,
}

/// Owns a chain and its collision model; runs plans against borrowed
/// obstacle sets and keeps the last run's trees for serialization.
///
/// The chain may be swapped between runs ([`ArmPlanner::rebuild`]), never
/// during one; `plan` is a long-running synchronous call with no global
/// state, so a host typically parks the planner on a worker thread.
pub struct ArmPlanner {
    chain: Chain,
    model: CollisionModel,
    last_trees: Vec<SerializedNode>,
}

impl ArmPlanner {
    pub fn new(chain: Chain, model: CollisionModel) -> ArmPlanner {
        ArmPlanner {
            chain,
            model,
            last_trees: vec![],
        }
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn model(&self) -> &CollisionModel {
        &self.model
    }

    ///replace the chain and collision model between planning runs
    pub fn rebuild(&mut self, chain: Chain, model: CollisionModel) {
        self.chain = chain;
        self.model = model;
        self.last_trees.clear();
    }

    /// Plan a path from `q_start` to a configuration whose tip reaches
    /// `target`, avoiding the given obstacles.
    pub fn plan(
        &mut self,
        q_start: &[f32],
        target: Point3<f32>,
        obstacles: &[Obstacle],
        params: &PlanParams,
    ) -> PlanResult {
        assert_eq!(
            q_start.len(),
            self.chain.dof(),
            "start configuration length must match chain dof"
        );
        let params = params.sanitized();
        let seed = params
            .seed
            .unwrap_or_else(|| SmallRng::from_entropy().gen());
        let mut rng = Mulberry32::new(seed);
        let mut timer = Timer::default();
        self.last_trees.clear();

        let reach = self.chain.reach();
        let distance = target.coords.norm();
        if distance > REACH_FACTOR * reach {
            let details = format!(
                "target at {:.2} lies beyond {}% of total reach {:.2}",
                distance,
                (REACH_FACTOR * 100.0) as u32,
                reach
            );
            info!("plan rejected: {}", details);
            return PlanResult::preflight_failure(FailureReason::Unreachable, details);
        }

        let mut q_goal = ik::robust_ik(
            &self.chain,
            &self.model,
            &target,
            q_start,
            obstacles,
            &mut rng,
        );
        if self.model.collides(&self.chain, &q_goal, obstacles) {
            match self.find_valid_neighbor(&q_goal, &target, obstacles, &mut rng) {
                Some(q) => q_goal = q,
                None => {
                    let details =
                        "goal configuration and its sampled neighbors collide; target too close to an obstacle"
                            .to_string();
                    info!("plan rejected: {}", details);
                    return PlanResult::preflight_failure(FailureReason::GoalInCollision, details);
                }
            }
        }

        let (result, snapshot) = {
            let mut ctx = PlanContext {
                chain: &self.chain,
                model: &self.model,
                obstacles,
                q_start,
                q_goal,
                target,
                step_size: params.step_size,
                max_iter: params.max_iter,
                goal_bias: params.goal_bias,
                rng,
            };
            match params.algorithm {
                Algorithm::Standard => {
                    let (result, tree) = standard::solve(&mut ctx);
                    (result, serialize_trees(&[&tree]))
                }
                Algorithm::Connect => {
                    let (result, start_tree, goal_tree) = connect::solve(&mut ctx);
                    (result, serialize_trees(&[&start_tree, &goal_tree]))
                }
            }
        };
        self.last_trees = snapshot;

        info!(
            "plan finished in {:.1} ms: {:?}",
            timer.dur_ms(),
            result.failure
        );
        result
    }

    /// One greedy CCD solve validated against the collision engine; the
    /// channel for hosts that drag a target around without planning.
    pub fn solve_ik(
        &self,
        q_current: &[f32],
        target: Point3<f32>,
        obstacles: &[Obstacle],
    ) -> IkSolution {
        assert_eq!(
            q_current.len(),
            self.chain.dof(),
            "configuration length must match chain dof"
        );
        let reach = self.chain.reach();
        let distance = target.coords.norm();
        if distance > REACH_FACTOR * reach {
            return IkSolution {
                q: q_current.to_vec(),
                failure: FailureReason::Unreachable,
                details: format!(
                    "target at {:.2} lies beyond {}% of total reach {:.2}",
                    distance,
                    (REACH_FACTOR * 100.0) as u32,
                    reach
                ),
            };
        }
        let q = ik::ccd(&self.chain, &target, q_current);
        if self.model.self_collides(&self.chain, &q) {
            return IkSolution {
                q,
                failure: FailureReason::SelfCollision,
                details: "greedy solve self-intersects".to_string(),
            };
        }
        if self.model.obstacle_collides(&self.chain, &q, obstacles) {
            return IkSolution {
                q,
                failure: FailureReason::GoalInCollision,
                details: "greedy solve collides with an obstacle".to_string(),
            };
        }
        let error = (self.chain.tip_position(&q) - target).norm();
        IkSolution {
            q,
            failure: FailureReason::None,
            details: format!("tip error {:.3}", error),
        }
    }

    /// The last run's trees as one parent-index array, insertion order.
    ///
    /// For RRT-Connect the list is start tree then goal tree with parent
    /// indices re-based against the concatenation; `tree_stats` carries the
    /// per-tree node counts for color segmentation. Valid after failed runs
    /// too, so visual debugging keeps working.
    pub fn serialize_last_tree(&self) -> &[SerializedNode] {
        &self.last_trees
    }

    /// Jittered neighbor search around a colliding goal configuration:
    /// widening tip-distance thresholds, a fixed candidate budget per
    /// threshold, first collision-free candidate inside the current
    /// threshold wins.
    fn find_valid_neighbor(
        &self,
        q_goal: &[f32],
        target: &Point3<f32>,
        obstacles: &[Obstacle],
        rng: &mut Mulberry32,
    ) -> Option<Vec<f32>> {
        let limits = self.chain.joint_limits();
        let mut best: Option<(Vec<f32>, f32)> = None;
        for &threshold in NEIGHBOR_THRESHOLDS.iter() {
            if let Some((q, d)) = &best {
                if *d < threshold {
                    debug!("goal neighbor accepted at tip distance {:.3}", d);
                    return Some(q.clone());
                }
            }
            for _ in 0..NEIGHBOR_CANDIDATES {
                let candidate: Vec<f32> = q_goal
                    .iter()
                    .zip(limits.iter())
                    .map(|(&angle, &[lo, hi])| {
                        (angle + rng.gen_range(-NEIGHBOR_JITTER..NEIGHBOR_JITTER)).clamp(lo, hi)
                    })
                    .collect();
                if self.model.collides(&self.chain, &candidate, obstacles) {
                    continue;
                }
                let distance = (self.chain.tip_position(&candidate) - target).norm();
                if best.as_ref().map_or(true, |(_, d)| distance < *d) {
                    best = Some((candidate, distance));
                }
                if let Some((q, d)) = &best {
                    if *d < threshold {
                        debug!("goal neighbor accepted at tip distance {:.3}", d);
                        return Some(q.clone());
                    }
                }
            }
        }
        None
    }
}

fn serialize_trees(trees: &[&Tree]) -> Vec<SerializedNode> {
    let mut out = vec![];
    for tree in trees {
        let base = out.len();
        for node in tree.nodes() {
            out.push(SerializedNode {
                angles: node.q.clone(),
                parent: node.parent.map(|p| p + base),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::{JointAxis, LinkSpec};
    use nalgebra::Vector3;

    #[test]
    fn test_serialize_trees_rebases_parents() {
        let mut start = Tree::with_root(vec![0.0]);
        start.insert(vec![0.1], 0);
        let mut goal = Tree::with_root(vec![1.0]);
        goal.insert(vec![0.9], 0);
        goal.insert(vec![0.8], 1);

        let nodes = serialize_trees(&[&start, &goal]);
        assert_eq!(nodes.len(), 5);
        assert_eq!(nodes[0].parent, None);
        assert_eq!(nodes[1].parent, Some(0));
        assert_eq!(nodes[2].parent, None);
        assert_eq!(nodes[3].parent, Some(2));
        assert_eq!(nodes[4].parent, Some(3));
    }

    #[test]
    fn test_solve_ik_reports_unreachable() {
        let planner = ArmPlanner::new(Chain::uniform_arm(3, 1.0), CollisionModel::default());
        let out = planner.solve_ik(&[0.0; 3], Point3::new(10.0, 0.0, 0.0), &[]);
        assert_eq!(out.failure, FailureReason::Unreachable);
        assert_eq!(out.q, vec![0.0; 3]);
    }

    #[test]
    fn test_solve_ik_open_space_succeeds() {
        let planner = ArmPlanner::new(Chain::uniform_arm(5, 1.0), CollisionModel::default());
        let out = planner.solve_ik(&[0.0; 5], Point3::new(1.5, 1.5, 0.0), &[]);
        assert_eq!(out.failure, FailureReason::None);
    }

    #[test]
    fn test_solve_ik_reports_self_collision() {
        // joints pinned into a zig-zag fold: the greedy solve can only
        // return the folded configuration, which self-intersects
        let pi = std::f32::consts::PI;
        let links = vec![
            LinkSpec::fixed("base", Vector3::zeros(), 0.0),
            LinkSpec::revolute("j1", JointAxis::Z, [0.0, 0.0], Vector3::zeros(), 1.0),
            LinkSpec::revolute(
                "j2",
                JointAxis::Z,
                [3.0, 3.0],
                Vector3::new(0.0, 1.0, 0.0),
                1.0,
            ),
            LinkSpec::revolute(
                "j3",
                JointAxis::Z,
                [3.0, 3.0],
                Vector3::new(0.0, 1.0, 0.0),
                1.0,
            ),
            LinkSpec::revolute(
                "j4",
                JointAxis::Z,
                [-pi, pi],
                Vector3::new(0.0, 1.0, 0.0),
                1.0,
            ),
            LinkSpec::fixed("tip", Vector3::new(0.0, 1.0, 0.0), 0.0),
        ];
        let chain = Chain::build(links).unwrap();
        let planner = ArmPlanner::new(chain, CollisionModel::default());
        let out = planner.solve_ik(&[0.0, 3.0, 3.0, 0.0], Point3::new(1.0, 1.0, 0.0), &[]);
        assert_eq!(out.failure, FailureReason::SelfCollision);
    }
}
