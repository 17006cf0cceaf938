//! single tree, goal biased RRT

use crate::instrumentation::Timer;
use crate::planner::{FailureReason, PlanResult, TreeStats};
use crate::rrt::{PlanContext, Tree, WALL_CLOCK_LIMIT_MS};

///task-space distance at which a new node counts as reaching the goal
pub const GOAL_TOLERANCE: f32 = 0.2;

/// Grow one tree from the start until a node's tip lands within
/// [`GOAL_TOLERANCE`] of the target, the iteration budget runs out, or the
/// wall clock limit fires.
pub(crate) fn solve(ctx: &mut PlanContext<'_>) -> (PlanResult, Tree) {
    let mut tree = Tree::with_root(ctx.q_start.to_vec());
    let mut timer = Timer::default();

    for iteration in 0..ctx.max_iter {
        if timer.dur_ms() > WALL_CLOCK_LIMIT_MS {
            info!(
                "standard rrt out of time on iteration {}, nodes: {}",
                iteration,
                tree.len()
            );
            let result = PlanResult {
                path: None,
                failure: FailureReason::Timeout,
                details: format!(
                    "wall clock limit of {:.0} ms exceeded after {} iterations",
                    WALL_CLOCK_LIMIT_MS, iteration
                ),
                tree_stats: Some(stats(&tree, None)),
            };
            return (result, tree);
        }

        let sample = ctx.sample();
        if let Some(idx) = ctx.extend(&mut tree, &sample) {
            let tip = ctx.chain.tip_position(&tree.node(idx).q);
            if (tip - ctx.target).norm() < GOAL_TOLERANCE {
                info!(
                    "standard rrt reached goal on iteration {}, nodes: {}",
                    iteration,
                    tree.len()
                );
                let result = PlanResult {
                    path: Some(tree.path_from_root(idx)),
                    failure: FailureReason::None,
                    details: format!("reached goal on iteration {}", iteration),
                    tree_stats: Some(stats(&tree, Some(iteration))),
                };
                return (result, tree);
            }
        }
    }

    info!("standard rrt exhausted, nodes: {}", tree.len());
    let result = PlanResult {
        path: None,
        failure: FailureReason::Timeout,
        details: format!("iteration budget of {} exhausted", ctx.max_iter),
        tree_stats: Some(stats(&tree, None)),
    };
    (result, tree)
}

fn stats(tree: &Tree, meet_iteration: Option<u32>) -> TreeStats {
    TreeStats {
        start_nodes: tree.len(),
        goal_nodes: 0,
        meet_iteration,
    }
}
