//! bidirectional RRT-Connect

use crate::ik;
use crate::instrumentation::Timer;
use crate::planner::{FailureReason, PlanResult, TreeStats};
use crate::rrt::{
    joint_distance, steer, PlanContext, Tree, DUPLICATE_EPS, WALL_CLOCK_LIMIT_MS,
};

///joint-space distance at which the connecting tree has met its target node
const MEET_TOLERANCE: f32 = 0.1;
///snap-to-target runs the final connect with a reduced step
const SNAP_STEP_FACTOR: f32 = 0.75;

/// Grow a tree from the start and one from the goal configuration; each
/// iteration extends one tree toward a sample and greedily connects the
/// other toward the new node, then the trees swap roles. The connect phase
/// works in joint space only, so the trees may meet anywhere in C-space;
/// a final snap pass pulls the tail of the path onto the task-space target.
pub(crate) fn solve(ctx: &mut PlanContext<'_>) -> (PlanResult, Tree, Tree) {
    let mut tree_a = Tree::with_root(ctx.q_start.to_vec());
    let mut tree_b = Tree::with_root(ctx.q_goal.clone());
    // swap exchanges the arena handles; this flag tracks which one is
    // rooted at the start so path orientation stays correct
    let mut a_is_start = true;
    let mut timer = Timer::default();

    for iteration in 0..ctx.max_iter {
        if timer.dur_ms() > WALL_CLOCK_LIMIT_MS {
            let details = format!(
                "wall clock limit of {:.0} ms exceeded after {} iterations",
                WALL_CLOCK_LIMIT_MS, iteration
            );
            return timeout(tree_a, tree_b, a_is_start, details);
        }

        let sample = ctx.sample();
        if let Some(new_a) = ctx.extend(&mut tree_a, &sample) {
            let q_new = tree_a.node(new_a).q.clone();
            if let Some(meet_b) = connect(ctx, &mut tree_b, &q_new) {
                info!(
                    "trees met on iteration {}, nodes: {} + {}",
                    iteration,
                    tree_a.len(),
                    tree_b.len()
                );
                let mut path = assemble_path(&tree_a, new_a, &tree_b, meet_b, a_is_start);
                if path.last().map(Vec::as_slice) != Some(ctx.q_goal.as_slice()) {
                    path.push(ctx.q_goal.clone());
                }
                snap_to_target(ctx, &mut path);

                let (start_tree, goal_tree) = orient(tree_a, tree_b, a_is_start);
                let result = PlanResult {
                    path: Some(path),
                    failure: FailureReason::None,
                    details: format!("trees met on iteration {}", iteration),
                    tree_stats: Some(TreeStats {
                        start_nodes: start_tree.len(),
                        goal_nodes: goal_tree.len(),
                        meet_iteration: Some(iteration),
                    }),
                };
                return (result, start_tree, goal_tree);
            }
        }

        std::mem::swap(&mut tree_a, &mut tree_b);
        a_is_start = !a_is_start;
    }

    let details = format!("iteration budget of {} exhausted", ctx.max_iter);
    timeout(tree_a, tree_b, a_is_start, details)
}

/// Greedy connect: from the nearest node keep steering toward `target_q`,
/// appending every valid step, until the chain meets the target in joint
/// space, a collision blocks progress, or a step fails to move.
fn connect(ctx: &PlanContext<'_>, tree: &mut Tree, target_q: &[f32]) -> Option<usize> {
    let mut current = tree.nearest(target_q);
    loop {
        let q_new = steer(&tree.node(current).q, target_q, ctx.step_size);
        if joint_distance(&tree.node(current).q, &q_new) < DUPLICATE_EPS {
            return None;
        }
        if !ctx.segment_valid(&tree.node(current).q, &q_new) {
            return None;
        }
        current = tree.insert(q_new, current);
        if joint_distance(&tree.node(current).q, target_q) < MEET_TOLERANCE {
            // the residual hop onto the target node joins the two path
            // halves, so it must validate like any other segment
            if ctx.segment_valid(&tree.node(current).q, target_q) {
                return Some(current);
            }
            return None;
        }
    }
}

///start half root-to-meet, then goal half meet-to-root
fn assemble_path(
    tree_a: &Tree,
    node_a: usize,
    tree_b: &Tree,
    node_b: usize,
    a_is_start: bool,
) -> Vec<Vec<f32>> {
    let (start_tree, start_node, goal_tree, goal_node) = if a_is_start {
        (tree_a, node_a, tree_b, node_b)
    } else {
        (tree_b, node_b, tree_a, node_a)
    };
    let mut path = start_tree.path_from_root(start_node);
    let mut goal_half = goal_tree.path_from_root(goal_node);
    goal_half.reverse();
    path.extend(goal_half);
    path
}

/// The trees may have met at a configuration whose tip is off the target;
/// re-solve IK from the tail of the path and connect toward it with a
/// reduced step, appending whatever portion succeeds. Failure is non-fatal.
fn snap_to_target(ctx: &mut PlanContext<'_>, path: &mut Vec<Vec<f32>>) {
    let tail = match path.last() {
        Some(q) => q.clone(),
        None => return,
    };
    let q_snap = ik::robust_ik(
        ctx.chain,
        ctx.model,
        &ctx.target,
        &tail,
        ctx.obstacles,
        &mut ctx.rng,
    );
    let step = ctx.step_size * SNAP_STEP_FACTOR;
    let mut current = tail;
    loop {
        let q_new = steer(&current, &q_snap, step);
        if joint_distance(&current, &q_new) < DUPLICATE_EPS {
            return;
        }
        if !ctx.segment_valid(&current, &q_new) {
            return;
        }
        path.push(q_new.clone());
        current = q_new;
        if joint_distance(&current, &q_snap) < MEET_TOLERANCE {
            return;
        }
    }
}

fn orient(tree_a: Tree, tree_b: Tree, a_is_start: bool) -> (Tree, Tree) {
    if a_is_start {
        (tree_a, tree_b)
    } else {
        (tree_b, tree_a)
    }
}

fn timeout(
    tree_a: Tree,
    tree_b: Tree,
    a_is_start: bool,
    details: String,
) -> (PlanResult, Tree, Tree) {
    let (start_tree, goal_tree) = orient(tree_a, tree_b, a_is_start);
    info!(
        "rrt connect out of budget, nodes: {} + {}",
        start_tree.len(),
        goal_tree.len()
    );
    let result = PlanResult {
        path: None,
        failure: FailureReason::Timeout,
        details,
        tree_stats: Some(TreeStats {
            start_nodes: start_tree.len(),
            goal_nodes: goal_tree.len(),
            meet_iteration: None,
        }),
    };
    (result, start_tree, goal_tree)
}
