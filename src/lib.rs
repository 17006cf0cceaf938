//! Sampling based motion planning for revolute-jointed serial arms.
//!
//! The crate is organized as a stack of small, pure subsystems:
//! [`kinematics`] holds the chain description and forward kinematics,
//! [`collision`] tests arm capsules against box obstacles and against each
//! other, [`ik`] solves for goal configurations via cyclic coordinate
//! descent with seeded restarts, and [`rrt`] grows goal-biased single or
//! bidirectional trees over those primitives. [`planner::ArmPlanner`] ties
//! the pieces together behind a plan/serialize facade.
//!
//! Planning failures are values, not errors: see
//! [`planner::FailureReason`]. The only hard error in the crate is chain
//! construction ([`kinematics::ChainError`]).

#[macro_use]
extern crate log;

pub mod collision;
pub mod ik;
pub mod instrumentation;
pub mod kinematics;
pub mod planner;
pub mod planner_param;
pub mod rrt;
pub mod sampler;

pub use crate::collision::{Aabb, CollisionModel, Obb, Obstacle};
pub use crate::kinematics::{Chain, ChainError, JointAxis, LinkKind, LinkSpec};
pub use crate::planner::{
    ArmPlanner, FailureReason, IkSolution, PlanResult, SerializedNode, TreeStats,
};
pub use crate::planner_param::{Algorithm, PlanParams};
pub use crate::sampler::Mulberry32;
