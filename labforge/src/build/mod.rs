//! Build planning and per-node provisioning lifecycle.

pub mod job;
pub mod lifecycle;
pub mod plan;

pub use job::JobDescriptor;
pub use lifecycle::{AbandonReason, BuildOutcome, BuiltNode, LifecyclePolicy, NodeBuilder};
pub use plan::{plan_nodes, NodePlan, NodeTemplate, PlanError, CONTROLLER_COUNT, MIN_NODES};
