//! Node planning: which instances one build creates.
//!
//! Every lab is exactly two controller nodes plus however many compute
//! nodes remain, so the minimum build is three nodes. Compute jobs are
//! enqueued ahead of controller jobs; with a staggered pool the fungible
//! nodes start building while the controllers queue up behind them.

use super::job::JobDescriptor;
use crate::compute::{NewServer, NicSpec};
use thiserror::Error;

/// Smallest lab that still has a usable topology.
pub const MIN_NODES: usize = 3;

/// Controller nodes per lab, fixed.
pub const CONTROLLER_COUNT: usize = 2;

/// Rejected build shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Fewer than [`MIN_NODES`] nodes requested.
    #[error("a lab needs at least {MIN_NODES} nodes, got {requested}")]
    NotEnoughNodes { requested: usize },
}

/// Boot parameters shared by all nodes of one build.
#[derive(Debug, Clone)]
pub struct NodeTemplate {
    /// Flavor for the two controller nodes.
    pub controller_flavor_id: String,
    /// Flavor for the compute nodes.
    pub compute_flavor_id: String,
    /// Image every node boots from.
    pub image_id: String,
    /// Keypair injected into every node, when configured.
    pub key_name: Option<String>,
    /// Networks attached to every node, in order.
    pub nics: Vec<NicSpec>,
}

/// The planned node set for one build.
#[derive(Debug, Clone)]
pub struct NodePlan {
    /// Job descriptors in enqueue order: computes first, then controllers.
    pub jobs: Vec<JobDescriptor>,
    /// The two controller node names.
    pub controller_names: [String; 2],
    /// The compute node names, in index order.
    pub compute_names: Vec<String>,
}

/// Plans the node set for `lab` with `node_count` total nodes.
///
/// Node names follow the `{lab}_compute{i}` / `{lab}_controller{i}` scheme
/// the teardown path later matches on.
pub fn plan_nodes(
    lab: &str,
    node_count: usize,
    template: &NodeTemplate,
) -> Result<NodePlan, PlanError> {
    if node_count < MIN_NODES {
        return Err(PlanError::NotEnoughNodes {
            requested: node_count,
        });
    }

    let compute_count = node_count - CONTROLLER_COUNT;
    let mut jobs = Vec::with_capacity(node_count);

    let compute_names: Vec<String> = (1..=compute_count)
        .map(|index| format!("{}_compute{}", lab, index))
        .collect();
    for name in &compute_names {
        jobs.push(JobDescriptor::new(NewServer {
            name: name.clone(),
            flavor_id: template.compute_flavor_id.clone(),
            image_id: template.image_id.clone(),
            key_name: template.key_name.clone(),
            nics: template.nics.clone(),
        }));
    }

    let controller_names = [
        format!("{}_controller1", lab),
        format!("{}_controller2", lab),
    ];
    for name in &controller_names {
        jobs.push(JobDescriptor::new(NewServer {
            name: name.clone(),
            flavor_id: template.controller_flavor_id.clone(),
            image_id: template.image_id.clone(),
            key_name: template.key_name.clone(),
            nics: template.nics.clone(),
        }));
    }

    Ok(NodePlan {
        jobs,
        controller_names,
        compute_names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> NodeTemplate {
        NodeTemplate {
            controller_flavor_id: "flavor-big".to_string(),
            compute_flavor_id: "flavor-small".to_string(),
            image_id: "image-1".to_string(),
            key_name: Some("lab-key".to_string()),
            nics: vec![NicSpec {
                net_id: "net-1".to_string(),
            }],
        }
    }

    #[test]
    fn test_fewer_than_three_nodes_is_rejected_before_planning() {
        let result = plan_nodes("alpha", 2, &template());
        assert_eq!(result.unwrap_err(), PlanError::NotEnoughNodes { requested: 2 });
    }

    #[test]
    fn test_minimum_lab_is_one_compute_and_two_controllers() {
        let plan = plan_nodes("alpha", 3, &template()).unwrap();
        assert_eq!(plan.jobs.len(), 3);
        assert_eq!(plan.compute_names, vec!["alpha_compute1"]);
        assert_eq!(
            plan.controller_names,
            ["alpha_controller1", "alpha_controller2"]
        );
    }

    #[test]
    fn test_compute_jobs_are_enqueued_before_controllers() {
        let plan = plan_nodes("alpha", 5, &template()).unwrap();
        let names: Vec<_> = plan.jobs.iter().map(|job| job.node_name.as_str()).collect();
        assert_eq!(
            names,
            [
                "alpha_compute1",
                "alpha_compute2",
                "alpha_compute3",
                "alpha_controller1",
                "alpha_controller2"
            ]
        );
    }

    #[test]
    fn test_roles_get_their_own_flavor() {
        let plan = plan_nodes("alpha", 4, &template()).unwrap();
        let compute = plan.jobs.iter().find(|j| j.node_name == "alpha_compute1");
        let controller = plan.jobs.iter().find(|j| j.node_name == "alpha_controller1");
        assert_eq!(compute.unwrap().request.flavor_id, "flavor-small");
        assert_eq!(controller.unwrap().request.flavor_id, "flavor-big");
    }

    #[test]
    fn test_fresh_jobs_start_with_zero_requeues() {
        let plan = plan_nodes("alpha", 3, &template()).unwrap();
        assert!(plan.jobs.iter().all(|job| job.requeues == 0));
    }
}
