//! Job descriptors: one queued unit of work per node to build.

use crate::compute::NewServer;

/// Describes one node the worker pool should build.
///
/// Immutable once enqueued, except that the error-recovery path replaces a
/// descriptor with a [`requeued`](JobDescriptor::requeued) copy whose
/// counter has grown. The counter is what bounds recovery: a job that keeps
/// coming back eventually hits the configured ceiling and is abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    /// Target node name, unique within the build.
    pub node_name: String,
    /// The create request to submit for this node.
    pub request: NewServer,
    /// How many times this job has been requeued after an ERROR state.
    pub requeues: u32,
}

impl JobDescriptor {
    /// Creates a fresh descriptor for `request`.
    pub fn new(request: NewServer) -> Self {
        Self {
            node_name: request.name.clone(),
            request,
            requeues: 0,
        }
    }

    /// A copy of this descriptor with the requeue counter bumped. The build
    /// parameters are unchanged; the next worker starts from scratch.
    pub fn requeued(&self) -> Self {
        Self {
            node_name: self.node_name.clone(),
            request: self.request.clone(),
            requeues: self.requeues + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{NewServer, NicSpec};

    fn request(name: &str) -> NewServer {
        NewServer {
            name: name.to_string(),
            flavor_id: "f".to_string(),
            image_id: "i".to_string(),
            key_name: None,
            nics: vec![NicSpec {
                net_id: "n".to_string(),
            }],
        }
    }

    #[test]
    fn test_descriptor_takes_its_name_from_the_request() {
        let job = JobDescriptor::new(request("alpha_compute2"));
        assert_eq!(job.node_name, "alpha_compute2");
        assert_eq!(job.requeues, 0);
    }

    #[test]
    fn test_requeued_copy_keeps_parameters_and_bumps_counter() {
        let job = JobDescriptor::new(request("alpha_compute2"));
        let again = job.requeued().requeued();
        assert_eq!(again.request, job.request);
        assert_eq!(again.requeues, 2);
    }
}
