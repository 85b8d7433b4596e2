//! Orchestration error taxonomy.
//!
//! Capacity and configuration errors are fatal to the whole build and are
//! raised before any instance exists. Provider and retry failures surface
//! here only once their retry budgets are spent.

use crate::build::PlanError;
use crate::compute::{ComputeError, Flavor, Image};
use crate::ledger::LedgerError;
use crate::remote::RemoteError;
use crate::retry::RetryError;
use thiserror::Error;

/// Failure of a build, inspection, or teardown run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The build would exceed the tenant RAM quota.
    #[error(
        "not enough RAM quota: this build needs {purposed_mb} MB but only {available_mb} MB are free"
    )]
    NotEnoughRam { purposed_mb: i64, available_mb: i64 },

    /// The tenant cannot create another isolated network.
    #[error("no isolated networks available on this account")]
    NoNetworksAvailable,

    /// More than one existing network carries the lab's network label.
    #[error("more than one network is labelled \"{label}\"")]
    TooManyNetworks { label: String },

    /// The provider did not report usable quota limits.
    #[error("quota limits are unavailable: {0}")]
    LimitsUnavailable(String),

    /// No flavor offers exactly the requested RAM.
    #[error("no flavor with exactly {wanted_ram_mb} MB RAM")]
    FlavorNotFound {
        wanted_ram_mb: u32,
        candidates: Vec<Flavor>,
    },

    /// No image matches the requested name or identifier.
    #[error("no image matching \"{pattern}\"")]
    ImageNotFound {
        pattern: String,
        candidates: Vec<Image>,
    },

    /// The image pattern is ambiguous.
    #[error("image pattern \"{pattern}\" matches {count} images", count = .matches.len())]
    ImageAmbiguous { pattern: String, matches: Vec<Image> },

    /// The requested node count cannot form a lab.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// One or both controllers failed to build; the lab is unusable.
    #[error("only {built} of 2 controllers reached ACTIVE")]
    ControllersIncomplete { built: usize },

    /// Every compute node failed to build.
    #[error("no compute nodes survived the build")]
    NoComputeNodes,

    /// An ACTIVE node reported no usable IPv4 address.
    #[error("no IPv4 address found for node {node}")]
    NoAddress { node: String },

    /// A cloud API call failed permanently.
    #[error("cloud API failure: {0}")]
    Compute(#[from] ComputeError),

    /// A retry budget was spent without success.
    #[error("{context}: {detail}")]
    RetriesSpent { context: String, detail: String },

    /// The build ledger could not be read or written.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A remote-configuration step failed terminally.
    #[error("remote configuration failed on {node}: {error}")]
    Configure { node: String, error: RemoteError },
}

impl OrchestratorError {
    /// Folds a retry-loop failure around a compute call into the taxonomy:
    /// permanent provider errors keep their type, spent budgets become
    /// [`OrchestratorError::RetriesSpent`] tagged with `context`.
    pub fn from_retry(context: &str, error: RetryError<ComputeError>) -> Self {
        match error {
            RetryError::Aborted(compute_error) => OrchestratorError::Compute(compute_error),
            other => OrchestratorError::RetriesSpent {
                context: context.to_string(),
                detail: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_retry_abort_keeps_the_compute_error() {
        let error = OrchestratorError::from_retry(
            "listing flavors",
            RetryError::Aborted(ComputeError::Auth("expired".to_string())),
        );
        assert!(matches!(
            error,
            OrchestratorError::Compute(ComputeError::Auth(_))
        ));
    }

    #[test]
    fn test_spent_budget_is_tagged_with_context() {
        let error = OrchestratorError::from_retry(
            "listing flavors",
            RetryError::Exhausted {
                attempts: 5,
                elapsed: Duration::from_secs(10),
            },
        );
        let message = error.to_string();
        assert!(message.contains("listing flavors"), "got: {}", message);
        assert!(message.contains("5 attempts"), "got: {}", message);
    }
}
