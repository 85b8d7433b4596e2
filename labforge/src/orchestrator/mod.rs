//! Build orchestration.
//!
//! Composes the whole provisioning flow: capacity checks against tenant
//! quota, flavor/image/network/keypair resolution, node planning, the
//! concurrent instance build (worker pool over the instance lifecycle), and
//! the remote-configuration phase that turns booted instances into a lab.

mod build;
mod capacity;
mod configure;
mod error;
mod resolve;
mod scuttle;

pub use build::{BuildReport, BuildRequest, Orchestrator, DEFAULT_CONCURRENCY};
pub use capacity::{available_ram_mb, check_limits, has_network_headroom};
pub use configure::{default_plan, ConfigStep, Configurator, ConfigurePlan, NodeTarget};
pub use error::OrchestratorError;
pub use resolve::{ensure_keypair, ensure_network, pick_flavor, pick_image};
pub use scuttle::{scuttle_lab, ScuttleReport};
