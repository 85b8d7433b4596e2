//! LabForge - Cloud lab provisioning engine
//!
//! This library provisions multi-node compute labs through a cloud-compute
//! API: it creates instances concurrently through a bounded worker pool,
//! retries transient provider failures with backoff, waits for each instance
//! to reach an active state (deleting and requeuing instances the provider
//! flags as errored), and records everything it builds in a durable on-disk
//! ledger so partial labs can be inspected and torn down.
//!
//! # High-Level API
//!
//! The [`orchestrator`] module provides the end-to-end entry point:
//!
//! ```ignore
//! use labforge::orchestrator::{BuildRequest, Orchestrator};
//!
//! let orchestrator = Orchestrator::new(compute, shell, ledger_path);
//! let lab = orchestrator.build(&BuildRequest::new("alpha", 5, "ubuntu")).await?;
//! ```

pub mod build;
pub mod compute;
pub mod config;
pub mod ledger;
pub mod logging;
pub mod orchestrator;
pub mod pool;
pub mod progress;
pub mod queue;
pub mod remote;
pub mod report;
pub mod retry;

/// Version of the LabForge library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
