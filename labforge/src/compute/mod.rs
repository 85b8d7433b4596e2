//! Cloud compute API collaborator.
//!
//! The build engine consumes the cloud through the [`ComputeApi`] trait,
//! which exposes exactly the operations the engine needs (create, get,
//! delete, list, resolve flavors/images/networks, quota limits, keypairs).
//! [`OpenStackCompute`] is the concrete adapter speaking the OpenStack
//! compute JSON API. The adapter performs no retries of its own; every call
//! site wraps it in a retry policy.

pub mod api;
pub mod openstack;
pub mod types;

pub use api::ComputeApi;
pub use openstack::OpenStackCompute;
#[cfg(test)]
pub use api::tests;
pub use types::{
    as_attempt, ComputeError, Flavor, Image, KeyPair, Network, NewServer, NicSpec, QuotaLimits,
    ServerAddress, ServerRecord, ServerStatus, PUBLIC_ADDRESS_NET, PUBLIC_NET_ID, SERVICE_NET_ID,
};
