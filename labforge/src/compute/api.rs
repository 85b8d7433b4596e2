//! Compute API capability trait.
//!
//! This abstraction allows for dependency injection and easier testing:
//! the build engine is generic over [`ComputeApi`], so unit and integration
//! tests drive it with scripted mock providers instead of a live cloud.

use super::types::{
    ComputeError, Flavor, Image, KeyPair, Network, NewServer, QuotaLimits, ServerRecord,
};
use std::future::Future;

/// The cloud operations the build engine consumes.
///
/// Implementations perform one API call per method and report failures as
/// [`ComputeError`]; they do not retry. Retry policy belongs to the call
/// sites, which differ in how many attempts each operation deserves.
pub trait ComputeApi: Send + Sync {
    /// Requests a new instance.
    ///
    /// # Arguments
    ///
    /// * `request` - Name, flavor, image, keypair, and networks to attach
    ///
    /// # Returns
    ///
    /// The created instance snapshot. Only this call reports the
    /// provider-generated root password.
    fn create_server(
        &self,
        request: &NewServer,
    ) -> impl Future<Output = Result<ServerRecord, ComputeError>> + Send;

    /// Fetches the current snapshot of one instance.
    fn get_server(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<ServerRecord, ComputeError>> + Send;

    /// Deletes one instance.
    fn delete_server(&self, id: &str) -> impl Future<Output = Result<(), ComputeError>> + Send;

    /// Lists all instances visible to the tenant.
    fn list_servers(&self)
        -> impl Future<Output = Result<Vec<ServerRecord>, ComputeError>> + Send;

    /// Lists the flavors the tenant may boot.
    fn list_flavors(&self) -> impl Future<Output = Result<Vec<Flavor>, ComputeError>> + Send;

    /// Lists the images the tenant may boot.
    fn list_images(&self) -> impl Future<Output = Result<Vec<Image>, ComputeError>> + Send;

    /// Lists the tenant's isolated networks.
    fn list_networks(&self) -> impl Future<Output = Result<Vec<Network>, ComputeError>> + Send;

    /// Creates an isolated network.
    ///
    /// # Arguments
    ///
    /// * `label` - Human-readable network name
    /// * `cidr` - Address block, e.g. `192.168.3.0/24`
    fn create_network(
        &self,
        label: &str,
        cidr: &str,
    ) -> impl Future<Output = Result<Network, ComputeError>> + Send;

    /// Fetches tenant quota limits.
    fn get_limits(&self) -> impl Future<Output = Result<QuotaLimits, ComputeError>> + Send;

    /// Returns every registered keypair whose name matches exactly.
    fn find_keypairs(
        &self,
        name: &str,
    ) -> impl Future<Output = Result<Vec<KeyPair>, ComputeError>> + Send;

    /// Registers a public key under the given name.
    fn create_keypair(
        &self,
        name: &str,
        public_key: &str,
    ) -> impl Future<Output = Result<KeyPair, ComputeError>> + Send;
}
