//! Inventory resolution.
//!
//! Turns the operator's sizing and naming choices into concrete cloud
//! resources: a flavor with the exact RAM asked for, an image matched by
//! name fragment or id, the lab's isolated network, and the SSH keypair
//! registered with the provider.

use tracing::{debug, info};

use super::capacity;
use super::error::OrchestratorError;
use crate::compute::{as_attempt, ComputeApi, Flavor, Image, KeyPair, Network, QuotaLimits};
use crate::retry::RetryPolicy;

/// Picks the flavor with exactly `wanted_ram_mb` of RAM.
///
/// Ties are broken by the highest network throughput factor; the first
/// listed flavor wins an exact tie.
///
/// # Arguments
///
/// * `flavors` - Full flavor catalog, as listed from the provider
/// * `wanted_ram_mb` - Exact RAM size to match
///
/// # Returns
///
/// The chosen flavor, or [`FlavorNotFound`](OrchestratorError::FlavorNotFound)
/// carrying the full catalog for the operator to inspect.
pub fn pick_flavor(flavors: &[Flavor], wanted_ram_mb: u32) -> Result<&Flavor, OrchestratorError> {
    let mut best: Option<&Flavor> = None;
    for flavor in flavors.iter().filter(|f| f.ram_mb == wanted_ram_mb) {
        best = match best {
            Some(current) if current.rxtx_factor >= flavor.rxtx_factor => Some(current),
            _ => Some(flavor),
        };
    }

    match best {
        Some(flavor) => {
            debug!(
                flavor_id = %flavor.id,
                name = %flavor.name,
                rxtx = flavor.rxtx_factor,
                "Flavor selected"
            );
            Ok(flavor)
        }
        None => Err(OrchestratorError::FlavorNotFound {
            wanted_ram_mb,
            candidates: flavors.to_vec(),
        }),
    }
}

/// Picks the image whose name contains `pattern` (case-insensitive) or
/// whose id matches it exactly.
///
/// Exactly one image must match. Zero matches and multiple matches are
/// both errors that carry the relevant catalog slice, so the operator can
/// correct the pattern without a second listing call.
pub fn pick_image<'a>(images: &'a [Image], pattern: &str) -> Result<&'a Image, OrchestratorError> {
    let needle = pattern.to_lowercase();
    let matches: Vec<&Image> = images
        .iter()
        .filter(|image| image.id == pattern || image.name.to_lowercase().contains(&needle))
        .collect();

    match matches.as_slice() {
        [image] => {
            debug!(image_id = %image.id, name = %image.name, "Image selected");
            Ok(image)
        }
        [] => Err(OrchestratorError::ImageNotFound {
            pattern: pattern.to_string(),
            candidates: images.to_vec(),
        }),
        _ => Err(OrchestratorError::ImageAmbiguous {
            pattern: pattern.to_string(),
            matches: matches.into_iter().cloned().collect(),
        }),
    }
}

/// Finds the lab's isolated network by label, creating it if absent.
///
/// A label carried by more than one network means an earlier build left
/// debris behind; that is reported rather than guessed around. Creation
/// is attempted only when the quota still has network headroom.
pub async fn ensure_network<C: ComputeApi>(
    compute: &C,
    limits: &QuotaLimits,
    label: &str,
    cidr: &str,
    policy: &RetryPolicy,
) -> Result<Network, OrchestratorError> {
    let networks = policy
        .run(|_| async { as_attempt(compute.list_networks().await) })
        .await
        .map_err(|error| OrchestratorError::from_retry("listing networks", error))?;

    let mut found: Vec<Network> = networks
        .into_iter()
        .filter(|network| network.label == label)
        .collect();
    if found.len() > 1 {
        return Err(OrchestratorError::TooManyNetworks {
            label: label.to_string(),
        });
    }
    if let Some(network) = found.pop() {
        info!(network_id = %network.id, label, "Using existing network");
        return Ok(network);
    }

    if !capacity::has_network_headroom(limits) {
        return Err(OrchestratorError::NoNetworksAvailable);
    }

    let network = policy
        .run(|_| async { as_attempt(compute.create_network(label, cidr).await) })
        .await
        .map_err(|error| OrchestratorError::from_retry("creating network", error))?;
    info!(network_id = %network.id, label, cidr, "Network created");
    Ok(network)
}

/// Finds the named keypair in the provider registry, registering
/// `public_key` under that name if absent.
pub async fn ensure_keypair<C: ComputeApi>(
    compute: &C,
    name: &str,
    public_key: &str,
    policy: &RetryPolicy,
) -> Result<KeyPair, OrchestratorError> {
    let existing = policy
        .run(|_| async { as_attempt(compute.find_keypairs(name).await) })
        .await
        .map_err(|error| OrchestratorError::from_retry("listing keypairs", error))?;
    if let Some(keypair) = existing.into_iter().next() {
        debug!(name, "Keypair already registered");
        return Ok(keypair);
    }

    let keypair = policy
        .run(|_| async { as_attempt(compute.create_keypair(name, public_key).await) })
        .await
        .map_err(|error| OrchestratorError::from_retry("registering keypair", error))?;
    info!(name, "Keypair registered");
    Ok(keypair)
}
