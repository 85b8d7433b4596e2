//! Capacity checks against tenant quota.
//!
//! Run before anything is created: a build that cannot fit should fail
//! with the computed numbers, not half-provision.

use super::error::OrchestratorError;
use crate::compute::QuotaLimits;

/// Checks whether a build fits the tenant quota.
///
/// Network capacity is a hard precondition when the build wants to create
/// a new isolated network: a missing network quota (`max_networks == -1`)
/// or an exhausted one raises
/// [`NoNetworksAvailable`](OrchestratorError::NoNetworksAvailable).
///
/// RAM is a soft answer: `Ok(true)` when `purposed_ram_mb` fits into the
/// free quota, `Ok(false)` when it does not. The caller decides how to
/// surface that, with the numbers in hand.
pub fn check_limits(
    limits: &QuotaLimits,
    purposed_ram_mb: i64,
    wants_new_network: bool,
) -> Result<bool, OrchestratorError> {
    if wants_new_network && !has_network_headroom(limits) {
        return Err(OrchestratorError::NoNetworksAvailable);
    }

    let available_mb = limits.max_total_ram_mb - limits.used_ram_mb;
    Ok(purposed_ram_mb <= available_mb)
}

/// Free RAM under the quota, for error messages.
pub fn available_ram_mb(limits: &QuotaLimits) -> i64 {
    limits.max_total_ram_mb - limits.used_ram_mb
}

/// True when the tenant can still create at least one more network.
///
/// Providers that do not expose a network quota report `-1`, which is
/// treated as no capacity rather than unlimited.
pub fn has_network_headroom(limits: &QuotaLimits) -> bool {
    limits.max_networks != -1 && limits.max_networks - limits.used_networks > 0
}
