//! Data model for the compute API collaborator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Provider-assigned identifier of the shared public network.
///
/// Attached to every instance so operators can reach nodes directly.
pub const PUBLIC_NET_ID: &str = "00000000-0000-0000-0000-000000000000";

/// Provider-assigned identifier of the provider service network.
pub const SERVICE_NET_ID: &str = "11111111-1111-1111-1111-111111111111";

/// Name the public network carries in instance address maps.
pub const PUBLIC_ADDRESS_NET: &str = "public";

/// Failure reported by the compute API adapter.
///
/// [`is_retryable`](ComputeError::is_retryable) separates transient faults
/// (worth another attempt) from permanent ones (bad credentials, missing
/// resources) so call sites can map them onto the retry primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComputeError {
    /// The request never produced a usable response (connect failure,
    /// timeout, interrupted body).
    #[error("transport failure: {0}")]
    Transport(String),
    /// The API answered with a non-success status.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    /// The referenced resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The credentials were rejected.
    #[error("authentication rejected: {0}")]
    Auth(String),
    /// The response arrived but could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ComputeError {
    /// True for faults where a fresh attempt can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ComputeError::Transport(_) | ComputeError::Malformed(_) => true,
            ComputeError::Api { status, .. } => *status >= 500 || *status == 429,
            ComputeError::NotFound(_) | ComputeError::Auth(_) => false,
        }
    }
}

/// Maps a compute call result onto a retry-loop verdict: retryable faults
/// consume an attempt, permanent ones abort the loop.
pub fn as_attempt<T>(result: Result<T, ComputeError>) -> crate::retry::Attempt<T, ComputeError> {
    match result {
        Ok(value) => crate::retry::Attempt::Done(value),
        Err(error) if error.is_retryable() => crate::retry::Attempt::Retry,
        Err(error) => crate::retry::Attempt::Fail(error),
    }
}

/// Provisioning state reported by the provider for one instance.
///
/// The provider's status vocabulary is open-ended; anything outside the
/// states the build engine acts on is preserved verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ServerStatus {
    /// Still provisioning.
    Build,
    /// Ready for use.
    Active,
    /// The provider gave up on this instance.
    Error,
    /// Deleted (usually only seen in stale ledger entries).
    Deleted,
    /// Any other provider-reported state, kept as reported.
    Other(String),
}

impl From<String> for ServerStatus {
    fn from(raw: String) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "BUILD" => ServerStatus::Build,
            "ACTIVE" => ServerStatus::Active,
            "ERROR" => ServerStatus::Error,
            "DELETED" => ServerStatus::Deleted,
            _ => ServerStatus::Other(raw),
        }
    }
}

impl From<ServerStatus> for String {
    fn from(status: ServerStatus) -> Self {
        match status {
            ServerStatus::Build => "BUILD".to_string(),
            ServerStatus::Active => "ACTIVE".to_string(),
            ServerStatus::Error => "ERROR".to_string(),
            ServerStatus::Deleted => "DELETED".to_string(),
            ServerStatus::Other(raw) => raw,
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStatus::Build => write!(f, "BUILD"),
            ServerStatus::Active => write!(f, "ACTIVE"),
            ServerStatus::Error => write!(f, "ERROR"),
            ServerStatus::Deleted => write!(f, "DELETED"),
            ServerStatus::Other(raw) => write!(f, "{}", raw),
        }
    }
}

/// One address attached to an instance on some network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAddress {
    /// IP version, 4 or 6.
    pub version: u8,
    /// The address literal.
    pub addr: String,
}

/// Snapshot of one provisioned instance, as reported by the provider.
///
/// The provider is authoritative for `status` and `addresses`; the build
/// engine copies them in on every successful poll and persists the whole
/// snapshot in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    /// Provider-assigned instance id.
    pub id: String,
    /// Instance name (`{lab}_controller1`, `{lab}_compute3`, ...).
    pub name: String,
    /// Last observed provisioning state.
    pub status: ServerStatus,
    /// Addresses per network name.
    #[serde(default)]
    pub addresses: BTreeMap<String, Vec<ServerAddress>>,
    /// Root password, reported only by the create call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_pass: Option<String>,
}

impl ServerRecord {
    /// First IPv4 address on the named network, if any.
    pub fn ipv4_on(&self, network: &str) -> Option<&str> {
        self.addresses
            .get(network)?
            .iter()
            .find(|address| address.version == 4)
            .map(|address| address.addr.as_str())
    }
}

/// Instance size offered by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flavor {
    pub id: String,
    pub name: String,
    /// RAM in megabytes.
    pub ram_mb: u32,
    pub vcpus: u32,
    /// Relative network throughput factor; used to break ties between
    /// flavors with identical RAM.
    pub rxtx_factor: f64,
}

/// Bootable machine image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub name: String,
}

/// Isolated network the lab nodes share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    pub label: String,
}

/// Tenant quota as reported by the provider.
///
/// `max_networks` of `-1` means the provider did not report a usable
/// network quota; the capacity check treats that as "no networks available".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    pub max_total_ram_mb: i64,
    pub used_ram_mb: i64,
    pub max_networks: i64,
    pub used_networks: i64,
}

/// Registered SSH keypair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub name: String,
    pub public_key: String,
}

/// One network attachment in a create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NicSpec {
    /// Identifier of the network to attach.
    pub net_id: String,
}

/// Create-instance request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewServer {
    pub name: String,
    pub flavor_id: String,
    pub image_id: String,
    /// Keypair to inject, when configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    /// Networks to attach, in order.
    pub nics: Vec<NicSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing_is_case_insensitive() {
        assert_eq!(ServerStatus::from("active".to_string()), ServerStatus::Active);
        assert_eq!(ServerStatus::from("Build".to_string()), ServerStatus::Build);
        assert_eq!(ServerStatus::from("ERROR".to_string()), ServerStatus::Error);
    }

    #[test]
    fn test_unknown_status_is_preserved_verbatim() {
        let status = ServerStatus::from("VERIFY_RESIZE".to_string());
        assert_eq!(status, ServerStatus::Other("VERIFY_RESIZE".to_string()));
        assert_eq!(String::from(status), "VERIFY_RESIZE");
    }

    #[test]
    fn test_ipv4_lookup_skips_v6_addresses() {
        let mut addresses = BTreeMap::new();
        addresses.insert(
            "public".to_string(),
            vec![
                ServerAddress {
                    version: 6,
                    addr: "2001:db8::1".to_string(),
                },
                ServerAddress {
                    version: 4,
                    addr: "203.0.113.5".to_string(),
                },
            ],
        );
        let record = ServerRecord {
            id: "abc".to_string(),
            name: "alpha_controller1".to_string(),
            status: ServerStatus::Active,
            addresses,
            admin_pass: None,
        };

        assert_eq!(record.ipv4_on("public"), Some("203.0.113.5"));
        assert_eq!(record.ipv4_on("missing"), None);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ComputeError::Transport("reset".into()).is_retryable());
        assert!(ComputeError::Api {
            status: 503,
            message: "overloaded".into()
        }
        .is_retryable());
        assert!(ComputeError::Api {
            status: 429,
            message: "slow down".into()
        }
        .is_retryable());
        assert!(!ComputeError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_retryable());
        assert!(!ComputeError::Auth("expired token".into()).is_retryable());
        assert!(!ComputeError::NotFound("server xyz".into()).is_retryable());
    }

    #[test]
    fn test_server_record_round_trips_through_json() {
        let record = ServerRecord {
            id: "s-1".to_string(),
            name: "alpha_compute1".to_string(),
            status: ServerStatus::Other("REBUILD".to_string()),
            addresses: BTreeMap::new(),
            admin_pass: Some("secret".to_string()),
        };

        let json = serde_json::to_string(&record).unwrap();
        let back: ServerRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
