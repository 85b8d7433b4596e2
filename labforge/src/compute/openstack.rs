//! OpenStack compute API adapter.
//!
//! Speaks the OpenStack compute JSON API over HTTP: token authentication,
//! `/servers`, `/flavors`, `/images`, `/os-networksv2`, `/os-keypairs`, and
//! `/limits`. One method, one API call; no retries here. The adapter holds a
//! pooled async HTTP client tuned for a small number of concurrent callers
//! (the worker pool).

use super::api::ComputeApi;
use super::types::{
    ComputeError, Flavor, Image, KeyPair, Network, NewServer, QuotaLimits, ServerAddress,
    ServerRecord, ServerStatus,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Per-request timeout for compute API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Idle connections kept per host; sized for one worker pool, not a fleet.
const POOL_MAX_IDLE_PER_HOST: usize = 16;

/// Compute API client bound to one tenant endpoint and auth token.
///
/// # Example
///
/// ```ignore
/// use labforge::compute::OpenStackCompute;
///
/// let compute = OpenStackCompute::authenticate(
///     "https://identity.example.com/v2.0",
///     "builder",
///     "0123456789abcdef",
///     Some("DFW"),
/// )
/// .await?;
/// let flavors = compute.list_flavors().await?;
/// ```
#[derive(Clone)]
pub struct OpenStackCompute {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl OpenStackCompute {
    /// Creates a client against an already-known compute endpoint and token.
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Result<Self, ComputeError> {
        Ok(Self {
            client: build_http_client()?,
            endpoint: trim_trailing_slash(endpoint.into()),
            token: token.into(),
        })
    }

    /// Authenticates against the identity service and selects the compute
    /// endpoint from the returned service catalog.
    ///
    /// # Arguments
    ///
    /// * `auth_url` - Identity v2 endpoint, e.g. `https://identity.../v2.0`
    /// * `username` - Account user name
    /// * `api_key` - Account API key
    /// * `region` - Preferred endpoint region; first catalog entry when `None`
    pub async fn authenticate(
        auth_url: &str,
        username: &str,
        api_key: &str,
        region: Option<&str>,
    ) -> Result<Self, ComputeError> {
        let client = build_http_client()?;
        let url = format!("{}/tokens", trim_trailing_slash(auth_url.to_string()));
        let body = json!({
            "auth": {
                "RAX-KSKEY:apiKeyCredentials": {
                    "username": username,
                    "apiKey": api_key,
                }
            }
        });

        debug!(url = %url, username, "authenticating with identity service");
        let response = client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            // Identity rejections are permanent; report them as auth failures.
            return Err(if status.as_u16() == 401 || status.as_u16() == 403 {
                ComputeError::Auth(format!("HTTP {}: {}", status.as_u16(), summarize(&text)))
            } else {
                classify(status.as_u16(), &text)
            });
        }

        let auth: AuthEnvelope = serde_json::from_str(&text).map_err(malformed_error)?;
        let endpoint = select_compute_endpoint(&auth.access.service_catalog, region)?;
        debug!(endpoint = %endpoint, "selected compute endpoint");

        Ok(Self {
            client,
            endpoint: trim_trailing_slash(endpoint),
            token: auth.access.token.id,
        })
    }

    /// The compute endpoint this client talks to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ComputeError> {
        let url = format!("{}{}", self.endpoint, path);
        trace!(url = %url, "compute GET");
        let response = self
            .client
            .get(&url)
            .header("X-Auth-Token", &self.token)
            .send()
            .await
            .map_err(transport_error)?;
        decode_response(response).await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ComputeError> {
        let url = format!("{}{}", self.endpoint, path);
        trace!(url = %url, "compute POST");
        let response = self
            .client
            .post(&url)
            .header("X-Auth-Token", &self.token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        decode_response(response).await
    }

    async fn delete(&self, path: &str) -> Result<(), ComputeError> {
        let url = format!("{}{}", self.endpoint, path);
        trace!(url = %url, "compute DELETE");
        let response = self
            .client
            .delete(&url)
            .header("X-Auth-Token", &self.token)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "compute DELETE failed");
        Err(classify(status.as_u16(), &text))
    }
}

impl ComputeApi for OpenStackCompute {
    async fn create_server(&self, request: &NewServer) -> Result<ServerRecord, ComputeError> {
        let mut server = json!({
            "name": request.name,
            "flavorRef": request.flavor_id,
            "imageRef": request.image_id,
            "networks": request
                .nics
                .iter()
                .map(|nic| json!({ "uuid": nic.net_id }))
                .collect::<Vec<_>>(),
        });
        if let Some(key_name) = &request.key_name {
            server["key_name"] = json!(key_name);
        }

        let envelope: ServerEnvelope = self
            .post_json("/servers", json!({ "server": server }))
            .await?;
        Ok(envelope.server.into())
    }

    async fn get_server(&self, id: &str) -> Result<ServerRecord, ComputeError> {
        let envelope: ServerEnvelope = self.get_json(&format!("/servers/{}", id)).await?;
        Ok(envelope.server.into())
    }

    async fn delete_server(&self, id: &str) -> Result<(), ComputeError> {
        self.delete(&format!("/servers/{}", id)).await
    }

    async fn list_servers(&self) -> Result<Vec<ServerRecord>, ComputeError> {
        let envelope: ServersEnvelope = self.get_json("/servers/detail").await?;
        Ok(envelope.servers.into_iter().map(Into::into).collect())
    }

    async fn list_flavors(&self) -> Result<Vec<Flavor>, ComputeError> {
        let envelope: FlavorsEnvelope = self.get_json("/flavors/detail").await?;
        Ok(envelope.flavors.into_iter().map(Into::into).collect())
    }

    async fn list_images(&self) -> Result<Vec<Image>, ComputeError> {
        let envelope: ImagesEnvelope = self.get_json("/images/detail").await?;
        Ok(envelope
            .images
            .into_iter()
            .map(|image| Image {
                id: image.id,
                name: image.name,
            })
            .collect())
    }

    async fn list_networks(&self) -> Result<Vec<Network>, ComputeError> {
        let envelope: NetworksEnvelope = self.get_json("/os-networksv2").await?;
        Ok(envelope
            .networks
            .into_iter()
            .map(|network| Network {
                id: network.id,
                label: network.label,
            })
            .collect())
    }

    async fn create_network(&self, label: &str, cidr: &str) -> Result<Network, ComputeError> {
        let envelope: NetworkEnvelope = self
            .post_json(
                "/os-networksv2",
                json!({ "network": { "label": label, "cidr": cidr } }),
            )
            .await?;
        Ok(Network {
            id: envelope.network.id,
            label: envelope.network.label,
        })
    }

    async fn get_limits(&self) -> Result<QuotaLimits, ComputeError> {
        let envelope: LimitsEnvelope = self.get_json("/limits").await?;
        envelope.limits.absolute.try_into()
    }

    async fn find_keypairs(&self, name: &str) -> Result<Vec<KeyPair>, ComputeError> {
        let envelope: KeypairsEnvelope = self.get_json("/os-keypairs").await?;
        Ok(envelope
            .keypairs
            .into_iter()
            .map(|wrapper| wrapper.keypair)
            .filter(|keypair| keypair.name == name)
            .map(|keypair| KeyPair {
                name: keypair.name,
                public_key: keypair.public_key,
            })
            .collect())
    }

    async fn create_keypair(&self, name: &str, public_key: &str) -> Result<KeyPair, ComputeError> {
        let envelope: KeypairEnvelope = self
            .post_json(
                "/os-keypairs",
                json!({ "keypair": { "name": name, "public_key": public_key } }),
            )
            .await?;
        Ok(KeyPair {
            name: envelope.keypair.name,
            public_key: envelope.keypair.public_key,
        })
    }
}

// =============================================================================
// HTTP plumbing
// =============================================================================

fn build_http_client() -> Result<reqwest::Client, ComputeError> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(30))
        .tcp_nodelay(true)
        .build()
        .map_err(|e| ComputeError::Transport(format!("failed to create HTTP client: {}", e)))
}

fn transport_error(error: reqwest::Error) -> ComputeError {
    ComputeError::Transport(error.to_string())
}

fn malformed_error(error: serde_json::Error) -> ComputeError {
    ComputeError::Malformed(error.to_string())
}

async fn decode_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ComputeError> {
    let status = response.status();
    let text = response.text().await.map_err(transport_error)?;
    if !status.is_success() {
        warn!(status = status.as_u16(), "compute API error response");
        return Err(classify(status.as_u16(), &text));
    }
    serde_json::from_str(&text).map_err(malformed_error)
}

/// Maps a non-success HTTP status onto the error taxonomy.
fn classify(status: u16, body: &str) -> ComputeError {
    let message = summarize(body);
    match status {
        401 | 403 => ComputeError::Auth(message),
        404 => ComputeError::NotFound(message),
        _ => ComputeError::Api { status, message },
    }
}

/// First line of the body, bounded, for error messages.
fn summarize(body: &str) -> String {
    let line = body.lines().next().unwrap_or("").trim();
    match line.char_indices().nth(200) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

fn select_compute_endpoint(
    catalog: &[CatalogEntryDto],
    region: Option<&str>,
) -> Result<String, ComputeError> {
    let entry = catalog
        .iter()
        .find(|entry| entry.service_type == "compute")
        .ok_or_else(|| {
            ComputeError::Malformed("no compute service in the service catalog".to_string())
        })?;

    let endpoint = match region {
        Some(wanted) => entry
            .endpoints
            .iter()
            .find(|endpoint| endpoint.region.as_deref() == Some(wanted)),
        None => entry.endpoints.first(),
    };

    endpoint
        .map(|endpoint| endpoint.public_url.clone())
        .ok_or_else(|| {
            ComputeError::Malformed(format!(
                "no compute endpoint for region {}",
                region.unwrap_or("<any>")
            ))
        })
}

// =============================================================================
// Wire format
// =============================================================================

#[derive(Debug, Deserialize)]
struct AuthEnvelope {
    access: AccessDto,
}

#[derive(Debug, Deserialize)]
struct AccessDto {
    token: TokenDto,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<CatalogEntryDto>,
}

#[derive(Debug, Deserialize)]
struct TokenDto {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CatalogEntryDto {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<EndpointDto>,
}

#[derive(Debug, Deserialize)]
struct EndpointDto {
    #[serde(rename = "publicURL")]
    public_url: String,
    #[serde(default)]
    region: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServersEnvelope {
    servers: Vec<ServerDto>,
}

#[derive(Debug, Deserialize)]
struct ServerEnvelope {
    server: ServerDto,
}

#[derive(Debug, Deserialize)]
struct ServerDto {
    id: String,
    name: String,
    status: String,
    #[serde(default)]
    addresses: BTreeMap<String, Vec<AddressDto>>,
    #[serde(rename = "adminPass", default)]
    admin_pass: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddressDto {
    version: u8,
    addr: String,
}

impl From<ServerDto> for ServerRecord {
    fn from(dto: ServerDto) -> Self {
        ServerRecord {
            id: dto.id,
            name: dto.name,
            status: ServerStatus::from(dto.status),
            addresses: dto
                .addresses
                .into_iter()
                .map(|(network, addresses)| {
                    (
                        network,
                        addresses
                            .into_iter()
                            .map(|address| ServerAddress {
                                version: address.version,
                                addr: address.addr,
                            })
                            .collect(),
                    )
                })
                .collect(),
            admin_pass: dto.admin_pass,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FlavorsEnvelope {
    flavors: Vec<FlavorDto>,
}

#[derive(Debug, Deserialize)]
struct FlavorDto {
    id: String,
    name: String,
    ram: u32,
    #[serde(default)]
    vcpus: u32,
    #[serde(default = "default_rxtx_factor")]
    rxtx_factor: f64,
}

fn default_rxtx_factor() -> f64 {
    1.0
}

impl From<FlavorDto> for Flavor {
    fn from(dto: FlavorDto) -> Self {
        Flavor {
            id: dto.id,
            name: dto.name,
            ram_mb: dto.ram,
            vcpus: dto.vcpus,
            rxtx_factor: dto.rxtx_factor,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImagesEnvelope {
    images: Vec<ImageDto>,
}

#[derive(Debug, Deserialize)]
struct ImageDto {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct NetworksEnvelope {
    networks: Vec<NetworkDto>,
}

#[derive(Debug, Deserialize)]
struct NetworkEnvelope {
    network: NetworkDto,
}

#[derive(Debug, Deserialize)]
struct NetworkDto {
    id: String,
    label: String,
}

#[derive(Debug, Deserialize)]
struct LimitsEnvelope {
    limits: LimitsDto,
}

#[derive(Debug, Deserialize)]
struct LimitsDto {
    absolute: AbsoluteLimitsDto,
}

#[derive(Debug, Deserialize)]
struct AbsoluteLimitsDto {
    #[serde(rename = "maxTotalRAMSize")]
    max_total_ram_mb: Option<i64>,
    #[serde(rename = "totalRAMUsed")]
    used_ram_mb: Option<i64>,
    #[serde(rename = "maxTotalPrivateNetworks")]
    max_networks: Option<i64>,
    #[serde(rename = "totalPrivateNetworksUsed")]
    used_networks: Option<i64>,
}

impl TryFrom<AbsoluteLimitsDto> for QuotaLimits {
    type Error = ComputeError;

    fn try_from(dto: AbsoluteLimitsDto) -> Result<Self, Self::Error> {
        // RAM quota must be present for the capacity check to mean anything;
        // the network quota is simply unreported on some clouds.
        let max_total_ram_mb = dto
            .max_total_ram_mb
            .ok_or_else(|| ComputeError::Malformed("limits missing maxTotalRAMSize".to_string()))?;
        Ok(QuotaLimits {
            max_total_ram_mb,
            used_ram_mb: dto.used_ram_mb.unwrap_or(0),
            max_networks: dto.max_networks.unwrap_or(-1),
            used_networks: dto.used_networks.unwrap_or(0),
        })
    }
}

#[derive(Debug, Deserialize)]
struct KeypairsEnvelope {
    keypairs: Vec<KeypairWrapperDto>,
}

#[derive(Debug, Deserialize)]
struct KeypairWrapperDto {
    keypair: KeypairDto,
}

#[derive(Debug, Deserialize)]
struct KeypairEnvelope {
    keypair: KeypairDto,
}

#[derive(Debug, Deserialize)]
struct KeypairDto {
    name: String,
    #[serde(default)]
    public_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_detail_payload_decodes() {
        let payload = r#"{
            "server": {
                "id": "abc-123",
                "name": "alpha_controller1",
                "status": "ACTIVE",
                "addresses": {
                    "public": [
                        {"version": 4, "addr": "203.0.113.5"},
                        {"version": 6, "addr": "2001:db8::5"}
                    ],
                    "alpha_net": [{"version": 4, "addr": "192.168.3.10"}]
                }
            }
        }"#;

        let envelope: ServerEnvelope = serde_json::from_str(payload).unwrap();
        let record: ServerRecord = envelope.server.into();
        assert_eq!(record.status, ServerStatus::Active);
        assert_eq!(record.ipv4_on("public"), Some("203.0.113.5"));
        assert_eq!(record.ipv4_on("alpha_net"), Some("192.168.3.10"));
        assert_eq!(record.admin_pass, None);
    }

    #[test]
    fn test_create_response_carries_admin_pass() {
        let payload = r#"{"server": {"id": "abc", "name": "n", "status": "BUILD", "adminPass": "s3cret"}}"#;
        let envelope: ServerEnvelope = serde_json::from_str(payload).unwrap();
        let record: ServerRecord = envelope.server.into();
        assert_eq!(record.admin_pass.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_limits_payload_maps_quota_fields() {
        let payload = r#"{
            "limits": {
                "absolute": {
                    "maxTotalRAMSize": 131072,
                    "totalRAMUsed": 4096,
                    "maxTotalPrivateNetworks": 10,
                    "totalPrivateNetworksUsed": 3
                }
            }
        }"#;

        let envelope: LimitsEnvelope = serde_json::from_str(payload).unwrap();
        let limits = QuotaLimits::try_from(envelope.limits.absolute).unwrap();
        assert_eq!(limits.max_total_ram_mb, 131072);
        assert_eq!(limits.used_ram_mb, 4096);
        assert_eq!(limits.max_networks, 10);
        assert_eq!(limits.used_networks, 3);
    }

    #[test]
    fn test_limits_without_network_quota_defaults_to_unreported() {
        let payload = r#"{"limits": {"absolute": {"maxTotalRAMSize": 65536, "totalRAMUsed": 0}}}"#;
        let envelope: LimitsEnvelope = serde_json::from_str(payload).unwrap();
        let limits = QuotaLimits::try_from(envelope.limits.absolute).unwrap();
        assert_eq!(limits.max_networks, -1);
    }

    #[test]
    fn test_limits_without_ram_quota_is_malformed() {
        let payload = r#"{"limits": {"absolute": {"totalRAMUsed": 0}}}"#;
        let envelope: LimitsEnvelope = serde_json::from_str(payload).unwrap();
        assert!(matches!(
            QuotaLimits::try_from(envelope.limits.absolute),
            Err(ComputeError::Malformed(_))
        ));
    }

    #[test]
    fn test_flavor_rxtx_defaults_to_one() {
        let payload = r#"{"flavors": [{"id": "2", "name": "512MB", "ram": 512, "vcpus": 1}]}"#;
        let envelope: FlavorsEnvelope = serde_json::from_str(payload).unwrap();
        let flavor: Flavor = envelope.flavors.into_iter().next().unwrap().into();
        assert_eq!(flavor.rxtx_factor, 1.0);
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(classify(401, "denied"), ComputeError::Auth(_)));
        assert!(matches!(classify(404, "gone"), ComputeError::NotFound(_)));
        assert!(matches!(
            classify(500, "boom"),
            ComputeError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn test_keypair_list_payload_decodes() {
        let payload = r#"{
            "keypairs": [
                {"keypair": {"name": "lab-key", "public_key": "ssh-rsa AAAA..."}},
                {"keypair": {"name": "other", "public_key": "ssh-rsa BBBB..."}}
            ]
        }"#;

        let envelope: KeypairsEnvelope = serde_json::from_str(payload).unwrap();
        assert_eq!(envelope.keypairs.len(), 2);
        assert_eq!(envelope.keypairs[0].keypair.name, "lab-key");
    }

    #[test]
    fn test_compute_endpoint_selection_honors_region() {
        let catalog = vec![CatalogEntryDto {
            service_type: "compute".to_string(),
            endpoints: vec![
                EndpointDto {
                    public_url: "https://dfw.compute.example/v2/1".to_string(),
                    region: Some("DFW".to_string()),
                },
                EndpointDto {
                    public_url: "https://ord.compute.example/v2/1".to_string(),
                    region: Some("ORD".to_string()),
                },
            ],
        }];

        let picked = select_compute_endpoint(&catalog, Some("ORD")).unwrap();
        assert_eq!(picked, "https://ord.compute.example/v2/1");

        let first = select_compute_endpoint(&catalog, None).unwrap();
        assert_eq!(first, "https://dfw.compute.example/v2/1");

        assert!(select_compute_endpoint(&catalog, Some("SYD")).is_err());
    }
}
