//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! Produces the commented INI representation written to `config.ini`.

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let region = config.cloud.region.as_deref().unwrap_or("");
    let key_name = config.build.key_name.as_deref().unwrap_or("");
    let key_file = config
        .build
        .key_file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let key_path = config
        .remote
        .key_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    format!(
        r#"[cloud]
; Identity v2 endpoint labs authenticate against
auth_url = {}
; Account user name
username = {}
; Account API key
api_key = {}
; Preferred compute region; empty picks the first catalog entry
region = {}

[build]
; Instances built at once (default: 10)
concurrency = {}
; Flavor RAM per node role in MB; flavors are matched by exact RAM
controller_ram_mb = {}
compute_ram_mb = {}
; Image name fragment or image id (default: ubuntu)
image = {}
; CIDR for each lab's isolated network
net_cidr = {}
; Keypair injected into every instance; empty disables key injection
key_name = {}
; Public key file registered under key_name when the keypair is missing
key_file = {}
; Attach the provider's internal service network (default: true)
attach_service_net = {}
; Attempt budget for the create-instance call (default: 10)
create_attempts = {}
; Attempt budget for the status poll loop (default: 100)
poll_attempts = {}
; Delay between retry attempts in seconds (default: 5)
retry_delay_secs = {}
; Times one node may be rebuilt after ERROR states (default: 3)
requeue_ceiling = {}

[remote]
; Login user on freshly built nodes (default: root)
user = {}
; SSH port (default: 22)
port = {}
; Identity file; empty lets ssh pick one up itself
key_path = {}
; Connection attempts per remote command (default: 3)
connect_attempts = {}
; Keepalive interval in seconds (default: 15)
keepalive_secs = {}

[logging]
; Log file path
file = {}
"#,
        config.cloud.auth_url,
        config.cloud.username,
        config.cloud.api_key,
        region,
        config.build.concurrency,
        config.build.controller_ram_mb,
        config.build.compute_ram_mb,
        config.build.image,
        config.build.net_cidr,
        key_name,
        key_file,
        config.build.attach_service_net,
        config.build.create_attempts,
        config.build.poll_attempts,
        config.build.retry_delay_secs,
        config.build.requeue_ceiling,
        config.remote.user,
        config.remote.port,
        key_path,
        config.remote.connect_attempts,
        config.remote.keepalive_secs,
        config.logging.file.display(),
    )
}
