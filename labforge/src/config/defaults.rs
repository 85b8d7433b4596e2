//! Default values and the `ConfigFile::default()` implementation.

use super::settings::*;
use crate::orchestrator::DEFAULT_CONCURRENCY;

/// Default image name fragment.
pub const DEFAULT_IMAGE: &str = "ubuntu";

/// Default flavor RAM for both node roles, in MB.
pub const DEFAULT_RAM_MB: u32 = 2048;

/// Default lab network CIDR.
pub const DEFAULT_NET_CIDR: &str = "192.168.3.0/24";

/// Default attempt budget for the create-instance call.
pub const DEFAULT_CREATE_ATTEMPTS: u32 = 10;

/// Default attempt budget for the status poll loop. Polls run every
/// `retry_delay_secs`, so 100 attempts at 5s waits out an 8-minute build.
pub const DEFAULT_POLL_ATTEMPTS: u32 = 100;

/// Default delay between retry attempts, in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Default rebuild ceiling per node.
pub const DEFAULT_REQUEUE_CEILING: u32 = 3;

impl Default for ConfigFile {
    fn default() -> Self {
        let config_dir = super::file::config_directory();

        Self {
            cloud: CloudSettings {
                auth_url: "https://identity.api.rackspacecloud.com/v2.0".to_string(),
                username: String::new(),
                api_key: String::new(),
                region: None,
            },
            build: BuildSettings {
                concurrency: DEFAULT_CONCURRENCY,
                controller_ram_mb: DEFAULT_RAM_MB,
                compute_ram_mb: DEFAULT_RAM_MB,
                image: DEFAULT_IMAGE.to_string(),
                net_cidr: DEFAULT_NET_CIDR.to_string(),
                key_name: None,
                key_file: None,
                attach_service_net: true,
                create_attempts: DEFAULT_CREATE_ATTEMPTS,
                poll_attempts: DEFAULT_POLL_ATTEMPTS,
                retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
                requeue_ceiling: DEFAULT_REQUEUE_CEILING,
            },
            remote: RemoteSettings {
                user: "root".to_string(),
                port: 22,
                key_path: None,
                connect_attempts: 3,
                keepalive_secs: 15,
            },
            logging: LoggingSettings {
                file: config_dir.join("labforge.log"),
            },
        }
    }
}
