//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.

use std::path::PathBuf;
use std::time::Duration;

use crate::build::LifecyclePolicy;
use crate::remote::ExecSettings;
use crate::retry::RetryPolicy;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// Cloud account settings
    pub cloud: CloudSettings,
    /// Build settings
    pub build: BuildSettings,
    /// Remote access settings for the configure phase
    pub remote: RemoteSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Cloud account configuration.
#[derive(Debug, Clone)]
pub struct CloudSettings {
    /// Identity v2 endpoint builds authenticate against.
    pub auth_url: String,
    /// Account user name.
    pub username: String,
    /// Account API key.
    pub api_key: String,
    /// Preferred compute endpoint region (None = first catalog entry).
    pub region: Option<String>,
}

/// Build configuration.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// Instances built (and computes configured) at once.
    pub concurrency: usize,
    /// Controller flavor RAM in MB. Flavors are matched by exact RAM.
    pub controller_ram_mb: u32,
    /// Compute flavor RAM in MB.
    pub compute_ram_mb: u32,
    /// Image name fragment or image id.
    pub image: String,
    /// CIDR for each lab's isolated network.
    pub net_cidr: String,
    /// Keypair name injected into instances (None = no key injection).
    pub key_name: Option<String>,
    /// Public key file used to register the keypair when it is missing.
    pub key_file: Option<PathBuf>,
    /// Attach the provider's internal service network to every node.
    pub attach_service_net: bool,
    /// Attempt budget for the create-instance call.
    pub create_attempts: u32,
    /// Attempt budget for the status poll loop.
    pub poll_attempts: u32,
    /// Delay between retry attempts, in seconds.
    pub retry_delay_secs: u64,
    /// Maximum times one node may be rebuilt after ERROR states.
    pub requeue_ceiling: u32,
}

impl BuildSettings {
    /// Retry budgets these settings describe, with the stock cleanup
    /// policy and create jitter.
    pub fn lifecycle_policy(&self) -> LifecyclePolicy {
        let delay = Duration::from_secs(self.retry_delay_secs);
        LifecyclePolicy {
            create: RetryPolicy::new(self.create_attempts).with_delay(delay),
            poll: RetryPolicy::new(self.poll_attempts).with_delay(delay),
            requeue_ceiling: self.requeue_ceiling,
            ..LifecyclePolicy::default()
        }
    }
}

/// Remote access configuration for the configure phase.
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    /// Login user on freshly built nodes.
    pub user: String,
    /// SSH port.
    pub port: u16,
    /// Identity file (None = whatever ssh picks up itself).
    pub key_path: Option<PathBuf>,
    /// Connection attempts per command.
    pub connect_attempts: u32,
    /// Keepalive interval in seconds.
    pub keepalive_secs: u32,
}

impl From<RemoteSettings> for ExecSettings {
    fn from(settings: RemoteSettings) -> Self {
        Self {
            user: settings.user,
            port: settings.port,
            key_path: settings.key_path,
            connect_attempts: settings.connect_attempts,
            keepalive_secs: settings.keepalive_secs,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingSettings {
    /// Log file path
    pub file: PathBuf,
}
