//! CLI runner for common setup and operations.
//!
//! Encapsulates configuration loading, logging initialization, and cloud
//! authentication to reduce duplication across command handlers.

use crate::error::CliError;
use labforge::compute::OpenStackCompute;
use labforge::config::ConfigFile;
use labforge::logging::{init_logging_full, LoggingGuard};
use tracing::info;

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    /// Loaded configuration file
    config: ConfigFile,
}

impl CliRunner {
    /// Create a new CLI runner, loading config and initializing logging.
    ///
    /// When stdout is a terminal, stdout logging is disabled so progress
    /// output and result tables stay readable; the log file gets
    /// everything either way.
    pub fn new() -> Result<Self, CliError> {
        // Load config file (or use defaults if not present)
        let config = ConfigFile::load()?;

        let stdout_enabled = !atty::is(atty::Stream::Stdout);
        let logging_guard = init_logging_full(&config.logging.file, stdout_enabled)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            logging_guard,
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("LabForge v{}", labforge::VERSION);
        info!("LabForge CLI: {} command", command);
    }

    /// Authenticate against the cloud with the configured credentials.
    pub async fn authenticate(&self) -> Result<OpenStackCompute, CliError> {
        let cloud = &self.config.cloud;
        if cloud.username.is_empty() || cloud.api_key.is_empty() {
            return Err(CliError::Config(
                "cloud credentials are not set".to_string(),
            ));
        }

        info!(username = %cloud.username, "Authenticating");
        println!("Authenticating as {}...", cloud.username);

        OpenStackCompute::authenticate(
            &cloud.auth_url,
            &cloud.username,
            &cloud.api_key,
            cloud.region.as_deref(),
        )
        .await
        .map_err(CliError::Auth)
        .inspect(|_| info!("Authentication succeeded"))
    }
}
