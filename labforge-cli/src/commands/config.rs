//! Configuration management CLI commands.
//!
//! Provides `config init`, `config path`, and `config show` for creating
//! and inspecting the configuration file from the command line.

use clap::Subcommand;
use labforge::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Create the configuration file with default settings
    Init,

    /// Show the configuration file path
    Path,

    /// Show the effective configuration
    Show,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init => run_init(),
        ConfigCommands::Path => run_path(),
        ConfigCommands::Show => run_show(),
    }
}

/// Create the configuration file if it does not exist yet.
fn run_init() -> Result<(), CliError> {
    let existed = config_file_path().exists();
    let path = ConfigFile::ensure_exists()?;

    if existed {
        println!("Configuration already exists: {}", path.display());
    } else {
        println!("Created {}", path.display());
        println!();
        println!("Edit the [cloud] section with your provider credentials");
        println!("before building a lab.");
    }
    Ok(())
}

/// Show the configuration file path.
fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}

/// Show the effective configuration, defaults filled in.
fn run_show() -> Result<(), CliError> {
    let config = ConfigFile::load()?;

    println!("[cloud]");
    println!("  auth_url = {}", config.cloud.auth_url);
    println!("  username = {}", display_or(&config.cloud.username, "(not set)"));
    println!(
        "  api_key = {}",
        if config.cloud.api_key.is_empty() {
            "(not set)"
        } else {
            "(set)"
        }
    );
    println!(
        "  region = {}",
        config.cloud.region.as_deref().unwrap_or("(not set)")
    );
    println!();

    println!("[build]");
    println!("  concurrency = {}", config.build.concurrency);
    println!("  controller_ram_mb = {}", config.build.controller_ram_mb);
    println!("  compute_ram_mb = {}", config.build.compute_ram_mb);
    println!("  image = {}", config.build.image);
    println!("  net_cidr = {}", config.build.net_cidr);
    println!(
        "  key_name = {}",
        config.build.key_name.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  key_file = {}",
        config
            .build
            .key_file
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!("  attach_service_net = {}", config.build.attach_service_net);
    println!("  create_attempts = {}", config.build.create_attempts);
    println!("  poll_attempts = {}", config.build.poll_attempts);
    println!("  retry_delay_secs = {}", config.build.retry_delay_secs);
    println!("  requeue_ceiling = {}", config.build.requeue_ceiling);
    println!();

    println!("[remote]");
    println!("  user = {}", config.remote.user);
    println!("  port = {}", config.remote.port);
    println!(
        "  key_path = {}",
        config
            .remote
            .key_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!("  connect_attempts = {}", config.remote.connect_attempts);
    println!("  keepalive_secs = {}", config.remote.keepalive_secs);
    println!();

    println!("[logging]");
    println!("  file = {}", config.logging.file.display());

    Ok(())
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}
