//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct
//! fields.

use ini::Ini;
use std::path::PathBuf;

use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in
/// the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [cloud] section
    if let Some(section) = ini.section(Some("cloud")) {
        if let Some(v) = section.get("auth_url") {
            let v = v.trim();
            if !v.is_empty() {
                config.cloud.auth_url = v.to_string();
            }
        }
        if let Some(v) = section.get("username") {
            config.cloud.username = v.trim().to_string();
        }
        if let Some(v) = section.get("api_key") {
            config.cloud.api_key = v.trim().to_string();
        }
        if let Some(v) = section.get("region") {
            let v = v.trim();
            if !v.is_empty() {
                config.cloud.region = Some(v.to_string());
            }
        }
    }

    // [build] section
    if let Some(section) = ini.section(Some("build")) {
        if let Some(v) = section.get("concurrency") {
            config.build.concurrency = parse_number(v, "build", "concurrency")?;
        }
        if let Some(v) = section.get("controller_ram_mb") {
            config.build.controller_ram_mb = parse_number(v, "build", "controller_ram_mb")?;
        }
        if let Some(v) = section.get("compute_ram_mb") {
            config.build.compute_ram_mb = parse_number(v, "build", "compute_ram_mb")?;
        }
        if let Some(v) = section.get("image") {
            let v = v.trim();
            if !v.is_empty() {
                config.build.image = v.to_string();
            }
        }
        if let Some(v) = section.get("net_cidr") {
            let v = v.trim();
            if !v.is_empty() {
                config.build.net_cidr = v.to_string();
            }
        }
        if let Some(v) = section.get("key_name") {
            let v = v.trim();
            if !v.is_empty() {
                config.build.key_name = Some(v.to_string());
            }
        }
        if let Some(v) = section.get("key_file") {
            let v = v.trim();
            if !v.is_empty() {
                config.build.key_file = Some(expand_tilde(v));
            }
        }
        if let Some(v) = section.get("attach_service_net") {
            config.build.attach_service_net = parse_bool(v, "build", "attach_service_net")?;
        }
        if let Some(v) = section.get("create_attempts") {
            config.build.create_attempts = parse_number(v, "build", "create_attempts")?;
        }
        if let Some(v) = section.get("poll_attempts") {
            config.build.poll_attempts = parse_number(v, "build", "poll_attempts")?;
        }
        if let Some(v) = section.get("retry_delay_secs") {
            config.build.retry_delay_secs = parse_number(v, "build", "retry_delay_secs")?;
        }
        if let Some(v) = section.get("requeue_ceiling") {
            config.build.requeue_ceiling = parse_number(v, "build", "requeue_ceiling")?;
        }
    }

    // [remote] section
    if let Some(section) = ini.section(Some("remote")) {
        if let Some(v) = section.get("user") {
            let v = v.trim();
            if !v.is_empty() {
                config.remote.user = v.to_string();
            }
        }
        if let Some(v) = section.get("port") {
            config.remote.port = parse_number(v, "remote", "port")?;
        }
        if let Some(v) = section.get("key_path") {
            let v = v.trim();
            if !v.is_empty() {
                config.remote.key_path = Some(expand_tilde(v));
            }
        }
        if let Some(v) = section.get("connect_attempts") {
            config.remote.connect_attempts = parse_number(v, "remote", "connect_attempts")?;
        }
        if let Some(v) = section.get("keepalive_secs") {
            config.remote.keepalive_secs = parse_number(v, "remote", "keepalive_secs")?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = expand_tilde(v);
            }
        }
    }

    Ok(config)
}

fn parse_number<T: std::str::FromStr>(
    value: &str,
    section: &str,
    key: &str,
) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigFileError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be a non-negative integer".to_string(),
        })
}

fn parse_bool(value: &str, section: &str, key: &str) -> Result<bool, ConfigFileError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ConfigFileError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be 'true' or 'false'".to_string(),
        }),
    }
}

/// Expands a leading `~/` to the user's home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
