//! Configuration loaded from ~/.labforge/config.ini.
//!
//! Settings structs live in [`settings`], constants and `Default` impls
//! in [`defaults`], INI parsing in [`parser`], and serialization in
//! [`writer`]. [`file`] ties them together around the on-disk file.

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::{
    DEFAULT_CREATE_ATTEMPTS, DEFAULT_IMAGE, DEFAULT_NET_CIDR, DEFAULT_POLL_ATTEMPTS,
    DEFAULT_RAM_MB, DEFAULT_REQUEUE_CEILING, DEFAULT_RETRY_DELAY_SECS,
};
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{BuildSettings, CloudSettings, ConfigFile, LoggingSettings, RemoteSettings};
