//! Remote command execution on lab nodes.
//!
//! Once a node is ACTIVE the orchestrator talks to it over SSH: running
//! setup commands, uploading rendered files, and pulling generated
//! secrets back. The [`RemoteShell`] trait is the seam; [`SshShell`] is
//! the production implementation, and tests substitute a recording mock.

use std::fmt;
use std::future::Future;
use std::io;
use std::path::PathBuf;

mod ssh;

pub use ssh::SshShell;

/// Remote shell access to one lab node.
///
/// Hosts are addressed by IP or hostname; authentication is the
/// implementation's concern. Implementations do not retry.
pub trait RemoteShell: Send + Sync {
    /// Runs a command on `host` and returns its stdout.
    fn run(
        &self,
        host: &str,
        command: &str,
    ) -> impl Future<Output = Result<String, RemoteError>> + Send;

    /// Writes `content` to `remote_path` on `host`.
    fn put(
        &self,
        host: &str,
        content: &str,
        remote_path: &str,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;

    /// Reads the contents of `remote_path` on `host`.
    fn fetch(
        &self,
        host: &str,
        remote_path: &str,
    ) -> impl Future<Output = Result<Vec<u8>, RemoteError>> + Send;
}

/// Connection settings shared by every node in a build.
#[derive(Debug, Clone)]
pub struct ExecSettings {
    /// Login user on the nodes.
    pub user: String,
    /// SSH port.
    pub port: u16,
    /// Private key to authenticate with; agent/default keys when `None`.
    pub key_path: Option<PathBuf>,
    /// TCP connection attempts before the transport gives up.
    pub connect_attempts: u32,
    /// Keepalive interval, in seconds.
    pub keepalive_secs: u32,
}

impl Default for ExecSettings {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            port: 22,
            key_path: None,
            connect_attempts: 3,
            keepalive_secs: 15,
        }
    }
}

/// Errors that can occur talking to a node.
#[derive(Debug)]
pub enum RemoteError {
    /// The transport process could not be started
    Spawn(String),
    /// I/O error streaming to or from the transport
    Io(io::Error),
    /// The remote command ran and exited non-zero
    CommandFailed { status: i32, stderr: String },
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(msg) => write!(f, "Failed to start transport: {}", msg),
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::CommandFailed { status, stderr } => {
                write!(f, "Remote command exited with status {}: {}", status, stderr)
            }
        }
    }
}

impl std::error::Error for RemoteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RemoteError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
