//! SSH transport for remote execution.
//!
//! Shells out to the system `ssh` client rather than speaking the
//! protocol in-process. BatchMode keeps it non-interactive: a node that
//! wants a password fails fast instead of hanging the build.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{ExecSettings, RemoteError, RemoteShell};

/// Remote shell over the system SSH client.
pub struct SshShell {
    settings: ExecSettings,
}

impl SshShell {
    pub fn new(settings: ExecSettings) -> Self {
        Self { settings }
    }

    /// Assembles `ssh` with the shared options, ending at `user@host`.
    /// The remote command is appended by the caller.
    fn base_command(&self, host: &str) -> Command {
        let mut command = Command::new("ssh");
        command
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-o")
            .arg(format!(
                "ConnectionAttempts={}",
                self.settings.connect_attempts
            ))
            .arg("-o")
            .arg(format!("ServerAliveInterval={}", self.settings.keepalive_secs))
            .arg("-p")
            .arg(self.settings.port.to_string());
        if let Some(key) = &self.settings.key_path {
            command.arg("-i").arg(key);
        }
        command.arg(format!("{}@{}", self.settings.user, host));
        command
    }
}

impl RemoteShell for SshShell {
    async fn run(&self, host: &str, command: &str) -> Result<String, RemoteError> {
        debug!(host, command, "Running remote command");
        let output = self
            .base_command(host)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| RemoteError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(RemoteError::CommandFailed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn put(&self, host: &str, content: &str, remote_path: &str) -> Result<(), RemoteError> {
        debug!(host, remote_path, bytes = content.len(), "Uploading file");
        let mut child = self
            .base_command(host)
            .arg(format!("cat > '{}'", remote_path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RemoteError::Spawn(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(content.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(RemoteError::CommandFailed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn fetch(&self, host: &str, remote_path: &str) -> Result<Vec<u8>, RemoteError> {
        debug!(host, remote_path, "Fetching file");
        let output = self
            .base_command(host)
            .arg(format!("cat '{}'", remote_path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| RemoteError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(RemoteError::CommandFailed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}
