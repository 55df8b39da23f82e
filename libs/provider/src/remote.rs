//! Remote command execution interface.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

/// Why a connection attempt failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// Nothing is listening yet, or the daemon hung up before it was ready.
    #[error("connection refused by {0}")]
    Refused(String),

    /// The host did not answer in time.
    #[error("connection to {0} timed out")]
    TimedOut(String),

    /// The host answered but rejected our credentials.
    #[error("authentication failed for {user}@{host}: {message}")]
    Auth {
        user: String,
        host: String,
        message: String,
    },

    /// Protocol negotiation failed for a reason other than a timeout.
    #[error("SSH handshake with {host} failed: {message}")]
    Handshake { host: String, message: String },

    /// Local I/O problem (unreadable key file, unreachable network).
    #[error("I/O error connecting to {host}: {message}")]
    Io { host: String, message: String },
}

impl ConnectError {
    /// Returns true for failures expected while a host is still booting.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Refused(_) | Self::TimedOut(_))
    }
}

/// Failures on an established session.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("SSH channel error: {0}")]
    Channel(String),

    #[error("failed to read local file {path}: {source}")]
    LocalFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write remote file {path}: {message}")]
    Upload { path: String, message: String },
}

/// A shell command with optional environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    line: String,
    env: BTreeMap<String, String>,
}

impl RemoteCommand {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            env: BTreeMap::new(),
        }
    }

    /// Adds an environment variable visible to the command.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The command as written.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Environment variables, sorted by name.
    pub fn env_vars(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Renders a single shell line that exports the environment first.
    ///
    /// sshd usually drops `setenv` requests, so variables travel inline.
    pub fn to_shell(&self) -> String {
        if self.env.is_empty() {
            return self.line.clone();
        }

        let exports: Vec<String> = self
            .env
            .iter()
            .map(|(key, value)| format!("export {}={}", key, shell_quote(value)))
            .collect();
        format!("{}; {}", exports.join("; "), self.line)
    }
}

impl std::fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.line)
    }
}

/// Single-quotes a value for POSIX shells.
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Opens sessions to instances.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: IpAddr) -> Result<Box<dyn RemoteSession>, ConnectError>;
}

/// An open session, exclusively owned by the task that opened it.
#[async_trait]
pub trait RemoteSession: Send {
    /// Runs a command to completion and captures its output.
    async fn run(&mut self, command: &RemoteCommand) -> Result<CommandOutput, RemoteError>;

    /// Writes `contents` to `remote_path` (relative paths resolve from the
    /// login user's home directory).
    async fn write_file(&mut self, remote_path: &str, contents: &[u8]) -> Result<(), RemoteError>;

    /// Uploads a local file.
    async fn put_file(&mut self, local_path: &Path, remote_path: &str) -> Result<(), RemoteError> {
        let contents =
            tokio::fs::read(local_path)
                .await
                .map_err(|source| RemoteError::LocalFile {
                    path: local_path.display().to_string(),
                    source,
                })?;
        self.write_file(remote_path, &contents).await
    }

    /// Releases the session.
    async fn close(self: Box<Self>) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_command_is_unchanged() {
        let command = RemoteCommand::new("apt-get update -yq");
        assert_eq!(command.to_shell(), "apt-get update -yq");
        assert_eq!(command.to_string(), "apt-get update -yq");
    }

    #[test]
    fn test_env_is_exported_and_quoted() {
        let command = RemoteCommand::new("apt-get install -yq git")
            .env("DEBIAN_FRONTEND", "noninteractive")
            .env("A_QUOTE", "it's");
        assert_eq!(
            command.to_shell(),
            "export A_QUOTE='it'\\''s'; export DEBIAN_FRONTEND='noninteractive'; apt-get install -yq git"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(ConnectError::Refused("10.0.0.1".into()).is_transient());
        assert!(ConnectError::TimedOut("10.0.0.1".into()).is_transient());
        assert!(!ConnectError::Auth {
            user: "root".into(),
            host: "10.0.0.1".into(),
            message: "denied".into(),
        }
        .is_transient());
    }
}
