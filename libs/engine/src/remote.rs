//! Remote execution on fleet instances.
//!
//! Wraps a [`Connector`] with the engine's retry policy and turns non-zero
//! exits into errors. Sessions are closed explicitly by the caller on every
//! exit path; see [`Remote::finish`].

use std::net::IpAddr;
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use upfleet_provider::{CommandOutput, Connector, RemoteCommand, RemoteSession};
use upfleet_reconcile::{PollPolicy, Poller};

use crate::error::EngineError;
use crate::progress::{FleetEvent, Progress};

/// Opens sessions to instances, waiting out hosts that are still booting.
pub struct RemoteExecutor<'a> {
    connector: &'a dyn Connector,
    policy: PollPolicy,
    cancel: &'a CancellationToken,
    progress: &'a dyn Progress,
}

impl<'a> RemoteExecutor<'a> {
    pub fn new(
        connector: &'a dyn Connector,
        policy: PollPolicy,
        cancel: &'a CancellationToken,
        progress: &'a dyn Progress,
    ) -> Self {
        Self {
            connector,
            policy,
            cancel,
            progress,
        }
    }

    /// Connects to `address`, retrying refused and timed out attempts until
    /// the run is cancelled. Other connection failures are returned at once.
    pub async fn connect(&self, instance: &str, address: IpAddr) -> Result<Remote, EngineError> {
        let connector = self.connector;
        let poll_name = format!("ssh {instance}");

        let session = Poller::new(self.policy, self.cancel)
            .with_observer(self.progress)
            .run(&poll_name, |attempt| async move {
                match connector.connect(address).await {
                    Ok(session) => Ok(Some(session)),
                    Err(e) if e.is_transient() => {
                        debug!(instance, %address, attempt, error = %e, "SSH not ready");
                        Ok(None)
                    }
                    Err(source) => Err(EngineError::Connect {
                        instance: instance.to_string(),
                        source,
                    }),
                }
            })
            .await?;

        self.progress.event(&FleetEvent::Connected {
            name: instance,
            address,
        });

        Ok(Remote {
            session,
            instance: instance.to_string(),
        })
    }
}

/// An open session to one instance.
pub struct Remote {
    session: Box<dyn RemoteSession>,
    instance: String,
}

impl Remote {
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Runs a command, failing on a non-zero exit.
    pub async fn exec(&mut self, command: &RemoteCommand) -> Result<CommandOutput, EngineError> {
        debug!(instance = %self.instance, command = %command, "Running");

        let output = self
            .session
            .run(command)
            .await
            .map_err(|source| EngineError::Remote {
                instance: self.instance.clone(),
                source,
            })?;

        if !output.success() {
            return Err(EngineError::RemoteCommand {
                instance: self.instance.clone(),
                command: command.line().to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Writes `contents` to `remote_path`, relative to the login directory.
    pub async fn write(&mut self, remote_path: &str, contents: &[u8]) -> Result<(), EngineError> {
        debug!(instance = %self.instance, remote_path, bytes = contents.len(), "Writing");
        self.session
            .write_file(remote_path, contents)
            .await
            .map_err(|source| EngineError::Remote {
                instance: self.instance.clone(),
                source,
            })
    }

    /// Copies a local file to `remote_path`.
    pub async fn upload(&mut self, local: &Path, remote_path: &str) -> Result<(), EngineError> {
        debug!(instance = %self.instance, local = %local.display(), remote_path, "Uploading");
        self.session
            .put_file(local, remote_path)
            .await
            .map_err(|source| EngineError::Remote {
                instance: self.instance.clone(),
                source,
            })
    }

    /// Closes the session and returns `result`.
    ///
    /// A close failure is only reported when `result` is otherwise a
    /// success, so the first error wins.
    pub async fn finish<T>(self, result: Result<T, EngineError>) -> Result<T, EngineError> {
        let instance = self.instance;
        let closed = self.session.close().await;

        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(source)) => Err(EngineError::Remote { instance, source }),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!(%instance, error = %close_err, "Failed to close session");
                Err(e)
            }
        }
    }
}
