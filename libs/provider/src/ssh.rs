//! SSH sessions over libssh2.
//!
//! libssh2 is blocking; every call is moved onto the blocking pool so a slow
//! host never stalls the tasks driving other instances.

use std::io::{ErrorKind, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ssh2::{ErrorCode, Session};
use tracing::debug;

use crate::remote::{CommandOutput, ConnectError, Connector, RemoteCommand, RemoteError, RemoteSession};

// libssh2 session error codes that mean "the daemon is not ready yet".
const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_ERROR_SOCKET_DISCONNECT: i32 = -13;
const LIBSSH2_ERROR_SOCKET_RECV: i32 = -43;

/// SSH connection settings.
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub user: String,
    pub port: u16,
    pub private_key: PathBuf,
    pub connect_timeout: Duration,
}

impl SshConfig {
    /// Root login with the given private key on port 22.
    pub fn root(private_key: impl Into<PathBuf>) -> Self {
        Self {
            user: "root".to_string(),
            port: 22,
            private_key: private_key.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Opens libssh2 sessions with public-key authentication.
#[derive(Debug, Clone)]
pub struct SshConnector {
    config: SshConfig,
}

impl SshConnector {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, address: IpAddr) -> Result<Box<dyn RemoteSession>, ConnectError> {
        let config = self.config.clone();
        let host = address.to_string();

        let session = tokio::task::spawn_blocking(move || open_session(&config, address))
            .await
            .map_err(|e| ConnectError::Io {
                host: host.clone(),
                message: e.to_string(),
            })??;

        debug!(host = %host, "SSH session established");
        Ok(Box::new(SshSession {
            session: Arc::new(session),
            host,
        }))
    }
}

fn open_session(config: &SshConfig, address: IpAddr) -> Result<Session, ConnectError> {
    let host = address.to_string();
    let socket = SocketAddr::new(address, config.port);

    let tcp = TcpStream::connect_timeout(&socket, config.connect_timeout).map_err(|e| {
        match e.kind() {
            ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => {
                ConnectError::Refused(host.clone())
            }
            ErrorKind::TimedOut | ErrorKind::WouldBlock => ConnectError::TimedOut(host.clone()),
            _ => ConnectError::Io {
                host: host.clone(),
                message: e.to_string(),
            },
        }
    })?;

    let mut session = Session::new().map_err(|e| ConnectError::Handshake {
        host: host.clone(),
        message: e.to_string(),
    })?;
    session.set_timeout(config.connect_timeout.as_millis().try_into().unwrap_or(u32::MAX));
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| classify_handshake(&host, &e))?;

    session
        .userauth_pubkey_file(&config.user, None, &config.private_key, None)
        .map_err(|e| ConnectError::Auth {
            user: config.user.clone(),
            host: host.clone(),
            message: e.message().to_string(),
        })?;

    if !session.authenticated() {
        return Err(ConnectError::Auth {
            user: config.user.clone(),
            host,
            message: "server did not accept the key".to_string(),
        });
    }

    // Commands such as package installs run far longer than the connect budget.
    session.set_timeout(0);
    Ok(session)
}

fn classify_handshake(host: &str, error: &ssh2::Error) -> ConnectError {
    match error.code() {
        ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT) => ConnectError::TimedOut(host.to_string()),
        // sshd still starting up closes the socket during banner exchange
        ErrorCode::Session(LIBSSH2_ERROR_SOCKET_DISCONNECT | LIBSSH2_ERROR_SOCKET_RECV) => {
            ConnectError::Refused(host.to_string())
        }
        _ => ConnectError::Handshake {
            host: host.to_string(),
            message: error.message().to_string(),
        },
    }
}

/// An authenticated libssh2 session.
pub struct SshSession {
    session: Arc<Session>,
    host: String,
}

impl SshSession {
    async fn blocking<T, F>(&self, f: F) -> Result<T, RemoteError>
    where
        T: Send + 'static,
        F: FnOnce(&Session) -> Result<T, RemoteError> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || f(&session))
            .await
            .map_err(|e| RemoteError::Channel(e.to_string()))?
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(&mut self, command: &RemoteCommand) -> Result<CommandOutput, RemoteError> {
        let line = command.to_shell();
        debug!(host = %self.host, command = %command, "Running remote command");

        self.blocking(move |session| {
            let channel_err = |e: ssh2::Error| RemoteError::Channel(e.to_string());
            let io_err = |e: std::io::Error| RemoteError::Channel(e.to_string());

            let mut channel = session.channel_session().map_err(channel_err)?;
            channel.exec(&line).map_err(channel_err)?;

            let mut stdout = String::new();
            channel.read_to_string(&mut stdout).map_err(io_err)?;
            let mut stderr = String::new();
            channel
                .stderr()
                .read_to_string(&mut stderr)
                .map_err(io_err)?;

            channel.wait_close().map_err(channel_err)?;
            let exit_code = channel.exit_status().map_err(channel_err)?;

            Ok(CommandOutput {
                exit_code,
                stdout,
                stderr,
            })
        })
        .await
    }

    async fn write_file(&mut self, remote_path: &str, contents: &[u8]) -> Result<(), RemoteError> {
        let path = remote_path.to_string();
        let contents = contents.to_vec();
        debug!(host = %self.host, path = %path, bytes = contents.len(), "Uploading file");

        self.blocking(move |session| {
            let upload_err = |message: String| RemoteError::Upload {
                path: path.clone(),
                message,
            };

            let mut channel = session
                .scp_send(Path::new(&path), 0o644, contents.len() as u64, None)
                .map_err(|e| upload_err(e.to_string()))?;
            channel
                .write_all(&contents)
                .map_err(|e| upload_err(e.to_string()))?;
            channel.send_eof().map_err(|e| upload_err(e.to_string()))?;
            channel.wait_eof().map_err(|e| upload_err(e.to_string()))?;
            channel.close().map_err(|e| upload_err(e.to_string()))?;
            channel.wait_close().map_err(|e| upload_err(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn close(self: Box<Self>) -> Result<(), RemoteError> {
        debug!(host = %self.host, "Disconnecting");
        self.blocking(|session| {
            session
                .disconnect(None, "closing", None)
                .map_err(|e| RemoteError::Channel(e.to_string()))
        })
        .await
    }
}
