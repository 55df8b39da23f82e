//! Fake SSH hosts.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;
use upfleet_provider::{
    CommandOutput, ConnectError, Connector, RemoteCommand, RemoteError, RemoteSession,
};

use crate::lock;

#[derive(Debug, Default)]
struct Host {
    connect_attempts: u32,
    refusals_left: Option<u32>,
    fatal: Option<ConnectError>,
    commands: Vec<RemoteCommand>,
    files: BTreeMap<String, Vec<u8>>,
    /// Canned stdout for commands containing a pattern.
    responses: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct RemoteState {
    hosts: HashMap<IpAddr, Host>,
    /// Refusals every host starts with unless configured individually.
    default_refusals: u32,
    /// Substrings of command lines that exit non-zero, optionally per host.
    failing: Vec<(Option<IpAddr>, String)>,
    open_sessions: usize,
}

impl RemoteState {
    fn host(&mut self, address: IpAddr) -> &mut Host {
        let default_refusals = self.default_refusals;
        let host = self.hosts.entry(address).or_default();
        host.refusals_left.get_or_insert(default_refusals);
        host
    }
}

/// A fleet of pretend hosts reachable by address.
///
/// Commands succeed with empty output unless configured to fail or given a
/// canned response; `cat` reads back files written through the session.
/// Sessions must be closed, which [`FakeRemote::open_sessions`] lets tests
/// verify.
#[derive(Debug, Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every host refuses its first `count` connection attempts.
    pub fn refuse_first(&self, count: u32) {
        lock(&self.state).default_refusals = count;
    }

    /// `address` refuses its first `count` connection attempts.
    pub fn refuse(&self, address: IpAddr, count: u32) {
        lock(&self.state).host(address).refusals_left = Some(count);
    }

    /// Connections to `address` fail authentication.
    pub fn reject_auth(&self, address: IpAddr) {
        lock(&self.state).host(address).fatal = Some(ConnectError::Auth {
            user: "root".to_string(),
            host: address.to_string(),
            message: "publickey denied".to_string(),
        });
    }

    /// Commands containing `pattern` exit with status 1 on every host.
    pub fn fail_command(&self, pattern: &str) {
        lock(&self.state).failing.push((None, pattern.to_string()));
    }

    /// Commands containing `pattern` exit with status 1 on `address`.
    pub fn fail_command_on(&self, address: IpAddr, pattern: &str) {
        lock(&self.state)
            .failing
            .push((Some(address), pattern.to_string()));
    }

    /// Commands containing `pattern` on `address` print `stdout`.
    pub fn respond(&self, address: IpAddr, pattern: &str, stdout: &str) {
        lock(&self.state)
            .host(address)
            .responses
            .push((pattern.to_string(), stdout.to_string()));
    }

    /// Seeds a file on a host.
    pub fn put(&self, address: IpAddr, path: &str, contents: &[u8]) {
        lock(&self.state)
            .host(address)
            .files
            .insert(path.to_string(), contents.to_vec());
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Command lines run on `address`, in order.
    pub fn commands(&self, address: IpAddr) -> Vec<String> {
        lock(&self.state)
            .hosts
            .get(&address)
            .map(|h| h.commands.iter().map(|c| c.line().to_string()).collect())
            .unwrap_or_default()
    }

    /// Full commands, including their environment, run on `address`.
    pub fn raw_commands(&self, address: IpAddr) -> Vec<RemoteCommand> {
        lock(&self.state)
            .hosts
            .get(&address)
            .map(|h| h.commands.clone())
            .unwrap_or_default()
    }

    pub fn file(&self, address: IpAddr, path: &str) -> Option<Vec<u8>> {
        lock(&self.state)
            .hosts
            .get(&address)
            .and_then(|h| h.files.get(path).cloned())
    }

    pub fn connect_attempts(&self, address: IpAddr) -> u32 {
        lock(&self.state)
            .hosts
            .get(&address)
            .map_or(0, |h| h.connect_attempts)
    }

    /// Hosts that received at least one command or file.
    pub fn touched_hosts(&self) -> Vec<IpAddr> {
        let mut hosts: Vec<IpAddr> = lock(&self.state)
            .hosts
            .iter()
            .filter(|(_, h)| !h.commands.is_empty() || !h.files.is_empty())
            .map(|(addr, _)| *addr)
            .collect();
        hosts.sort();
        hosts
    }

    /// Sessions opened and not yet closed.
    pub fn open_sessions(&self) -> usize {
        lock(&self.state).open_sessions
    }
}

#[async_trait]
impl Connector for FakeRemote {
    async fn connect(&self, address: IpAddr) -> Result<Box<dyn RemoteSession>, ConnectError> {
        let mut state = lock(&self.state);
        let host = state.host(address);
        host.connect_attempts += 1;

        if let Some(fatal) = &host.fatal {
            return Err(fatal.clone());
        }
        if let Some(left) = host.refusals_left.as_mut().filter(|left| **left > 0) {
            *left -= 1;
            debug!(%address, "[FAKE] connection refused");
            return Err(ConnectError::Refused(address.to_string()));
        }

        state.open_sessions += 1;
        Ok(Box::new(FakeSession {
            address,
            state: self.state.clone(),
        }))
    }
}

/// A session on one fake host.
#[derive(Debug)]
pub struct FakeSession {
    address: IpAddr,
    state: Arc<Mutex<RemoteState>>,
}

#[async_trait]
impl RemoteSession for FakeSession {
    async fn run(&mut self, command: &RemoteCommand) -> Result<CommandOutput, RemoteError> {
        let mut state = lock(&self.state);
        let fails = state.failing.iter().any(|(addr, pattern)| {
            addr.is_none_or(|a| a == self.address) && command.line().contains(pattern.as_str())
        });

        let host = state.host(self.address);
        host.commands.push(command.clone());
        debug!(address = %self.address, command = %command, "[FAKE] run");

        if fails {
            return Ok(CommandOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: format!("{} failed", command.line()),
            });
        }

        let canned = host
            .responses
            .iter()
            .find(|(pattern, _)| command.line().contains(pattern.as_str()))
            .map(|(_, stdout)| stdout.clone());
        let stdout = canned
            .or_else(|| {
                command
                    .line()
                    .strip_prefix("cat ~/")
                    .and_then(|rest| rest.split_whitespace().next())
                    .and_then(|path| host.files.get(path))
                    .map(|contents| String::from_utf8_lossy(contents).into_owned())
            })
            .unwrap_or_default();

        Ok(CommandOutput {
            exit_code: 0,
            stdout,
            stderr: String::new(),
        })
    }

    async fn write_file(&mut self, remote_path: &str, contents: &[u8]) -> Result<(), RemoteError> {
        lock(&self.state)
            .host(self.address)
            .files
            .insert(remote_path.to_string(), contents.to_vec());
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), RemoteError> {
        let mut state = lock(&self.state);
        state.open_sessions = state.open_sessions.saturating_sub(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1));

    #[tokio::test]
    async fn test_refusals_then_success() {
        let remote = FakeRemote::new();
        remote.refuse(HOST, 2);

        assert!(matches!(remote.connect(HOST).await, Err(ConnectError::Refused(_))));
        assert!(matches!(remote.connect(HOST).await, Err(ConnectError::Refused(_))));
        let session = remote.connect(HOST).await.unwrap();
        assert_eq!(remote.connect_attempts(HOST), 3);
        assert_eq!(remote.open_sessions(), 1);

        session.close().await.unwrap();
        assert_eq!(remote.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_cat_reads_written_files() {
        let remote = FakeRemote::new();
        let mut session = remote.connect(HOST).await.unwrap();

        session.write_file("app/.env", b"PORT=80\n").await.unwrap();
        let output = session
            .run(&RemoteCommand::new("cat ~/app/.env 2>/dev/null || true"))
            .await
            .unwrap();
        assert_eq!(output.stdout, "PORT=80\n");
    }

    #[tokio::test]
    async fn test_canned_response() {
        let remote = FakeRemote::new();
        remote.respond(HOST, "forever logs", "listening on 80\n");
        let mut session = remote.connect(HOST).await.unwrap();

        let output = session
            .run(&RemoteCommand::new(". ~/.nvm/nvm.sh && forever logs 0"))
            .await
            .unwrap();
        assert_eq!(output.stdout, "listening on 80\n");

        let other = session.run(&RemoteCommand::new("uptime")).await.unwrap();
        assert_eq!(other.stdout, "");
    }

    #[tokio::test]
    async fn test_failing_command() {
        let remote = FakeRemote::new();
        remote.fail_command("forever restart");
        let mut session = remote.connect(HOST).await.unwrap();

        let output = session
            .run(&RemoteCommand::new(". ~/.nvm/nvm.sh && forever restart 0"))
            .await
            .unwrap();
        assert!(!output.success());
        assert_eq!(remote.commands(HOST).len(), 1);
    }
}
