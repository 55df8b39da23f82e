//! Engine errors and their classification.

use thiserror::Error;
use upfleet_naming::NamingError;
use upfleet_provider::{ConnectError, ProviderError, RemoteError, ResolveError};
use upfleet_reconcile::PollError;

/// Broad failure classes, deciding retry and reporting behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid declared configuration. Never retried.
    Configuration,
    /// Network failures that are retried where the engine waits.
    TransientNetwork,
    /// A remote command exited non-zero.
    RemoteCommand,
    /// Actual state contradicts what the engine expects; never auto-fixed.
    StateInconsistency,
    /// Any other provider-side failure.
    Provider,
    /// The run was cancelled.
    Cancelled,
}

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid name: {0}")]
    Naming(#[from] NamingError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("cannot connect to {instance}: {source}")]
    Connect {
        instance: String,
        #[source]
        source: ConnectError,
    },

    #[error("session with {instance} failed: {source}")]
    Remote {
        instance: String,
        #[source]
        source: RemoteError,
    },

    #[error("`{command}` exited with {exit_code} on {instance}: {stderr}")]
    RemoteCommand {
        instance: String,
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("state inconsistency: {0}")]
    Inconsistency(String),

    #[error("DNS lookup failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("cancelled while waiting for {0}")]
    Cancelled(String),

    #[error("{} of {total} instances failed: {}", failures.len(), summarize(failures))]
    Partial {
        total: usize,
        failures: Vec<InstanceFailure>,
    },
}

impl EngineError {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::Naming(_) => ErrorKind::Configuration,
            Self::Provider(ProviderError::Network(_)) => ErrorKind::TransientNetwork,
            Self::Provider(ProviderError::Unauthenticated) => ErrorKind::Configuration,
            Self::Provider(_) => ErrorKind::Provider,
            Self::Connect { source, .. } if source.is_transient() => ErrorKind::TransientNetwork,
            // auth, handshake and local key failures will not clear on retry
            Self::Connect { .. } => ErrorKind::Configuration,
            Self::Remote { .. } | Self::Resolve(_) => ErrorKind::TransientNetwork,
            Self::RemoteCommand { .. } | Self::Partial { .. } => ErrorKind::RemoteCommand,
            Self::Inconsistency(_) => ErrorKind::StateInconsistency,
            Self::Cancelled(_) => ErrorKind::Cancelled,
        }
    }
}

impl From<PollError<EngineError>> for EngineError {
    fn from(err: PollError<EngineError>) -> Self {
        match err {
            PollError::Cancelled(name) => Self::Cancelled(name),
            PollError::Failed(e) => e,
        }
    }
}

/// A per-instance task failure inside a fan-out.
#[derive(Debug)]
pub struct InstanceFailure {
    pub instance: String,
    pub error: EngineError,
}

fn summarize(failures: &[InstanceFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.instance, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(
            EngineError::config("no target").kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            EngineError::Inconsistency("record".into()).kind(),
            ErrorKind::StateInconsistency
        );
        assert_eq!(
            EngineError::Provider(ProviderError::api(500, "server_error", "boom")).kind(),
            ErrorKind::Provider
        );
        assert_eq!(
            EngineError::Connect {
                instance: "api-prod-0".into(),
                source: ConnectError::Auth {
                    user: "root".into(),
                    host: "10.0.0.1".into(),
                    message: "denied".into(),
                },
            }
            .kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            EngineError::Connect {
                instance: "api-prod-0".into(),
                source: ConnectError::Refused("10.0.0.1".into()),
            }
            .kind(),
            ErrorKind::TransientNetwork
        );
    }

    #[test]
    fn test_poll_error_conversion() {
        let err: EngineError = PollError::<EngineError>::Cancelled("ssh api-prod-0".into()).into();
        assert!(matches!(err, EngineError::Cancelled(ref name) if name == "ssh api-prod-0"));

        let err: EngineError = PollError::Failed(EngineError::config("bad")).into();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_partial_message() {
        let err = EngineError::Partial {
            total: 3,
            failures: vec![InstanceFailure {
                instance: "api-prod-1".into(),
                error: EngineError::RemoteCommand {
                    instance: "api-prod-1".into(),
                    command: "forever restart 0".into(),
                    exit_code: 1,
                    stderr: "no process".into(),
                },
            }],
        };
        assert!(err.to_string().starts_with("1 of 3 instances failed: api-prod-1:"));
    }
}
