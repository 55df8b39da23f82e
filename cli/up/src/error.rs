//! Error handling and display for the CLI.

use std::path::PathBuf;

use colored::Colorize;
use thiserror::Error;
use upfleet_engine::{EngineError, ErrorKind};
use upfleet_provider::{ConnectError, ProviderError};

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Not authenticated. Run `up login` or set DIGITALOCEAN_TOKEN.")]
    NotAuthenticated,

    #[error("No package.json found in {0} or any parent directory")]
    NoProject(PathBuf),

    #[error("package.json at {0} has no `name`")]
    NoServiceName(PathBuf),

    #[error("No target specified. Use --target or set UP_TARGET.")]
    NoTarget,

    #[error("No domain configured for target `{0}`")]
    NoDomain(String),
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error, verbose: bool) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    if verbose {
        for cause in err.chain().skip(1) {
            eprintln!("  {} {}", "caused by:".dimmed(), cause);
        }
    }

    if let Some(hint) = hint(err) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

fn hint(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::NotAuthenticated => Some("Run `up login --token <token>` to store a token."),
            CliError::NoTarget => Some("Pass --target <environment>, e.g. `up -t production`."),
            CliError::NoDomain(_) => {
                Some("Pass the host to `up init`, or add it under `up.targets` in package.json.")
            }
            _ => None,
        };
    }

    let engine_err = err.chain().find_map(|e| e.downcast_ref::<EngineError>())?;
    match engine_err {
        EngineError::Provider(ProviderError::Unauthenticated) => {
            Some("Your token was rejected. Run `up login` with a valid token.")
        }
        EngineError::Provider(ProviderError::Api { status: 403, .. }) => {
            Some("Your token may be read-only; write access is required.")
        }
        EngineError::Connect {
            source: ConnectError::Auth { .. },
            ..
        } => Some("The instance rejected the SSH key; check the private key path and `up keys list`."),
        EngineError::Partial { .. } => {
            Some("The instances that succeeded were left in place; rerun to retry the rest.")
        }
        other => match other.kind() {
            ErrorKind::TransientNetwork => {
                Some("Check your network connection and the instance's firewall.")
            }
            ErrorKind::StateInconsistency => {
                Some("Fix the conflicting resource by hand; up never overwrites it.")
            }
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hint_for_cli_errors() {
        let err = anyhow::Error::new(CliError::NoTarget);
        assert!(hint(&err).unwrap().contains("--target"));
    }

    #[test]
    fn test_hint_looks_through_context() {
        let err = anyhow::Error::new(EngineError::Inconsistency("x".into()))
            .context("Failed to initialize");
        assert!(hint(&err).unwrap().contains("by hand"));
    }

    #[test]
    fn test_ssh_auth_failure_is_not_a_network_hint() {
        let err = anyhow::Error::new(EngineError::Connect {
            instance: "api-prod-0".into(),
            source: ConnectError::Auth {
                user: "root".into(),
                host: "10.0.0.1".into(),
                message: "denied".into(),
            },
        });
        let message = hint(&err).unwrap();
        assert!(message.contains("SSH key"));
        assert!(!message.contains("network"));
    }

    #[test]
    fn test_no_hint_for_configuration_errors() {
        let err = anyhow::Error::new(EngineError::config("bad"));
        assert_eq!(hint(&err), None);
    }
}
