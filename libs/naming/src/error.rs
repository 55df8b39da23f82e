//! Error types for name construction and validation.

use thiserror::Error;

/// Errors that can occur when building or validating names.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamingError {
    /// The service name is empty.
    #[error("service name cannot be empty")]
    EmptyService,

    /// The environment name is empty.
    #[error("environment name cannot be empty")]
    EmptyEnvironment,

    /// A character that cannot appear in a provider resource name.
    #[error("invalid character '{character}' in {field} '{value}'")]
    InvalidCharacter {
        field: &'static str,
        value: String,
        character: char,
    },

    /// The host name is not a domain or a domain with a single subdomain.
    #[error("invalid FQDN '{0}' (must be a domain or a domain with a single subdomain)")]
    InvalidFqdn(String),
}

impl NamingError {
    /// Returns true if the error concerns an empty component.
    pub fn is_empty(&self) -> bool {
        matches!(self, NamingError::EmptyService | NamingError::EmptyEnvironment)
    }
}
