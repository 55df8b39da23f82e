//! Provider API errors.

use thiserror::Error;

/// Errors returned by cloud provider calls.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider rejected the bearer credential.
    #[error("provider rejected the API token")]
    Unauthenticated,

    /// The provider answered with a non-success status.
    #[error("provider API error ({status} {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response body did not have the expected shape.
    #[error("failed to decode provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Create an API error from response details.
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns true if the resource being created already exists.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Api { status: 409, .. } => true,
            Self::Api {
                status: 422,
                message,
                ..
            } => message.contains("already"),
            _ => false,
        }
    }

    /// Returns true if the addressed resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_classification() {
        assert!(ProviderError::api(409, "conflict", "duplicate").is_conflict());
        assert!(
            ProviderError::api(422, "unprocessable_entity", "Name already in use").is_conflict()
        );
        assert!(!ProviderError::api(422, "unprocessable_entity", "invalid region").is_conflict());
        assert!(!ProviderError::api(404, "not_found", "missing").is_conflict());
        assert!(ProviderError::api(404, "not_found", "missing").is_not_found());
    }
}
