//! Client error types.

use photolink_providers::{ProviderError, ProviderErrorCode};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("authentication required: {0}")]
    AuthRequired(String),

    /// A host collaborator (vault, editor) refused an operation.
    #[error("host error: {0}")]
    Host(String),

    #[error("cancelled")]
    Cancelled,
}

impl ClientError {
    /// True when the failure means the user has to sign in again.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::AuthRequired(_) => true,
            Self::Provider(e) => e.code() == ProviderErrorCode::Unauthenticated,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_are_recognised() {
        assert!(ClientError::AuthRequired("x".into()).is_auth_failure());
        assert!(ClientError::from(ProviderError::unauthenticated("expired")).is_auth_failure());
        assert!(!ClientError::from(ProviderError::unknown_status(500, "boom")).is_auth_failure());
        assert!(!ClientError::Cancelled.is_auth_failure());
    }

    #[test]
    fn display_includes_cause() {
        let err = ClientError::from(ProviderError::malformed_input("bad filter"));
        assert!(err.to_string().contains("bad filter"));
    }
}
