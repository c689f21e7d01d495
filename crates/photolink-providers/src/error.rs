//! Error types for Google Photos operations.
//!
//! The search client classifies every HTTP outcome into one of these codes;
//! only the fetch loop decides what a code means for the session.

use std::fmt;
use thiserror::Error;

/// The category of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// No usable access token and re-authentication failed. Terminal for a
    /// browsing session.
    Unauthenticated,
    /// The token was rejected, re-authentication succeeded, and the request
    /// should be sent again (once).
    Retry,
    /// The server rejected the request body (HTTP 400), usually a bad filter.
    MalformedInput,
    /// Any other non-200 status.
    UnknownStatus,
    /// Connection failed, timed out, or the body could not be read.
    Network,
    /// Local filesystem failure.
    Io,
    /// The server answered 200 with a body we could not parse.
    InvalidResponse,
    /// Missing or invalid configuration.
    Configuration,
    /// Unexpected internal state.
    Internal,
}

impl ProviderErrorCode {
    /// Returns true if the operation should be attempted once more.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retry)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Retry => "retry",
            Self::MalformedInput => "malformed_input",
            Self::UnknownStatus => "unknown_status",
            Self::Network => "network_error",
            Self::Io => "io_error",
            Self::InvalidResponse => "invalid_response",
            Self::Configuration => "configuration_error",
            Self::Internal => "internal_error",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised while talking to Google.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    /// HTTP status, when the error came from a response.
    status: Option<u16>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            source: None,
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Unauthenticated, message)
    }

    pub fn retry(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Retry, message)
    }

    /// HTTP 400. The response body is kept verbatim as the message.
    pub fn malformed_input(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::MalformedInput, message).with_status(400)
    }

    pub fn unknown_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::UnknownStatus, message).with_status(status)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Network, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Io, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Configuration, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Internal, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {}): {}", self.code, status, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timeout".to_string()
        } else if err.is_connect() {
            format!("connection failed: {err}")
        } else {
            format!("request failed: {err}")
        };
        Self::network(message).with_source(err)
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string()).with_source(err)
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;
