//! Error types for the client

use thiserror::Error;

/// Client-wide error type
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The request timed out before a response arrived. The outcome on the
    /// server is unknown; callers must reconcile via a snapshot fetch instead
    /// of assuming the request had no effect.
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    pub fn api(msg: impl Into<String>) -> Self {
        ClientError::Api(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        ClientError::Network(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        ClientError::Auth(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        ClientError::Parse(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ClientError::NotFound(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        ClientError::Timeout(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        ClientError::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ClientError::Internal(msg.into())
    }

    /// Whether the outcome of the failed request is unknown on the server
    pub fn is_unknown_outcome(&self) -> bool {
        matches!(self, ClientError::Timeout(_))
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
