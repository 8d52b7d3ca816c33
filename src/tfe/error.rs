//! Error types for the TFE API client.

/// Errors returned by the TFE API client.
#[derive(Debug, thiserror::Error)]
pub enum TfeError {
    /// The requested object does not exist (404).
    #[error("resource not found: {path}")]
    NotFound { path: String },

    /// Authentication failed or the token lacks permission (401/403).
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Any other non-success response.
    #[error("TFE API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The request could not be sent or the body could not be read.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response body did not match the expected document shape.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// A key field cannot be used as a URL path segment.
    #[error("invalid path segment {segment:?}")]
    InvalidPathSegment { segment: String },

    /// The client configuration is unusable.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl TfeError {
    /// Whether the error means the object is gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result alias for client operations.
pub type TfeResult<T> = Result<T, TfeError>;
