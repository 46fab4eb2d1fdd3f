//! Client error types.

use thiserror::Error;

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform did not answer within the configured timeout.
    #[error("Request to {0} timed out")]
    Timeout(String),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The platform answered with a status the client does not handle.
    #[error("Unexpected response status {status} from {url}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// The response body could not be decoded.
    #[error("Invalid response body: {0}")]
    InvalidResponse(String),

    /// The cookie header handed to the client is not a valid header value.
    #[error("Invalid cookie header: {0}")]
    InvalidCookie(String),

    /// The project reference is unusable.
    #[error("Invalid project: {0}")]
    InvalidProject(String),

    /// A credential source required an API key that is not available.
    #[error("No project API key found; set {var} to a project API key")]
    MissingApiKey {
        /// Environment variable that was consulted.
        var: String,
    },
}

impl Error {
    /// Check if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Check if the platform could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_connect() || e.is_timeout(),
            Error::Timeout(_) => true,
            _ => false,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
