//! Error types for the proxy.

use std::net::SocketAddr;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Invalid or contradictory startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A URL input did not parse as an absolute http(s) URL.
    #[error("invalid {field} '{value}': {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    /// The publish URL carries a path, query or fragment.
    #[error("the publish URL '{0}' must not contain a path")]
    PublishUrlHasPath(String),

    /// The path prefix is empty, relative or the bare root.
    #[error("invalid path prefix '{0}': must start with '/' and not be '/'")]
    InvalidPathPrefix(String),

    /// An allowed CORS origin is not an absolute URL.
    #[error("invalid allowed CORS origin '{0}'")]
    InvalidCorsOrigin(String),

    /// The cookie domain is empty or contains illegal characters.
    #[error("invalid cookie domain '{0}'")]
    InvalidCookieDomain(String),

    /// Neither a project nor a platform API URL was given.
    #[error("no project selected; pass --project, set ORY_PROJECT, or configure a default project")]
    MissingProject,

    /// The project reference could not be turned into an API location.
    #[error("invalid project: {0}")]
    InvalidProject(#[from] ory_client::Error),
}

/// Proxy error type.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Startup configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The listen address could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The HTTP server stopped with an error.
    #[error("Server error: {0}")]
    Server(String),

    /// The signing key could not be generated.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// A token could not be signed.
    #[error("Signing error: {0}")]
    Signing(String),

    /// The application or platform API could not be reached.
    #[error("Upstream {target} unreachable: {reason}")]
    UpstreamUnreachable { target: String, reason: String },

    /// The application or platform API did not answer in time.
    #[error("Upstream {target} timed out")]
    UpstreamTimeout { target: String },

    /// Session resolution failed.
    #[error("Identity lookup failed: {0}")]
    IdentityLookup(String),

    /// The inbound request cannot be forwarded.
    #[error("Malformed request: {0}")]
    MalformedRequest(String),
}

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ProxyError {
    /// Status code and error code used when answering a client.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ProxyError::UpstreamUnreachable { .. } => {
                (StatusCode::BAD_GATEWAY, "upstream_unreachable")
            }
            ProxyError::UpstreamTimeout { .. } => {
                (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout")
            }
            ProxyError::IdentityLookup(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "identity_lookup_failed")
            }
            ProxyError::MalformedRequest(_) => (StatusCode::BAD_REQUEST, "malformed_request"),
            ProxyError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            ProxyError::Bind { .. } | ProxyError::Server(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
            ProxyError::KeyGeneration(_) | ProxyError::Signing(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "signing_error")
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(status = %status, code, error = %message, "Proxy error");
        } else {
            tracing::warn!(status = %status, code, error = %message, "Client error");
        }

        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}
