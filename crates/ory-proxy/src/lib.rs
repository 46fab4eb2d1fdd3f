//! Local reverse proxy that serves an application and Ory on one origin.
//!
//! Browsers talk to the proxy only. Requests under the path prefix go to
//! the project's platform API, everything else goes to the application.
//! When a request carries an Ory session cookie, the proxy resolves it and
//! attaches a short ES256 token as `Authorization: Bearer`, so the
//! application can authenticate users by verifying a JWT against
//! `{prefix}/jwks.json` without ever talking to Ory itself.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ory_client::FrontendClient;
//! use ory_proxy::{ProxyOptions, ProxyServer, ProxyState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProxyOptions::new("http://localhost:3000")
//!     .with_project("playground")
//!     .resolve()?;
//! let resolver = FrontendClient::builder().project(&config.project).build()?;
//!
//! let server = ProxyServer::new(ProxyState::new(config, Arc::new(resolver))?);
//! let listener = server.bind().await?;
//! server.serve(listener, ory_proxy::shutdown_signal()).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod forward;
pub mod jwks;
pub mod keys;
pub mod logging;
pub mod rewrite;
pub mod router;
pub mod session;
pub mod state;
pub mod token;

pub use config::{LookupFailurePolicy, ProxyConfig, ProxyOptions};
pub use error::{ConfigError, ProxyError, Result};
pub use keys::{Jwk, JwkSet, SigningKey};
pub use router::{ForwardDecision, Route, classify};
pub use session::{CachedSession, SessionAuthenticator};
pub use state::ProxyState;
pub use token::SessionClaims;

use std::future::Future;
use std::net::SocketAddr;

use axum::{Router, middleware};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The proxy server.
pub struct ProxyServer {
    state: ProxyState,
}

impl ProxyServer {
    /// Create a server from prepared state.
    pub fn new(state: ProxyState) -> Self {
        Self { state }
    }

    /// Shared state.
    pub fn state(&self) -> &ProxyState {
        &self.state
    }

    /// Build the router.
    ///
    /// There are no fixed routes; a single fallback handler classifies every
    /// request itself.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(router::handle)
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                logging::request_logging_middleware,
            ))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.state.config.bind_address();
        TcpListener::bind(addr)
            .await
            .map_err(|source| ProxyError::Bind { addr, source })
    }

    /// Serve on `listener` until `shutdown` resolves.
    ///
    /// The session sweeper runs for exactly as long as the server does.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let addr = listener
            .local_addr()
            .map_err(|e| ProxyError::Server(e.to_string()))?;
        let config = &self.state.config;

        let sweeper = ory_session::spawn_sweeper(
            self.state.sessions.cache().clone(),
            config.cache.sweep_interval,
        );

        info!(
            addr = %addr,
            public_url = %config.public_origin(),
            upstream = %config.upstream,
            project = %config.project.display_name(),
            "Starting proxy"
        );

        let result = axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        sweeper.abort();
        info!("Proxy stopped");

        result.map_err(|e| ProxyError::Server(e.to_string()))
    }

    /// Serve in the background, returning the bound address.
    pub async fn run_with_shutdown(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<SocketAddr> {
        let addr = listener
            .local_addr()
            .map_err(|e| ProxyError::Server(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = self.serve(listener, shutdown).await {
                tracing::error!(error = %e, "Proxy server failed");
            }
        });

        Ok(addr)
    }
}

/// Resolves on Ctrl-C.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
