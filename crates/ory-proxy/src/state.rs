//! Shared proxy state.

use std::sync::Arc;

use ory_client::{Credentials, SessionResolver};
use ory_session::SessionCache;

use crate::config::ProxyConfig;
use crate::error::Result;
use crate::forward::Forwarder;
use crate::keys::SigningKey;
use crate::session::SessionAuthenticator;

/// State handed to every request.
///
/// Cheap to clone; everything mutable lives behind the session cache's own
/// locks.
#[derive(Debug, Clone)]
pub struct ProxyState {
    /// Resolved configuration.
    pub config: Arc<ProxyConfig>,

    /// Process-lifetime signing key.
    pub key: Arc<SigningKey>,

    /// Cookie to token resolution.
    pub sessions: SessionAuthenticator,

    /// Outbound HTTP client.
    pub forwarder: Forwarder,

    /// Credentials presented to the platform.
    pub credentials: Credentials,
}

impl ProxyState {
    /// Create state with a freshly generated signing key.
    pub fn new(config: ProxyConfig, resolver: Arc<dyn SessionResolver>) -> Result<Self> {
        Self::with_signing_key(config, resolver, SigningKey::generate()?)
    }

    /// Create state with a given signing key.
    pub fn with_signing_key(
        config: ProxyConfig,
        resolver: Arc<dyn SessionResolver>,
        key: SigningKey,
    ) -> Result<Self> {
        let key = Arc::new(key);
        let sessions = SessionAuthenticator::new(
            SessionCache::new(config.cache.clone()),
            resolver,
            Arc::clone(&key),
            config.public_origin(),
            config.lookup_timeout,
        )
        .with_revalidate_after(config.session_revalidate);
        let forwarder = Forwarder::new(config.upstream_timeout)?;

        Ok(Self {
            config: Arc::new(config),
            key,
            sessions,
            forwarder,
            credentials: Credentials::none(),
        })
    }

    /// Use the given platform credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }
}
