//! Frontend API client used to resolve browser sessions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, COOKIE, HeaderValue};
use url::Url;

use crate::error::{Error, Result};
use crate::project::ProjectRef;
use crate::types::SessionRecord;

/// Default timeout for session lookups.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Path of the session introspection endpoint.
const WHOAMI_PATH: &str = "sessions/whoami";

/// Exchanges a session cookie for a session record.
///
/// `Ok(None)` means the platform positively answered that there is no
/// (active) session for this cookie. `Err` means the answer is unknown,
/// e.g. the platform was unreachable or timed out.
#[async_trait]
pub trait SessionResolver: Send + Sync + std::fmt::Debug {
    /// Resolve the session behind a `Cookie` header value.
    async fn whoami(&self, cookie: &str) -> Result<Option<SessionRecord>>;
}

/// Ory frontend API client.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use ory_client::FrontendClient;
///
/// # fn example() -> ory_client::Result<()> {
/// let client = FrontendClient::builder()
///     .base_url("http://127.0.0.1:4433")
///     .timeout(Duration::from_secs(2))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FrontendClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    whoami_url: Url,
    timeout: Duration,
}

impl FrontendClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The resolved whoami endpoint.
    pub fn whoami_url(&self) -> &Url {
        &self.inner.whoami_url
    }
}

impl std::fmt::Debug for FrontendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontendClient")
            .field("whoami_url", &self.inner.whoami_url.as_str())
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

#[async_trait]
impl SessionResolver for FrontendClient {
    async fn whoami(&self, cookie: &str) -> Result<Option<SessionRecord>> {
        let inner = &self.inner;
        let cookie = HeaderValue::from_str(cookie)
            .map_err(|e| Error::InvalidCookie(e.to_string()))?;

        let response = inner
            .http
            .get(inner.whoami_url.clone())
            .header(COOKIE, cookie)
            .header(ACCEPT, "application/json")
            .timeout(inner.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(inner.whoami_url.to_string())
                } else {
                    Error::Http(e)
                }
            })?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let body = response.bytes().await.map_err(|e| {
                    if e.is_timeout() {
                        Error::Timeout(inner.whoami_url.to_string())
                    } else {
                        Error::Http(e)
                    }
                })?;
                let session: SessionRecord = serde_json::from_slice(&body)
                    .map_err(|e| Error::InvalidResponse(e.to_string()))?;

                if !session.active {
                    tracing::debug!(session_id = %session.id, "Platform returned an inactive session");
                    return Ok(None);
                }

                tracing::debug!(
                    session_id = %session.id,
                    identity_id = %session.identity.id,
                    "Session resolved"
                );
                Ok(Some(session))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::debug!(status = status.as_u16(), "No session for cookie");
                Ok(None)
            }
            _ => Err(Error::UnexpectedStatus {
                status: status.as_u16(),
                url: inner.whoami_url.to_string(),
            }),
        }
    }
}

/// Builder for creating a [`FrontendClient`].
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: Option<String>,
    timeout: Duration,
    user_agent: Option<String>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
        }
    }

    /// Point the client at a project.
    pub fn project(mut self, project: &ProjectRef) -> Self {
        self.base_url = Some(project.api_url.to_string());
        self
    }

    /// Set the API base URL directly.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the per-lookup timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<FrontendClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::InvalidProject("no API base URL configured".to_string()))?;
        let project = ProjectRef::from_api_url(&base_url)?;
        let whoami_url = project.endpoint(WHOAMI_PATH)?;

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("ory-cli/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(FrontendClient {
            inner: Arc::new(ClientInner {
                http,
                whoami_url,
                timeout: self.timeout,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
