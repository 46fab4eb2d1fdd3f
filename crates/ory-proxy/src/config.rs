//! Startup configuration.
//!
//! [`ProxyOptions`] is the raw, user-facing input (flags, environment,
//! defaults file). [`ProxyOptions::resolve`] validates it once and produces
//! the immutable [`ProxyConfig`] every request reads from.

use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use ory_client::ProjectRef;
use ory_session::CacheConfig;
use url::Url;

use crate::error::ConfigError;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 4000;

/// Default path prefix for platform API routes.
pub const DEFAULT_PATH_PREFIX: &str = "/.ory";

/// Path of the key discovery document, relative to the prefix.
pub const JWKS_PATH: &str = "/jwks.json";

/// Default timeout for forwarded calls.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for identity lookups.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a resolved session is trusted before it is looked up again.
pub const DEFAULT_SESSION_REVALIDATE: Duration = Duration::from_secs(60);

/// What to do when a session lookup fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupFailurePolicy {
    /// Forward the request without a token and log a warning.
    #[default]
    ForwardAnonymous,
    /// Answer 503 instead of forwarding.
    Reject,
}

impl LookupFailurePolicy {
    /// Short name used on the command line and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupFailurePolicy::ForwardAnonymous => "forward",
            LookupFailurePolicy::Reject => "reject",
        }
    }
}

impl FromStr for LookupFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forward" | "forward-anonymous" => Ok(LookupFailurePolicy::ForwardAnonymous),
            "reject" => Ok(LookupFailurePolicy::Reject),
            other => Err(format!("unknown lookup failure policy '{}'", other)),
        }
    }
}

impl std::fmt::Display for LookupFailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw proxy inputs before validation.
#[derive(Debug, Clone)]
pub struct ProxyOptions {
    /// Application URL to forward non-platform traffic to.
    pub upstream: String,
    /// Public URL the proxy is reachable at. Defaults to
    /// `http://localhost:<port>`.
    pub publish_url: Option<String>,
    /// Listen port.
    pub port: u16,
    /// Path prefix for platform API routes.
    pub path_prefix: String,
    /// Cookie domain. Defaults to the public URL's host.
    pub cookie_domain: Option<String>,
    /// Origins allowed to make credentialed cross-origin calls.
    pub cors_origins: Vec<String>,
    /// Where to send users whose redirect has no meaningful target.
    pub default_redirect: Option<String>,
    /// Development mode (relaxed cookie security).
    pub dev: bool,
    /// Project slug.
    pub project: Option<String>,
    /// Explicit platform API URL. Takes precedence over `project`.
    pub api_url: Option<String>,
    /// Lookup failure handling.
    pub lookup_failure: LookupFailurePolicy,
    /// Whether to attach signed tokens to forwarded requests.
    pub mint_tokens: bool,
    /// Timeout for forwarded calls.
    pub upstream_timeout: Duration,
    /// Timeout for identity lookups.
    pub lookup_timeout: Duration,
    /// Maximum age of a cached active session.
    pub session_revalidate: Duration,
    /// Session cache sizing.
    pub cache: CacheConfig,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            upstream: String::new(),
            publish_url: None,
            port: DEFAULT_PORT,
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
            cookie_domain: None,
            cors_origins: Vec::new(),
            default_redirect: None,
            dev: false,
            project: None,
            api_url: None,
            lookup_failure: LookupFailurePolicy::default(),
            mint_tokens: true,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            session_revalidate: DEFAULT_SESSION_REVALIDATE,
            cache: CacheConfig::default(),
        }
    }
}

impl ProxyOptions {
    /// Create options for an application URL with defaults for everything
    /// else.
    pub fn new(upstream: impl Into<String>) -> Self {
        Self {
            upstream: upstream.into(),
            ..Default::default()
        }
    }

    /// Set the public URL.
    pub fn with_publish_url(mut self, url: impl Into<String>) -> Self {
        self.publish_url = Some(url.into());
        self
    }

    /// Set the project slug.
    pub fn with_project(mut self, slug: impl Into<String>) -> Self {
        self.project = Some(slug.into());
        self
    }

    /// Set the platform API URL directly.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    /// Validate and resolve into a [`ProxyConfig`].
    pub fn resolve(self) -> Result<ProxyConfig, ConfigError> {
        let upstream = parse_http_url("application URL", &self.upstream)?;
        if upstream.query().is_some() || upstream.fragment().is_some() {
            return Err(ConfigError::InvalidUrl {
                field: "application URL",
                value: self.upstream.clone(),
                reason: "must not contain a query or fragment".to_string(),
            });
        }

        let public_url = match self.publish_url.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                let url = parse_http_url("publish URL", raw)?;
                if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
                    return Err(ConfigError::PublishUrlHasPath(raw.to_string()));
                }
                url
            }
            _ => parse_http_url("publish URL", &format!("http://localhost:{}", self.port))?,
        };

        let path_prefix = normalize_prefix(&self.path_prefix)?;

        let default_redirect = match self.default_redirect.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                public_url
                    .join(raw)
                    .map_err(|e| ConfigError::InvalidUrl {
                        field: "default redirect URL",
                        value: raw.to_string(),
                        reason: e.to_string(),
                    })?
            }
            _ => public_url.clone(),
        };

        let cookie_domain = match self.cookie_domain.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => validate_cookie_domain(raw)?,
            _ => public_url
                .host_str()
                .map(str::to_string)
                .ok_or_else(|| ConfigError::InvalidCookieDomain(public_url.to_string()))?,
        };

        let cors_origins = self
            .cors_origins
            .iter()
            .map(|raw| normalize_origin(raw))
            .collect::<Result<Vec<_>, _>>()?;

        let project = match (self.api_url.as_deref(), self.project.as_deref()) {
            (Some(url), _) if !url.trim().is_empty() => ProjectRef::from_api_url(url.trim())?,
            (_, Some(slug)) if !slug.trim().is_empty() => ProjectRef::from_slug(slug.trim())?,
            _ => return Err(ConfigError::MissingProject),
        };

        Ok(ProxyConfig {
            upstream,
            public_url,
            port: self.port,
            path_prefix,
            cookie_domain,
            cors_origins,
            default_redirect,
            dev: self.dev,
            project,
            lookup_failure: self.lookup_failure,
            mint_tokens: self.mint_tokens,
            upstream_timeout: self.upstream_timeout,
            lookup_timeout: self.lookup_timeout,
            session_revalidate: self.session_revalidate,
            cache: self.cache,
        })
    }
}

/// Validated, immutable proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Application base URL.
    pub upstream: Url,
    /// Public URL (origin only).
    pub public_url: Url,
    /// Listen port.
    pub port: u16,
    /// Platform route prefix, leading slash, no trailing slash.
    pub path_prefix: String,
    /// Domain attribute stamped onto every forwarded cookie.
    pub cookie_domain: String,
    /// Allowed cross-origin callers, as serialized origins.
    pub cors_origins: Vec<String>,
    /// Absolute default redirect target.
    pub default_redirect: Url,
    /// Development mode.
    pub dev: bool,
    /// Platform project.
    pub project: ProjectRef,
    /// Lookup failure handling.
    pub lookup_failure: LookupFailurePolicy,
    /// Whether forwarded requests get signed tokens.
    pub mint_tokens: bool,
    /// Timeout for forwarded calls.
    pub upstream_timeout: Duration,
    /// Timeout for identity lookups.
    pub lookup_timeout: Duration,
    /// Maximum age of a cached active session.
    pub session_revalidate: Duration,
    /// Session cache sizing.
    pub cache: CacheConfig,
}

impl ProxyConfig {
    /// Address to listen on.
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }

    /// Serialized public origin, without trailing slash.
    pub fn public_origin(&self) -> String {
        self.public_url.origin().ascii_serialization()
    }

    /// Public location of the platform API: public origin plus prefix.
    pub fn platform_base(&self) -> String {
        format!("{}{}", self.public_origin(), self.path_prefix)
    }

    /// Full path of the key discovery document.
    pub fn jwks_path(&self) -> String {
        format!("{}{}", self.path_prefix, JWKS_PATH)
    }

    /// Public URL of the key discovery document.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.public_origin(), self.jwks_path())
    }

    /// Whether `origin` is on the CORS allow-list. Matching is exact.
    pub fn is_allowed_origin(&self, origin: &str) -> bool {
        self.cors_origins.iter().any(|allowed| allowed == origin)
    }
}

fn parse_http_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        field,
        value: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

fn normalize_prefix(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if !trimmed.starts_with('/') {
        return Err(ConfigError::InvalidPathPrefix(raw.to_string()));
    }

    let prefix = trimmed.trim_end_matches('/');
    if prefix.is_empty() || prefix.contains(['?', '#']) {
        return Err(ConfigError::InvalidPathPrefix(raw.to_string()));
    }
    Ok(prefix.to_string())
}

fn normalize_origin(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = Url::parse(trimmed).map_err(|_| ConfigError::InvalidCorsOrigin(raw.to_string()))?;
    if url.host_str().is_none() || url.path() != "/" || url.query().is_some() {
        return Err(ConfigError::InvalidCorsOrigin(raw.to_string()));
    }
    Ok(url.origin().ascii_serialization())
}

fn validate_cookie_domain(raw: &str) -> Result<String, ConfigError> {
    let valid = raw
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'));
    if !valid || raw.trim_matches('.').is_empty() {
        return Err(ConfigError::InvalidCookieDomain(raw.to_string()));
    }
    Ok(raw.to_string())
}
