//! Session resolution for forwarded requests.
//!
//! A request's session cookies are looked up in the [`SessionCache`] first
//! and only on a miss resolved against the platform. Both outcomes are
//! cached: an active session until it expires or the revalidation interval
//! passes, whichever comes first, a definitive "no session" until the
//! cookie changes or the entry is evicted. Failed lookups are never cached.
//! A platform response that clears a session cookie drops the entry.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use axum::http::header::{COOKIE, SET_COOKIE};
use chrono::{DateTime, TimeDelta, Utc};
use ory_client::{SessionRecord, SessionResolver};
use ory_session::SessionCache;

use crate::config::DEFAULT_SESSION_REVALIDATE;
use crate::error::{ProxyError, Result};
use crate::keys::SigningKey;
use crate::token;

/// Name prefix of project session cookies.
pub const SESSION_COOKIE_PREFIX: &str = "ory_session_";

/// Name of the self-hosted session cookie.
pub const KRATOS_SESSION_COOKIE: &str = "ory_kratos_session";

/// Cached outcome of a session lookup.
#[derive(Debug, Clone)]
pub enum CachedSession {
    /// An active session and the token minted for it.
    Active {
        session: Arc<SessionRecord>,
        token: Arc<str>,
    },
    /// The platform said there is no session for this cookie.
    NoSession,
}

/// Whether a cookie name identifies a session cookie.
pub fn is_session_cookie(name: &str) -> bool {
    name.starts_with(SESSION_COOKIE_PREFIX) || name == KRATOS_SESSION_COOKIE
}

/// Extract the session cookies from a request.
///
/// Returns the matching `name=value` pairs joined as a `Cookie` header
/// value, in name order, or `None` when the request carries no session
/// cookie. The result doubles as the cache key.
pub fn session_cookies(headers: &HeaderMap) -> Option<String> {
    let mut pairs: Vec<(&str, &str)> = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .map(|(name, value)| (name.trim(), value.trim()))
        .filter(|(name, value)| is_session_cookie(name) && !value.is_empty())
        .collect();

    if pairs.is_empty() {
        return None;
    }

    pairs.sort_unstable();
    pairs.dedup();

    Some(
        pairs
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// Whether a response deletes one of the session cookies, as a logout does.
///
/// A cookie counts as deleted when its value is empty, its `Max-Age` is
/// zero or negative, or its `Expires` lies in the past.
pub fn clears_session_cookie(headers: &HeaderMap) -> bool {
    let now = Utc::now();
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|raw| {
            let mut parts = raw.split(';');
            let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
                return false;
            };
            if !is_session_cookie(name.trim()) {
                return false;
            }
            if value.trim().is_empty() {
                return true;
            }
            parts.filter_map(|attr| attr.split_once('=')).any(|(key, val)| {
                let val = val.trim();
                match key.trim().to_ascii_lowercase().as_str() {
                    "max-age" => val.parse::<i64>().is_ok_and(|age| age <= 0),
                    "expires" => DateTime::parse_from_rfc2822(val)
                        .is_ok_and(|at| at.with_timezone(&Utc) <= now),
                    _ => false,
                }
            })
        })
}

/// Resolves session cookies to bearer tokens.
#[derive(Debug, Clone)]
pub struct SessionAuthenticator {
    cache: SessionCache<CachedSession>,
    resolver: Arc<dyn SessionResolver>,
    key: Arc<SigningKey>,
    issuer: String,
    lookup_timeout: Duration,
    revalidate_after: Duration,
}

impl SessionAuthenticator {
    /// Create an authenticator.
    pub fn new(
        cache: SessionCache<CachedSession>,
        resolver: Arc<dyn SessionResolver>,
        key: Arc<SigningKey>,
        issuer: impl Into<String>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            resolver,
            key,
            issuer: issuer.into(),
            lookup_timeout,
            revalidate_after: DEFAULT_SESSION_REVALIDATE,
        }
    }

    /// Look an active session up again after `interval`, even if it has
    /// not expired.
    pub fn with_revalidate_after(mut self, interval: Duration) -> Self {
        self.revalidate_after = interval;
        self
    }

    /// The backing cache.
    pub fn cache(&self) -> &SessionCache<CachedSession> {
        &self.cache
    }

    /// Drop whatever is cached for `cookies`.
    pub fn forget(&self, cookies: &str) -> bool {
        let removed = self.cache.invalidate(cookies);
        if removed {
            tracing::debug!("Session cookie cleared, dropped cached session");
        }
        removed
    }

    /// Resolve a token for the given session cookies.
    ///
    /// `Ok(None)` means the cookie belongs to no active session. `Err` means
    /// the lookup failed and nothing is known about the cookie.
    pub async fn authenticate(&self, cookies: &str) -> Result<Option<Arc<str>>> {
        if let Some(cached) = self.cache.lookup(cookies) {
            return Ok(match cached {
                CachedSession::Active { token, .. } => Some(token),
                CachedSession::NoSession => None,
            });
        }

        let resolved = tokio::time::timeout(self.lookup_timeout, self.resolver.whoami(cookies))
            .await
            .map_err(|_| ProxyError::IdentityLookup("session lookup timed out".to_string()))?
            .map_err(|e| ProxyError::IdentityLookup(e.to_string()))?;

        match resolved {
            Some(session) if session.is_usable_at(Utc::now()) => {
                let token: Arc<str> = token::mint(&self.key, &session, &self.issuer)?.into();
                let refresh_at = self.refresh_at(session.expires_at);
                self.cache.insert(
                    cookies,
                    CachedSession::Active {
                        session: Arc::new(session),
                        token: Arc::clone(&token),
                    },
                    Some(refresh_at),
                );
                Ok(Some(token))
            }
            Some(session) => {
                tracing::debug!(session_id = %session.id, "Session already expired");
                self.cache.insert(cookies, CachedSession::NoSession, None);
                Ok(None)
            }
            None => {
                self.cache.insert(cookies, CachedSession::NoSession, None);
                Ok(None)
            }
        }
    }

    fn refresh_at(&self, expires_at: DateTime<Utc>) -> DateTime<Utc> {
        TimeDelta::from_std(self.revalidate_after)
            .ok()
            .and_then(|interval| Utc::now().checked_add_signed(interval))
            .map_or(expires_at, |at| at.min(expires_at))
    }
}
