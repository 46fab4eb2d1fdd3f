//! Request routing.
//!
//! Every inbound request goes through [`handle`]: it is classified by path,
//! answered locally if it is a key discovery or preflight request, and
//! otherwise enriched with a session token and forwarded. Forwarded
//! responses are rewritten before they reach the client.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{AUTHORIZATION, ORIGIN};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use url::Url;

use crate::config::{LookupFailurePolicy, ProxyConfig};
use crate::error::{ProxyError, Result};
use crate::forward::{
    self, ORY_BASE_URL_REWRITE, ORY_BASE_URL_REWRITE_TOKEN, ORY_NO_CUSTOM_DOMAIN_REDIRECT,
};
use crate::jwks;
use crate::rewrite;
use crate::session;
use crate::state::ProxyState;

/// Where a request is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The proxy's own key discovery document.
    KeyDiscovery,
    /// The platform API, with the path prefix stripped.
    Platform,
    /// The application.
    Application,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::KeyDiscovery => "jwks",
            Route::Platform => "platform",
            Route::Application => "application",
        }
    }
}

/// Classify a request path. First match wins: key discovery, then the
/// platform prefix, then the application.
pub fn classify(path: &str, config: &ProxyConfig) -> Route {
    let prefix = config.path_prefix.as_str();

    if path == config.jwks_path() {
        Route::KeyDiscovery
    } else if path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
    {
        Route::Platform
    } else {
        Route::Application
    }
}

/// Path of a platform route with the prefix removed.
pub fn platform_path<'a>(path: &'a str, prefix: &str) -> &'a str {
    path.strip_prefix(prefix)
        .filter(|rest| !rest.is_empty())
        .unwrap_or("/")
}

/// How a request will be forwarded.
#[derive(Debug, Clone)]
pub struct ForwardDecision {
    pub route: Route,
    pub target: Url,
    pub bearer: Option<Arc<str>>,
}

/// Fallback handler serving every request.
pub async fn handle(State(state): State<ProxyState>, request: Request) -> Response {
    let config = &state.config;

    if rewrite::is_preflight(request.method(), request.headers())
        && let Some(response) = rewrite::preflight_response(request.headers(), config)
    {
        tracing::debug!(path = %request.uri().path(), "Answered CORS preflight");
        return response;
    }

    let origin = request
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match dispatch(&state, request, origin.as_deref()).await {
        Ok(response) => response,
        Err(err) => {
            let mut response = err.into_response();
            rewrite::apply_cors(response.headers_mut(), origin.as_deref(), config);
            response
        }
    }
}

async fn dispatch(
    state: &ProxyState,
    request: Request,
    origin: Option<&str>,
) -> Result<Response> {
    let config = &state.config;
    let route = classify(request.uri().path(), config);

    if route == Route::KeyDiscovery {
        let mut response = jwks::jwks_response(request.method(), &state.key);
        rewrite::apply_cors(response.headers_mut(), origin, config);
        return Ok(response);
    }

    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let (parts, body) = request.into_parts();
    let session_key = session::session_cookies(&parts.headers);

    let decision = decide(state, route, &parts.uri, &parts.headers).await?;

    let mut headers = forward::end_to_end_headers(&parts.headers);
    forward::add_forwarded_headers(
        &mut headers,
        forward::original_host(&parts.headers, &parts.uri).as_ref(),
        config.public_url.scheme(),
        client_ip,
    );
    if decision.route == Route::Platform {
        add_platform_headers(&mut headers, state)?;
    }
    if let Some(token) = &decision.bearer
        && !headers.contains_key(AUTHORIZATION)
    {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| ProxyError::Signing(e.to_string()))?;
        headers.insert(AUTHORIZATION, value);
    }

    tracing::debug!(
        route = decision.route.as_str(),
        target = %decision.target.path(),
        authenticated = decision.bearer.is_some(),
        "Forwarding request"
    );

    let response = state
        .forwarder
        .send(parts.method, decision.target, headers, forward::request_body(body))
        .await?;

    if let Some(key) = &session_key
        && session::clears_session_cookie(response.headers())
    {
        state.sessions.forget(key);
    }

    Ok(rewrite::rewrite(response, origin, config))
}

/// Work out the target and token for a forwarded request.
pub async fn decide(
    state: &ProxyState,
    route: Route,
    uri: &axum::http::Uri,
    headers: &HeaderMap,
) -> Result<ForwardDecision> {
    let config = &state.config;

    let target = match route {
        Route::Platform => forward::target_url(
            &config.project.api_url,
            platform_path(uri.path(), &config.path_prefix),
            uri.query(),
        )?,
        _ => forward::target_url(&config.upstream, uri.path(), uri.query())?,
    };

    let bearer = session_token(state, headers).await?;

    Ok(ForwardDecision {
        route,
        target,
        bearer,
    })
}

async fn session_token(state: &ProxyState, headers: &HeaderMap) -> Result<Option<Arc<str>>> {
    if !state.config.mint_tokens {
        return Ok(None);
    }
    let Some(cookies) = session::session_cookies(headers) else {
        return Ok(None);
    };

    match state.sessions.authenticate(&cookies).await {
        Ok(token) => Ok(token),
        Err(err @ ProxyError::Signing(_)) => {
            tracing::warn!(error = %err, "Could not sign session token, forwarding without token");
            Ok(None)
        }
        Err(err) => match state.config.lookup_failure {
            LookupFailurePolicy::ForwardAnonymous => {
                tracing::warn!(error = %err, "Session lookup failed, forwarding without token");
                Ok(None)
            }
            LookupFailurePolicy::Reject => Err(err),
        },
    }
}

fn add_platform_headers(headers: &mut HeaderMap, state: &ProxyState) -> Result<()> {
    let base = HeaderValue::from_str(&state.config.platform_base())
        .map_err(|e| ProxyError::MalformedRequest(e.to_string()))?;
    headers.insert(ORY_BASE_URL_REWRITE, base);
    headers.insert(ORY_NO_CUSTOM_DOMAIN_REDIRECT, HeaderValue::from_static("true"));

    if let Some(key) = state.credentials.api_key()
        && let Ok(value) = HeaderValue::from_str(key)
    {
        headers.insert(ORY_BASE_URL_REWRITE_TOKEN, value);
    }
    Ok(())
}
