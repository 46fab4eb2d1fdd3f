//! Request forwarding.
//!
//! Bodies are streamed in both directions; nothing is buffered. Dropping
//! the future returned by [`Forwarder::send`] aborts the outbound call,
//! which is what happens when the client disconnects.

use std::net::IpAddr;
use std::time::Duration;

use axum::body::{Body, HttpBody};
use axum::http::header::{CONNECTION, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Response, Uri};
use futures::TryStreamExt;
use url::Url;

use crate::error::{ProxyError, Result};

pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Public base the platform should use when rendering its own URLs.
pub const ORY_BASE_URL_REWRITE: &str = "ory-base-url-rewrite";

/// Credential authorizing the base URL rewrite.
pub const ORY_BASE_URL_REWRITE_TOKEN: &str = "ory-base-url-rewrite-token";

/// Asks the platform not to redirect to a custom domain.
pub const ORY_NO_CUSTOM_DOMAIN_REDIRECT: &str = "ory-no-custom-domain-redirect";

/// Whether a header only applies to a single connection.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-connection"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Copy end-to-end headers.
///
/// Drops hop-by-hop headers, any header the `Connection` header names, and
/// `Host`. Repeated headers keep every value.
pub fn end_to_end_headers(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || *name == HOST || listed.iter().any(|l| l == name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Add `X-Forwarded-*` headers describing the original request.
pub fn add_forwarded_headers(
    headers: &mut HeaderMap,
    host: Option<&HeaderValue>,
    proto: &str,
    client: Option<IpAddr>,
) {
    if let Some(host) = host {
        headers.insert(X_FORWARDED_HOST, host.clone());
    }
    if let Ok(proto) = HeaderValue::from_str(proto) {
        headers.insert(X_FORWARDED_PROTO, proto);
    }
    if let Some(ip) = client {
        let chain = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(prior) if !prior.trim().is_empty() => format!("{}, {}", prior, ip),
            _ => ip.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }
}

/// Host the client addressed: the `Host` header, or the URI authority for
/// HTTP/2 requests.
pub fn original_host(headers: &HeaderMap, uri: &Uri) -> Option<HeaderValue> {
    headers.get(HOST).cloned().or_else(|| {
        uri.authority()
            .and_then(|authority| HeaderValue::from_str(authority.as_str()).ok())
    })
}

/// The inbound body, unless it is known to be empty.
///
/// Decided by the body itself, not by framing headers: HTTP/2 requests and
/// locally built requests may carry data without `Content-Length`.
pub fn request_body(body: Body) -> Option<Body> {
    (!body.is_end_stream()).then_some(body)
}

/// Join a request path and query onto a base URL.
///
/// The base's own path is kept as a prefix.
pub fn target_url(base: &Url, path: &str, query: Option<&str>) -> Result<Url> {
    let root = base.as_str().trim_end_matches('/');
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    let raw = match query {
        Some(q) => format!("{}{}?{}", root, path, q),
        None => format!("{}{}", root, path),
    };
    Url::parse(&raw).map_err(|e| ProxyError::MalformedRequest(format!("{}: {}", raw, e)))
}

/// Streams requests to the application or the platform.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    timeout: Duration,
}

impl Forwarder {
    /// Create a forwarder with a per-call timeout.
    ///
    /// Redirects are never followed; they are handed back to the browser.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ProxyError::Server(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send a request and stream the response back.
    ///
    /// `headers` are sent as given; callers are expected to have filtered
    /// them with [`end_to_end_headers`].
    pub async fn send(
        &self,
        method: Method,
        target: Url,
        headers: HeaderMap,
        body: Option<Body>,
    ) -> Result<Response<Body>> {
        let mut builder = self
            .client
            .request(method, target.clone())
            .headers(headers)
            .timeout(self.timeout);

        if let Some(body) = body {
            let stream = body.into_data_stream().map_err(std::io::Error::other);
            builder = builder.body(reqwest::Body::wrap_stream(stream));
        }

        let upstream = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProxyError::UpstreamTimeout {
                    target: redact(&target),
                }
            } else {
                ProxyError::UpstreamUnreachable {
                    target: redact(&target),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = upstream.status();
        let mut response = Response::builder().status(status);
        if let Some(out) = response.headers_mut() {
            for (name, value) in upstream.headers() {
                if !is_hop_by_hop(name) {
                    out.append(name.clone(), value.clone());
                }
            }
        }

        let stream = upstream.bytes_stream();
        response
            .body(Body::from_stream(stream))
            .map_err(|e| ProxyError::Server(format!("Failed to build response: {}", e)))
    }
}

/// Target without query string, for logs and error messages.
fn redact(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
