//! Response rewriting.
//!
//! Everything coming back through the proxy is made to look as if it were
//! served from the public URL: cookies are scoped to the cookie domain,
//! redirects pointing at the proxy root go to the default redirect, and
//! cross-origin headers are set from the allow-list instead of whatever the
//! backend sent. All functions here are pure header transformations.

use axum::body::Body;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ACCESS_CONTROL_REQUEST_HEADERS,
    ACCESS_CONTROL_REQUEST_METHOD, LOCATION, ORIGIN, SET_COOKIE, VARY,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Response, StatusCode};
use url::{Position, Url};

use crate::config::ProxyConfig;

/// Query parameter carrying a post-flow return address.
pub const RETURN_TO_PARAM: &str = "return_to";

/// How long browsers may cache a preflight answer, in seconds.
const PREFLIGHT_MAX_AGE: &str = "600";

/// Rewrite a forwarded response for the caller.
///
/// `origin` is the `Origin` header of the inbound request, if any.
pub fn rewrite<B>(
    response: Response<B>,
    origin: Option<&str>,
    config: &ProxyConfig,
) -> Response<B> {
    let (mut parts, body) = response.into_parts();
    rewrite_set_cookies(&mut parts.headers, config);
    rewrite_location_header(&mut parts.headers, config);
    apply_cors(&mut parts.headers, origin, config);
    Response::from_parts(parts, body)
}

/// Rewrite every `Set-Cookie` header in place.
pub fn rewrite_set_cookies(headers: &mut HeaderMap, config: &ProxyConfig) {
    let cookies: Vec<HeaderValue> = headers.get_all(SET_COOKIE).iter().cloned().collect();
    if cookies.is_empty() {
        return;
    }

    headers.remove(SET_COOKIE);
    for value in cookies {
        let rewritten = value
            .to_str()
            .ok()
            .map(|raw| rewrite_set_cookie(raw, &config.cookie_domain, config.dev))
            .and_then(|raw| HeaderValue::from_str(&raw).ok())
            .unwrap_or(value);
        headers.append(SET_COOKIE, rewritten);
    }
}

/// Rewrite one `Set-Cookie` value.
///
/// The `Domain` attribute is replaced by `domain`. In development mode the
/// `Secure` flag is dropped and `SameSite` is relaxed to `Lax`, so cookies
/// survive plain-HTTP localhost. Name, value and all other attributes are
/// kept as sent.
pub fn rewrite_set_cookie(raw: &str, domain: &str, dev: bool) -> String {
    let mut segments = raw.split(';');
    let pair = segments.next().unwrap_or_default().trim();

    let mut out = vec![pair.to_string()];
    for attr in segments.map(str::trim).filter(|a| !a.is_empty()) {
        let name = attr
            .split_once('=')
            .map_or(attr, |(name, _)| name)
            .trim()
            .to_ascii_lowercase();

        match name.as_str() {
            "domain" => continue,
            "secure" | "samesite" if dev => continue,
            _ => out.push(attr.to_string()),
        }
    }

    out.push(format!("Domain={}", domain));
    if dev {
        out.push("SameSite=Lax".to_string());
    }
    out.join("; ")
}

/// Rewrite the `Location` header in place, if present.
pub fn rewrite_location_header(headers: &mut HeaderMap, config: &ProxyConfig) {
    let Some(location) = headers.get(LOCATION).and_then(|v| v.to_str().ok()) else {
        return;
    };

    if let Some(rewritten) = rewrite_location(location, config)
        && let Ok(value) = HeaderValue::from_str(&rewritten)
    {
        tracing::debug!(to = %rewritten, "Rewrote redirect");
        headers.insert(LOCATION, value);
    }
}

/// Rewrite a redirect target. Returns `None` when it stays as is.
///
/// * Locations on the application origin move to the public origin, and
///   locations on the platform API origin move under the public prefix.
/// * A location that is just the proxy root becomes the default redirect.
/// * A `return_to` parameter that is just the proxy root becomes the default
///   redirect.
pub fn rewrite_location(location: &str, config: &ProxyConfig) -> Option<String> {
    let relative = Url::parse(location).is_err();
    let mut url = config.public_url.join(location).ok()?;
    let mut changed = false;

    if !relative && let Some(moved) = move_to_public(&url, config) {
        url = moved;
        changed = true;
    }

    if is_root(&url, config) {
        return Some(config.default_redirect.to_string());
    }

    let return_to = url
        .query_pairs()
        .find(|(name, _)| name == RETURN_TO_PARAM)
        .map(|(_, value)| value.into_owned());
    if let Some(return_to) = return_to
        && config
            .public_url
            .join(&return_to)
            .is_ok_and(|target| is_root(&target, config))
    {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(name, value)| {
                if name == RETURN_TO_PARAM {
                    (name.into_owned(), config.default_redirect.to_string())
                } else {
                    (name.into_owned(), value.into_owned())
                }
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
        changed = true;
    }

    if !changed {
        return None;
    }

    if relative {
        Some(url[Position::BeforePath..].to_string())
    } else {
        Some(url.to_string())
    }
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

fn move_to_public(url: &Url, config: &ProxyConfig) -> Option<Url> {
    let tail = &url[Position::BeforePath..];

    if same_origin(url, &config.project.api_url) {
        let api_path = config.project.api_url.path().trim_end_matches('/');
        let tail = tail.strip_prefix(api_path).unwrap_or(tail);
        return Url::parse(&format!("{}{}", config.platform_base(), tail)).ok();
    }

    if same_origin(url, &config.upstream) && !same_origin(url, &config.public_url) {
        return Url::parse(&format!("{}{}", config.public_origin(), tail)).ok();
    }

    None
}

fn is_root(url: &Url, config: &ProxyConfig) -> bool {
    url.path() == "/"
        && url.query().is_none()
        && url.fragment().is_none()
        && (same_origin(url, &config.public_url) || same_origin(url, &config.upstream))
}

/// Apply the CORS policy to response headers.
///
/// Backend CORS headers are always discarded. For an allowed origin the
/// origin is echoed with credentials permitted.
pub fn apply_cors(headers: &mut HeaderMap, origin: Option<&str>, config: &ProxyConfig) {
    let backend: Vec<HeaderName> = headers
        .keys()
        .filter(|name| name.as_str().starts_with("access-control-"))
        .cloned()
        .collect();
    for name in backend {
        headers.remove(name);
    }

    let Some(origin) = origin else {
        return;
    };
    headers.append(VARY, HeaderValue::from_static("Origin"));

    if !config.is_allowed_origin(origin) {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
        headers.insert(
            ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }
}

/// Whether a request is a CORS preflight.
pub fn is_preflight(method: &Method, headers: &HeaderMap) -> bool {
    *method == Method::OPTIONS
        && headers.contains_key(ORIGIN)
        && headers.contains_key(ACCESS_CONTROL_REQUEST_METHOD)
}

/// Answer a preflight from an allowed origin.
///
/// Returns `None` for origins not on the allow-list; those preflights are
/// forwarded like any other request.
pub fn preflight_response(headers: &HeaderMap, config: &ProxyConfig) -> Option<Response<Body>> {
    let origin = headers.get(ORIGIN)?;
    if !config.is_allowed_origin(origin.to_str().ok()?) {
        return None;
    }

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;

    let out = response.headers_mut();
    out.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    out.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    if let Some(method) = headers.get(ACCESS_CONTROL_REQUEST_METHOD) {
        out.insert(ACCESS_CONTROL_ALLOW_METHODS, method.clone());
    }
    if let Some(requested) = headers.get(ACCESS_CONTROL_REQUEST_HEADERS) {
        out.insert(ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
    }
    out.insert(
        ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static(PREFLIGHT_MAX_AGE),
    );
    out.insert(
        VARY,
        HeaderValue::from_static(
            "Origin, Access-Control-Request-Method, Access-Control-Request-Headers",
        ),
    );

    Some(response)
}
