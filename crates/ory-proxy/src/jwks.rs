//! Key discovery endpoint.

use axum::Json;
use axum::http::header::{ALLOW, CACHE_CONTROL};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::keys::SigningKey;

/// Answer a request for the key discovery document.
///
/// The document always holds exactly the current key. Clients must not
/// cache it across proxy restarts, hence `no-cache`.
pub fn jwks_response(method: &Method, key: &SigningKey) -> Response {
    if *method != Method::GET && *method != Method::HEAD {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(ALLOW, HeaderValue::from_static("GET, HEAD"))],
        )
            .into_response();
    }

    let mut response = Json(key.jwk_set()).into_response();
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}
