//! End-to-end tests: real upstreams, fake identity lookups.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use common::{
    FakeResolver, IDENTITY_ID, REVOKED_COOKIE, TestProxy, Upstream, VALID_COOKIE, body_json,
    dead_address, options,
};
use ory_client::Credentials;
use ory_proxy::{LookupFailurePolicy, ProxyError, ProxyServer, ProxyState, SessionClaims};

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("cookie", cookie)
        .body(Body::empty())
        .unwrap()
}

async fn fetch_jwks(proxy: &TestProxy) -> JwkSet {
    let response = proxy.send(get("/.ory/jwks.json")).await;
    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_value(body_json(response).await).unwrap()
}

fn verify(token: &str, jwks: &JwkSet) -> SessionClaims {
    let header = jsonwebtoken::decode_header(token).unwrap();
    assert_eq!(header.alg, Algorithm::ES256);
    let kid = header.kid.expect("kid");
    let jwk = jwks.find(&kid).expect("token kid is published");

    let key = DecodingKey::from_jwk(jwk).unwrap();
    let mut validation = Validation::new(Algorithm::ES256);
    validation.validate_aud = false;
    jsonwebtoken::decode::<SessionClaims>(token, &key, &validation)
        .unwrap()
        .claims
}

fn bearer(echo: &serde_json::Value) -> Option<String> {
    echo["headers"]["authorization"]
        .as_str()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

#[tokio::test]
async fn test_forwards_request_unchanged() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let proxy = TestProxy::new(
        options(&app.url(), &platform.url()),
        FakeResolver::default(),
    )
    .unwrap();

    let body = r#"{"name":"widget"}"#;
    let request = Request::builder()
        .method("POST")
        .uri("/api/items?page=2&sort=asc")
        .header("host", "localhost:4000")
        .header("content-type", "application/json")
        .header("content-length", body.len().to_string())
        .header("x-request-id", "req-1")
        .header("connection", "keep-alive, x-hop")
        .header("keep-alive", "timeout=5")
        .header("x-hop", "1")
        .header("proxy-authorization", "Basic cHJveHk6c2VjcmV0")
        .header("te", "trailers")
        .body(Body::from(body))
        .unwrap();

    let response = proxy.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let echo = body_json(response).await;
    assert_eq!(echo["served_by"], "app");
    assert_eq!(echo["method"], "POST");
    assert_eq!(echo["path"], "/api/items");
    assert_eq!(echo["query"], "page=2&sort=asc");
    assert_eq!(echo["body"], body);
    assert_eq!(echo["headers"]["content-type"], "application/json");
    assert_eq!(echo["headers"]["x-request-id"], "req-1");
    assert_eq!(echo["headers"]["x-forwarded-host"], "localhost:4000");
    assert_eq!(echo["headers"]["x-forwarded-proto"], "http");
    assert!(echo["headers"].get("authorization").is_none());
    for hop in ["keep-alive", "x-hop", "proxy-authorization", "te"] {
        assert!(
            echo["headers"].get(hop).is_none(),
            "{hop} must not reach the application"
        );
    }
    assert_eq!(platform.hits(), 0);
}

#[tokio::test]
async fn test_body_without_content_length_is_forwarded() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let proxy = TestProxy::new(
        options(&app.url(), &platform.url()),
        FakeResolver::default(),
    )
    .unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/api")
        .body(Body::from("payload"))
        .unwrap();
    assert!(request.headers().get("content-length").is_none());

    let echo = body_json(proxy.send(request).await).await;
    assert_eq!(echo["body"], "payload");
}

#[tokio::test]
async fn test_large_streamed_body_is_forwarded() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let proxy = TestProxy::new(
        options(&app.url(), &platform.url()),
        FakeResolver::default(),
    )
    .unwrap();

    let chunk = "a".repeat(16 * 1024);
    let chunks: Vec<Result<String, std::io::Error>> =
        (0..64).map(|_| Ok(chunk.clone())).collect();
    let request = Request::builder()
        .method("PUT")
        .uri("/upload")
        .body(Body::from_stream(futures::stream::iter(chunks)))
        .unwrap();

    let echo = body_json(proxy.send(request).await).await;
    assert_eq!(echo["method"], "PUT");
    assert_eq!(echo["body"].as_str().unwrap().len(), 64 * 16 * 1024);
}

#[tokio::test]
async fn test_inbound_authorization_is_kept() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let proxy = TestProxy::new(
        options(&app.url(), &platform.url()),
        FakeResolver::with_valid_session(),
    )
    .unwrap();

    let request = Request::builder()
        .uri("/api/me")
        .header("cookie", VALID_COOKIE)
        .header("authorization", "Bearer app-issued")
        .body(Body::empty())
        .unwrap();

    let echo = body_json(proxy.send(request).await).await;
    assert_eq!(echo["headers"]["authorization"], "Bearer app-issued");
}

#[tokio::test]
async fn test_session_cookie_yields_verifiable_token() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let proxy = TestProxy::new(
        options(&app.url(), &platform.url()),
        FakeResolver::with_valid_session(),
    )
    .unwrap();

    let response = proxy
        .send(get_with_cookie("/dashboard", &format!("theme=dark; {}", VALID_COOKIE)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let echo = body_json(response).await;
    let token = bearer(&echo).expect("bearer token attached");

    // The browser cookie still reaches the application untouched
    assert!(echo["headers"]["cookie"].as_str().unwrap().contains("theme=dark"));

    let claims = verify(&token, &fetch_jwks(&proxy).await);
    assert_eq!(claims.sub, IDENTITY_ID);
    assert_eq!(claims.session.schema_id, "default");
    assert_eq!(claims.session.traits["email"], "foo@bar");
    assert_eq!(claims.iss, "http://localhost:4000");
}

#[tokio::test]
async fn test_no_cookie_no_token() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let proxy = TestProxy::new(
        options(&app.url(), &platform.url()),
        FakeResolver::with_valid_session(),
    )
    .unwrap();

    let echo = body_json(proxy.send(get("/")).await).await;

    assert!(bearer(&echo).is_none());
    assert_eq!(proxy.resolver.calls(), 0);
}

#[tokio::test]
async fn test_revoked_session_forwards_anonymously() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let proxy = TestProxy::new(
        options(&app.url(), &platform.url()),
        FakeResolver::with_valid_session(),
    )
    .unwrap();

    for _ in 0..3 {
        let response = proxy.send(get_with_cookie("/", REVOKED_COOKIE)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(bearer(&body_json(response).await).is_none());
    }

    // The negative answer is cached
    assert_eq!(proxy.resolver.calls(), 1);
}

#[tokio::test]
async fn test_repeated_requests_reuse_cached_session() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let proxy = TestProxy::new(
        options(&app.url(), &platform.url()),
        FakeResolver::with_valid_session(),
    )
    .unwrap();

    let first = bearer(&body_json(proxy.send(get_with_cookie("/a", VALID_COOKIE)).await).await);
    let second = bearer(&body_json(proxy.send(get_with_cookie("/b", VALID_COOKIE)).await).await);

    assert!(first.is_some());
    assert_eq!(first, second);
    assert_eq!(proxy.resolver.calls(), 1);
}

#[tokio::test]
async fn test_without_jwt_skips_lookup() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let mut opts = options(&app.url(), &platform.url());
    opts.mint_tokens = false;
    let proxy = TestProxy::new(opts, FakeResolver::with_valid_session()).unwrap();

    let echo = body_json(proxy.send(get_with_cookie("/", VALID_COOKIE)).await).await;

    assert!(bearer(&echo).is_none());
    assert_eq!(proxy.resolver.calls(), 0);
}

#[tokio::test]
async fn test_lookup_failure_forwards_by_default() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let proxy = TestProxy::new(
        options(&app.url(), &platform.url()),
        FakeResolver::failing(),
    )
    .unwrap();

    let response = proxy.send(get_with_cookie("/", VALID_COOKIE)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(bearer(&body_json(response).await).is_none());
    assert_eq!(app.hits(), 1);
}

#[tokio::test]
async fn test_lookup_failure_can_reject() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let mut opts = options(&app.url(), &platform.url());
    opts.lookup_failure = LookupFailurePolicy::Reject;
    let proxy = TestProxy::new(opts, FakeResolver::failing()).unwrap();

    let response = proxy.send(get_with_cookie("/", VALID_COOKIE)).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "identity_lookup_failed");
    assert_eq!(app.hits(), 0);
}

#[tokio::test]
async fn test_platform_route_strips_prefix() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let proxy = TestProxy::new(
        options(&app.url(), &platform.url()),
        FakeResolver::default(),
    )
    .unwrap();

    let response = proxy
        .send(get("/.ory/self-service/login/browser?return_to=%2Fsettings"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let echo = body_json(response).await;
    assert_eq!(echo["served_by"], "platform");
    assert_eq!(echo["path"], "/self-service/login/browser");
    assert_eq!(echo["query"], "return_to=%2Fsettings");
    assert_eq!(
        echo["headers"]["ory-base-url-rewrite"],
        "http://localhost:4000/.ory"
    );
    assert_eq!(echo["headers"]["ory-no-custom-domain-redirect"], "true");
    assert!(echo["headers"].get("ory-base-url-rewrite-token").is_none());
    assert_eq!(app.hits(), 0);
}

#[tokio::test]
async fn test_platform_route_carries_api_key() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let resolver = Arc::new(FakeResolver::default());
    let config = options(&app.url(), &platform.url()).resolve().unwrap();
    let state = ProxyState::new(config, resolver.clone())
        .unwrap()
        .with_credentials(Credentials::with_api_key("ory_pat_secret"));
    let proxy = TestProxy::with_state(state, resolver);

    let echo = body_json(proxy.send(get("/.ory/sessions/whoami")).await).await;

    assert_eq!(echo["headers"]["ory-base-url-rewrite-token"], "ory_pat_secret");
}

#[tokio::test]
async fn test_custom_prefix() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let mut opts = options(&app.url(), &platform.url());
    opts.path_prefix = "/auth".into();
    let proxy = TestProxy::new(opts, FakeResolver::default()).unwrap();

    let platform_echo = body_json(proxy.send(get("/auth/ui/login")).await).await;
    assert_eq!(platform_echo["served_by"], "platform");
    assert_eq!(platform_echo["path"], "/ui/login");

    let app_echo = body_json(proxy.send(get("/.ory/ui/login")).await).await;
    assert_eq!(app_echo["served_by"], "app");

    assert_eq!(
        proxy.send(get("/auth/jwks.json")).await.status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_set_cookie_is_rewritten_in_dev_mode() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let mut opts = options(&app.url(), &platform.url());
    opts.dev = true;
    let proxy = TestProxy::new(opts, FakeResolver::default()).unwrap();

    let response = proxy.send(get("/set-cookie")).await;
    let cookies: Vec<&str> = response
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();

    assert_eq!(
        cookies,
        vec![
            "ory_session_playground=abc; Path=/; HttpOnly; Domain=localhost; SameSite=Lax",
            "csrf_token=xyz; Path=/; Domain=localhost; SameSite=Lax",
        ]
    );
}

#[tokio::test]
async fn test_set_cookie_keeps_secure_outside_dev_mode() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let mut opts = options(&app.url(), &platform.url());
    opts.cookie_domain = Some("example.com".into());
    let proxy = TestProxy::new(opts, FakeResolver::default()).unwrap();

    let response = proxy.send(get("/set-cookie")).await;
    let first = response.headers().get("set-cookie").unwrap().to_str().unwrap();

    assert_eq!(
        first,
        "ory_session_playground=abc; Path=/; Secure; HttpOnly; SameSite=None; Domain=example.com"
    );
}

#[tokio::test]
async fn test_root_redirect_goes_to_default() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let mut opts = options(&app.url(), &platform.url());
    opts.default_redirect = Some("/welcome".into());
    let proxy = TestProxy::new(opts, FakeResolver::default()).unwrap();

    let response = proxy.send(get("/redirect-root")).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get("location").unwrap(),
        "http://localhost:4000/welcome"
    );
}

#[tokio::test]
async fn test_cors_for_allowed_origin() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let mut opts = options(&app.url(), &platform.url());
    opts.cors_origins = vec!["https://app.example.com".into()];
    let proxy = TestProxy::new(opts, FakeResolver::default()).unwrap();

    let allowed = proxy
        .send(
            Request::builder()
                .uri("/cors")
                .header("origin", "https://app.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(
        allowed.headers().get("access-control-allow-origin").unwrap(),
        "https://app.example.com"
    );
    assert_eq!(
        allowed
            .headers()
            .get("access-control-allow-credentials")
            .unwrap(),
        "true"
    );

    let denied = proxy
        .send(
            Request::builder()
                .uri("/cors")
                .header("origin", "https://evil.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(denied.status(), StatusCode::OK);
    assert!(denied.headers().get("access-control-allow-origin").is_none());
    assert!(
        denied
            .headers()
            .get("access-control-allow-credentials")
            .is_none()
    );
}

#[tokio::test]
async fn test_revoked_session_loses_token_after_revalidation() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let mut opts = options(&app.url(), &platform.url());
    opts.session_revalidate = Duration::from_millis(50);
    let proxy = TestProxy::new(opts, FakeResolver::with_valid_session()).unwrap();

    let first = body_json(proxy.send(get_with_cookie("/", VALID_COOKIE)).await).await;
    assert!(bearer(&first).is_some());

    proxy.resolver.revoke(VALID_COOKIE);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = body_json(proxy.send(get_with_cookie("/", VALID_COOKIE)).await).await;
    assert!(bearer(&second).is_none());
    assert_eq!(proxy.resolver.calls(), 2);
}

#[tokio::test]
async fn test_logout_drops_cached_session() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let proxy = TestProxy::new(
        options(&app.url(), &platform.url()),
        FakeResolver::with_valid_session(),
    )
    .unwrap();

    let before = body_json(proxy.send(get_with_cookie("/", VALID_COOKIE)).await).await;
    assert!(bearer(&before).is_some());

    let logout = proxy.send(get_with_cookie("/.ory/logout", VALID_COOKIE)).await;
    assert_eq!(logout.status(), StatusCode::OK);
    assert_eq!(proxy.resolver.calls(), 1);

    proxy.resolver.revoke(VALID_COOKIE);
    let after = body_json(proxy.send(get_with_cookie("/", VALID_COOKIE)).await).await;
    assert!(bearer(&after).is_none());
    assert_eq!(proxy.resolver.calls(), 2);
}

#[tokio::test]
async fn test_preflight_answered_locally() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let mut opts = options(&app.url(), &platform.url());
    opts.cors_origins = vec!["https://app.example.com".into()];
    let proxy = TestProxy::new(opts, FakeResolver::default()).unwrap();

    let response = proxy
        .send(
            Request::builder()
                .method("OPTIONS")
                .uri("/.ory/self-service/login")
                .header("origin", "https://app.example.com")
                .header("access-control-request-method", "POST")
                .header("access-control-request-headers", "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-methods")
            .unwrap(),
        "POST"
    );
    assert_eq!(platform.hits(), 0);
}

#[tokio::test]
async fn test_jwks_is_stable_for_process() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let proxy = TestProxy::new(
        options(&app.url(), &platform.url()),
        FakeResolver::default(),
    )
    .unwrap();
    let other = TestProxy::new(
        options(&app.url(), &platform.url()),
        FakeResolver::default(),
    )
    .unwrap();

    let first = fetch_jwks(&proxy).await;
    let second = fetch_jwks(&proxy).await;
    let restarted = fetch_jwks(&other).await;

    assert_eq!(first.keys.len(), 1);
    assert_eq!(first.keys[0].common.key_id, second.keys[0].common.key_id);
    assert_ne!(first.keys[0].common.key_id, restarted.keys[0].common.key_id);
    assert_eq!(app.hits() + platform.hits(), 0);
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let platform = Upstream::start("platform").await.unwrap();
    let dead = format!("http://{}", dead_address().await);
    let proxy = TestProxy::new(options(&dead, &platform.url()), FakeResolver::default()).unwrap();

    let response = proxy.send(get("/")).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["code"], "upstream_unreachable");
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let mut opts = options(&app.url(), &platform.url());
    opts.upstream_timeout = Duration::from_millis(200);
    let proxy = TestProxy::new(opts, FakeResolver::default()).unwrap();

    let response = proxy.send(get("/slow")).await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_serves_over_tcp_with_graceful_shutdown() {
    let app = Upstream::start("app").await.unwrap();
    let platform = Upstream::start("platform").await.unwrap();
    let resolver = Arc::new(FakeResolver::with_valid_session());
    let config = options(&app.url(), &platform.url()).resolve().unwrap();
    let server = ProxyServer::new(ProxyState::new(config, resolver).unwrap());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let addr = server
        .run_with_shutdown(listener, async {
            rx.await.ok();
        })
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let echo: serde_json::Value = client
        .get(format!("http://{}/hello", addr))
        .header("cookie", VALID_COOKIE)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(echo["path"], "/hello");
    assert_eq!(echo["headers"]["x-forwarded-for"], "127.0.0.1");
    assert!(bearer(&echo).is_some());

    tx.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(
        reqwest::Client::new()
            .get(format!("http://{}/hello", addr))
            .timeout(Duration::from_millis(500))
            .send()
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let taken = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let mut opts = options("http://localhost:3000", "http://127.0.0.1:4433");
    opts.port = port;
    let proxy = TestProxy::new(opts, FakeResolver::default()).unwrap();

    let err = proxy.server.bind().await.unwrap_err();
    assert!(matches!(err, ProxyError::Bind { .. }));
}
