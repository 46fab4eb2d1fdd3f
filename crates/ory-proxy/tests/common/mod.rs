//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::{TimeDelta, Utc};
use tokio::net::TcpListener;
use tower::ServiceExt;

use ory_client::{IdentityRecord, SessionRecord, SessionResolver};
use ory_proxy::{ProxyOptions, ProxyServer, ProxyState};

pub const IDENTITY_ID: &str = "18aafd3e-b00c-4b19-81c8-351e38705126";
pub const VALID_COOKIE: &str = "ory_session_playground=valid";
pub const REVOKED_COOKIE: &str = "ory_session_playground=revoked";

/// A backend that echoes what it received as JSON.
///
/// A handful of fixed paths return canned responses instead.
pub struct Upstream {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
}

impl Upstream {
    pub async fn start(name: &'static str) -> Result<Self> {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        let app = Router::new()
            .route(
                "/set-cookie",
                get(|| async {
                    Response::builder()
                        .header(
                            "set-cookie",
                            "ory_session_playground=abc; Path=/; Domain=playground.projects.oryapis.com; Secure; HttpOnly; SameSite=None",
                        )
                        .header("set-cookie", "csrf_token=xyz; Path=/; Secure")
                        .body(Body::empty())
                        .unwrap()
                }),
            )
            .route(
                "/logout",
                get(|| async {
                    Response::builder()
                        .header(
                            "set-cookie",
                            "ory_session_playground=; Path=/; Max-Age=0; HttpOnly",
                        )
                        .body(Body::from("bye"))
                        .unwrap()
                }),
            )
            .route(
                "/redirect-root",
                get(|| async {
                    (StatusCode::SEE_OTHER, [("location", "/")]).into_response()
                }),
            )
            .route(
                "/cors",
                get(|| async {
                    (
                        [
                            ("access-control-allow-origin", "*"),
                            ("access-control-allow-credentials", "true"),
                        ],
                        "ok",
                    )
                        .into_response()
                }),
            )
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    "late"
                }),
            )
            .fallback(move |request: Request| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    echo(name, request).await
                }
            });

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self { addr, hits })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn echo(name: &'static str, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, usize::MAX).await.unwrap_or_default();

    axum::Json(serde_json::json!({
        "served_by": name,
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "headers": header_map(&parts.headers),
        "body": String::from_utf8_lossy(&body),
    }))
    .into_response()
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    let mut out: HashMap<String, String> = HashMap::new();
    for (name, value) in headers {
        let value = value.to_str().unwrap_or_default().to_string();
        out.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    out
}

/// Canned session resolver.
#[derive(Debug, Default)]
pub struct FakeResolver {
    pub sessions: Mutex<HashMap<String, SessionRecord>>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeResolver {
    pub fn with_valid_session() -> Self {
        let mut sessions = HashMap::new();
        sessions.insert(VALID_COOKIE.to_string(), session_record());
        Self {
            sessions: Mutex::new(sessions),
            ..Default::default()
        }
    }

    /// The platform forgets the session behind `cookie`.
    pub fn revoke(&self, cookie: &str) {
        self.sessions.lock().unwrap().remove(cookie);
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionResolver for FakeResolver {
    async fn whoami(&self, cookie: &str) -> ory_client::Result<Option<SessionRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ory_client::Error::UnexpectedStatus {
                status: 502,
                url: "http://platform/sessions/whoami".into(),
            });
        }
        let session = self.sessions.lock().unwrap().get(cookie).cloned();
        Ok(session)
    }
}

pub fn session_record() -> SessionRecord {
    let now = Utc::now();
    SessionRecord {
        id: "821f5a53-a0b3-41fa-9c62-764560fa4406".into(),
        active: true,
        expires_at: now + TimeDelta::hours(1),
        authenticated_at: now - TimeDelta::minutes(1),
        issued_at: now - TimeDelta::minutes(1),
        identity: IdentityRecord {
            id: IDENTITY_ID.into(),
            schema_id: "default".into(),
            schema_url: String::new(),
            traits: serde_json::json!({ "email": "foo@bar" }),
        },
    }
}

/// Proxy options pointing at `upstream`, with the platform API at
/// `platform`.
pub fn options(upstream: &str, platform: &str) -> ProxyOptions {
    ProxyOptions::new(upstream).with_api_url(platform)
}

/// A proxy wired to a fake resolver, driven through `oneshot`.
pub struct TestProxy {
    pub server: ProxyServer,
    pub resolver: Arc<FakeResolver>,
}

impl TestProxy {
    pub fn new(options: ProxyOptions, resolver: FakeResolver) -> Result<Self> {
        let resolver = Arc::new(resolver);
        let state = ProxyState::new(options.resolve()?, resolver.clone())?;
        Ok(Self {
            server: ProxyServer::new(state),
            resolver,
        })
    }

    pub fn with_state(state: ProxyState, resolver: Arc<FakeResolver>) -> Self {
        Self {
            server: ProxyServer::new(state),
            resolver,
        }
    }

    pub async fn send(&self, request: Request) -> Response {
        self.server.router().oneshot(request).await.unwrap()
    }
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// An address nothing listens on.
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
