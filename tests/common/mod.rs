//! Shared harness: the full router over a `MemoryStore`, with every upstream
//! (Supabase Auth, Fortnox, Graph, the X token endpoint) pointed at one wiremock server.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use solvify::config::Config;
use solvify::notification::email::MemoryMailer;
use solvify::store::memory::MemoryStore;
use solvify::AppState;

pub const CRON_SECRET: &str = "cron-secret";
pub const SERVICE_SECRET: &str = "service-secret";
pub const FACEBOOK_APP_SECRET: &str = "fb-secret";

pub struct TestApp {
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<MemoryMailer>,
    pub upstream: MockServer,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let upstream = MockServer::start().await;
        let base = upstream.uri();
        let mut config = Config {
            supabase_url: base.clone(),
            supabase_service_role_key: Some("service-role".into()),
            cron_secret: Some(CRON_SECRET.into()),
            service_secret: Some(SERVICE_SECRET.into()),
            oauth_state_secret: Some("state-secret".into()),
            fortnox_client_id: Some("fortnox-id".into()),
            fortnox_client_secret: Some("fortnox-secret".into()),
            fortnox_api_url: format!("{base}/3"),
            fortnox_token_url: format!("{base}/oauth-v1/token"),
            graph_api_url: format!("{base}/graph"),
            twitter_client_id: Some("x-client".into()),
            twitter_client_secret: Some("x-secret".into()),
            twitter_token_url: format!("{base}/2/oauth2/token"),
            facebook_app_secret: Some(FACEBOOK_APP_SECRET.into()),
            ..Config::default()
        };
        customize(&mut config);

        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(MemoryMailer::new());
        let state = AppState::new(config, store.clone(), mailer.clone()).expect("state");

        Self {
            state: Arc::new(state),
            store,
            mailer,
            upstream,
        }
    }

    /// Registers a Supabase bearer token for `user_id` and returns it.
    pub async fn login(&self, user_id: Uuid) -> String {
        let token = format!("tok-{user_id}");
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": user_id,
                "email": format!("{user_id}@example.com"),
            })))
            .mount(&self.upstream)
            .await;
        token
    }

    pub async fn raw(&self, req: Request<Body>) -> Response {
        solvify::app(self.state.clone()).oneshot(req).await.expect("response")
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.raw(req).await;
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(t) = token {
        builder = builder.header("authorization", format!("Bearer {t}"));
    }
    builder.body(Body::empty()).expect("request")
}

/// A GET carrying a `Cookie` header, as the browser sends it on OAuth callbacks.
pub fn get_with_cookie(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("cookie", cookie)
        .body(Body::empty())
        .expect("request")
}

/// The `name=value` pair of the first `Set-Cookie` header.
pub fn set_cookie_pair(resp: &Response) -> String {
    resp.headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .unwrap_or_default()
        .to_string()
}

/// The `state` query parameter of an authorize redirect.
pub fn redirect_state(resp: &Response) -> String {
    let location = resp.headers()["location"].to_str().expect("location");
    url::Url::parse(location)
        .expect("url")
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("state param")
}

pub fn json(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(t) = token {
        builder = builder.header("authorization", format!("Bearer {t}"));
    }
    builder.body(Body::from(body.to_string())).expect("request")
}
