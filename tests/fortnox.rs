//! Fortnox connect flow and paginated invoice fetch.

mod common;

use axum::http::{header::LOCATION, StatusCode};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use common::{get, get_with_cookie, redirect_state, set_cookie_pair, TestApp};
use solvify::models::credential::CredentialRow;

fn invoices(start: usize, n: usize) -> Value {
    let items: Vec<Value> = (start..start + n)
        .map(|i| {
            json!({
                "DocumentNumber": i.to_string(),
                "InvoiceDate": "2024-03-01",
                "CustomerName": "Acme AB",
                "Total": 1250.5,
                "Balance": 0,
                "Currency": "SEK",
            })
        })
        .collect();
    json!({ "Invoices": items, "MetaInformation": { "@TotalResources": 1003 } })
}

async fn connected_user(app: &TestApp) -> (Uuid, String) {
    let user = Uuid::new_v4();
    app.store
        .put_credential(CredentialRow {
            user_id: user,
            service_name: "fortnox".into(),
            access_token: Some("fx-token".into()),
            refresh_token: Some("fx-refresh".into()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            settings_data: None,
            status: None,
            updated_at: Utc::now(),
        })
        .await;
    let token = app.login(user).await;
    (user, token)
}

#[tokio::test]
async fn test_fetch_year_follows_pages_until_short_page() {
    let app = TestApp::new().await;
    let (_, token) = connected_user(&app).await;

    for (page, start, n) in [("1", 0, 500), ("2", 500, 500), ("3", 1000, 3)] {
        Mock::given(method("GET"))
            .and(path("/3/invoices"))
            .and(header("authorization", "Bearer fx-token"))
            .and(query_param("fromdate", "2024-01-01"))
            .and(query_param("todate", "2024-12-31"))
            .and(query_param("limit", "500"))
            .and(query_param("page", page))
            .respond_with(ResponseTemplate::new(200).set_body_json(invoices(start, n)))
            .expect(1)
            .mount(&app.upstream)
            .await;
    }

    let (status, body) = app
        .send(get("/api/fortnox/invoices/fetch-year?year=2024", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1003);
    assert_eq!(body["year"], 2024);
    let list = body["Invoices"].as_array().unwrap();
    assert_eq!(list.len(), 1003);
    assert_eq!(list[0]["DocumentNumber"], "0");
    assert_eq!(list[1002]["DocumentNumber"], "1002");
    assert_eq!(list[0]["InvoiceType"], "INVOICE");
}

#[tokio::test]
async fn test_fetch_year_validates_year() {
    let app = TestApp::new().await;
    let (_, token) = connected_user(&app).await;

    let (status, body) = app
        .send(get("/api/fortnox/invoices/fetch-year", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required parameter: year");

    let (status, body) = app
        .send(get("/api/fortnox/invoices/fetch-year?year=twenty", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid year parameter. Year must be a valid number.");
}

#[tokio::test]
async fn test_fetch_year_without_credential_is_not_connected() {
    let app = TestApp::new().await;
    let token = app.login(Uuid::new_v4()).await;

    let (status, body) = app
        .send(get("/api/fortnox/invoices/fetch-year?year=2024", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Fortnox not connected");
}

#[tokio::test]
async fn test_fetch_year_surfaces_upstream_error() {
    let app = TestApp::new().await;
    let (_, token) = connected_user(&app).await;
    Mock::given(method("GET"))
        .and(path("/3/invoices"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "ErrorInformation": { "message": "Missing scope", "code": 2000663 }
        })))
        .mount(&app.upstream)
        .await;

    let (status, body) = app
        .send(get("/api/fortnox/invoices/fetch-year?year=2024", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to fetch invoices from Fortnox");
    assert!(body["details"].as_str().unwrap().contains("Missing scope"));
}

#[tokio::test]
async fn test_connect_and_callback_store_tokens() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let token = app.login(user).await;

    let resp = app.raw(get("/api/fortnox/connect", Some(&token))).await;
    assert!(resp.status().is_redirection());
    let location = resp.headers()[LOCATION].to_str().unwrap().to_string();
    assert!(location.starts_with("https://apps.fortnox.se/oauth-v1/auth?"));
    let state = redirect_state(&resp);
    let cookie = set_cookie_pair(&resp);
    assert!(cookie.starts_with("fortnox_oauth_state="));
    let set_cookie = resp.headers()["set-cookie"].to_str().unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));

    Mock::given(method("POST"))
        .and(path("/oauth-v1/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-access",
            "refresh_token": "new-refresh",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&app.upstream)
        .await;

    let callback = format!(
        "/api/fortnox/callback?code=auth-code&state={}",
        urlencoding::encode(&state)
    );
    let resp = app.raw(get_with_cookie(&callback, &cookie)).await;
    assert!(resp.status().is_redirection());
    assert_eq!(
        resp.headers()[LOCATION],
        "http://localhost:3000/settings?fortnox=connected"
    );
    assert!(resp.headers()["set-cookie"].to_str().unwrap().contains("Max-Age=0"));

    let stored = app.state.vault.load_token(user, "fortnox").await.unwrap().unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("new-access"));
    assert_eq!(stored.refresh_token.as_deref(), Some("new-refresh"));

    let (_, body) = app.send(get("/api/fortnox/status", Some(&token))).await;
    assert_eq!(body["connected"], true);
    assert_eq!(body["expired"], false);
}

#[tokio::test]
async fn test_callback_rejects_tampered_state() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(get("/api/fortnox/callback?code=c&state=forged.state", None))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid state parameter");

    let (status, body) = app.send(get("/api/fortnox/callback?state=x", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Authorization code not provided");
}

#[tokio::test]
async fn test_callback_requires_state_cookie_from_same_browser() {
    let app = TestApp::new().await;
    let attacker = Uuid::new_v4();
    let victim = Uuid::new_v4();
    let attacker_token = app.login(attacker).await;
    let victim_token = app.login(victim).await;

    Mock::given(method("POST"))
        .and(path("/oauth-v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "victim-access",
            "refresh_token": "victim-refresh",
            "expires_in": 3600,
        })))
        .expect(0)
        .mount(&app.upstream)
        .await;

    let resp = app.raw(get("/api/fortnox/connect", Some(&attacker_token))).await;
    let attacker_state = redirect_state(&resp);
    let callback = format!(
        "/api/fortnox/callback?code=victim-code&state={}",
        urlencoding::encode(&attacker_state)
    );

    // No cookie at all.
    let (status, body) = app.send(get(&callback, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid state parameter");

    // The victim's own flow cookie does not match the attacker's state.
    let resp = app.raw(get("/api/fortnox/connect", Some(&victim_token))).await;
    let victim_cookie = set_cookie_pair(&resp);
    let (status, _) = app.send(get_with_cookie(&callback, &victim_cookie)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(app.state.vault.load_token(attacker, "fortnox").await.unwrap().is_none());
    assert!(app.state.vault.load_token(victim, "fortnox").await.unwrap().is_none());
}
