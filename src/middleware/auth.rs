//! Caller authentication.
//!
//! Browser and API clients are identified by a Supabase bearer token or a
//! session cookie. Internal automation calls may instead carry a signed
//! service credential, which is only accepted by [`ServiceOrUser`].

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::errors::AppError;
use crate::AppState;

pub const SESSION_COOKIES: [&str; 2] = [
    "next-auth.session-token",
    "__Secure-next-auth.session-token",
];

pub const SERVICE_USER_HEADER: &str = "x-service-user-id";
pub const SERVICE_TIMESTAMP_HEADER: &str = "x-service-timestamp";
pub const SERVICE_SIGNATURE_HEADER: &str = "x-service-signature";

/// Allowed clock skew for signed service calls, in seconds.
pub const SERVICE_MAX_SKEW_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentitySource {
    Bearer,
    Session,
    Service,
}

/// The authenticated caller of one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: Option<String>,
    pub source: IdentitySource,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SessionClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: i64,
}

/// Resolves the caller from the bearer token or, failing that, a session
/// cookie. Never errors; an unresolvable caller is `None`.
pub async fn resolve_identity(state: &AppState, headers: &HeaderMap) -> Option<Identity> {
    if let Some(token) = bearer_token(headers) {
        // A presented bearer token decides the outcome on its own.
        return state.auth.get_user(token).await.map(|u| Identity {
            id: u.id,
            email: u.email,
            source: IdentitySource::Bearer,
        });
    }

    let cookies = parse_cookies(headers);

    if let Some(secret) = state.config.nextauth_secret.as_deref() {
        for name in SESSION_COOKIES {
            let Some((_, value)) = cookies.iter().find(|(k, _)| k == name) else {
                continue;
            };
            match decode_session(value, secret) {
                Some(identity) => return Some(identity),
                None => tracing::debug!(cookie = name, "rejected session cookie"),
            }
        }
    }

    for (name, value) in &cookies {
        if !is_supabase_cookie(name) {
            continue;
        }
        let Some(token) = supabase_cookie_token(value) else {
            continue;
        };
        if let Some(user) = state.auth.get_user(&token).await {
            return Some(Identity {
                id: user.id,
                email: user.email,
                source: IdentitySource::Session,
            });
        }
    }

    None
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Splits every `Cookie` header into `(name, value)` pairs.
pub fn parse_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all("cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    parse_cookies(headers)
        .into_iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v)
}

/// Verifies an HS256 session JWT and maps its claims to an identity.
pub fn decode_session(token: &str, secret: &str) -> Option<Identity> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .ok()?;
    let id = Uuid::parse_str(&data.claims.sub).ok()?;
    Some(Identity {
        id,
        email: data.claims.email,
        source: IdentitySource::Session,
    })
}

fn is_supabase_cookie(name: &str) -> bool {
    name == "supabase-auth-token" || (name.starts_with("sb-") && name.ends_with("-auth-token"))
}

/// Extracts the access token from a Supabase auth cookie value.
///
/// Accepts URL-encoded JSON as `["access", "refresh", ...]` or
/// `{"access_token": ...}`, optionally wrapped as `base64-<payload>`.
pub fn supabase_cookie_token(raw: &str) -> Option<String> {
    let decoded = urlencoding::decode(raw).ok()?.into_owned();
    let json_text = match decoded.strip_prefix("base64-") {
        Some(b64) => {
            let bytes = URL_SAFE_NO_PAD
                .decode(b64.trim_end_matches('='))
                .or_else(|_| STANDARD.decode(b64))
                .ok()?;
            String::from_utf8(bytes).ok()?
        }
        None => decoded,
    };

    let value: serde_json::Value = serde_json::from_str(&json_text).ok()?;
    let token = match &value {
        serde_json::Value::Array(items) => items.first()?.as_str()?,
        serde_json::Value::Object(map) => map.get("access_token")?.as_str()?,
        _ => return None,
    };
    Some(token.to_string()).filter(|t| !t.is_empty())
}

// ── Signed service credential ────────────────────────────────

/// Hex HMAC-SHA256 over `"{timestamp}.{user_id}"`.
pub fn service_signature(secret: &str, user_id: Uuid, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(format!("{timestamp}.{user_id}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Headers an internal caller attaches to act on behalf of `user_id`.
pub fn service_headers(secret: &str, user_id: Uuid) -> [(&'static str, String); 3] {
    let ts = Utc::now().timestamp();
    [
        (SERVICE_USER_HEADER, user_id.to_string()),
        (SERVICE_TIMESTAMP_HEADER, ts.to_string()),
        (SERVICE_SIGNATURE_HEADER, service_signature(secret, user_id, ts)),
    ]
}

/// Verifies the signed service headers. `None` if absent, stale, or forged.
pub fn verify_service_headers(headers: &HeaderMap, secret: &str, now: i64) -> Option<Identity> {
    let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let user_id = Uuid::parse_str(get(SERVICE_USER_HEADER)?).ok()?;
    let ts: i64 = get(SERVICE_TIMESTAMP_HEADER)?.parse().ok()?;
    let signature = get(SERVICE_SIGNATURE_HEADER)?;

    if (now - ts).abs() > SERVICE_MAX_SKEW_SECS {
        tracing::warn!(%user_id, ts, "stale service signature");
        return None;
    }
    let expected = service_signature(secret, user_id, ts);
    if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
        tracing::warn!(%user_id, "service signature mismatch");
        return None;
    }
    Some(Identity {
        id: user_id,
        email: None,
        source: IdentitySource::Service,
    })
}

// ── Extractors ───────────────────────────────────────────────

/// A caller authenticated by bearer token or session cookie.
pub struct CurrentUser(pub Identity);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(CurrentUser(identity.clone()));
        }
        let identity = resolve_identity(state, &parts.headers)
            .await
            .ok_or(AppError::Unauthorized)?;
        parts.extensions.insert(identity.clone());
        Ok(CurrentUser(identity))
    }
}

/// A user, or an internal service acting for a user via the signed headers.
pub struct ServiceOrUser(pub Identity);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for ServiceOrUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if parts.headers.contains_key(SERVICE_SIGNATURE_HEADER) {
            let secret = state.config.service_secret().ok_or(AppError::Config("SERVICE_SECRET"))?;
            return verify_service_headers(&parts.headers, secret, Utc::now().timestamp())
                .map(ServiceOrUser)
                .ok_or(AppError::Unauthorized);
        }
        let CurrentUser(identity) = CurrentUser::from_request_parts(parts, state).await?;
        Ok(ServiceOrUser(identity))
    }
}

/// Scheduler calls authenticated with `Authorization: Bearer <CRON_SECRET>`.
pub struct CronAuth;

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for CronAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let expected = crate::config::Config::require(&state.config.cron_secret, "CRON_SECRET")?;
        match bearer_token(&parts.headers) {
            Some(given) if bool::from(given.as_bytes().ct_eq(expected.as_bytes())) => Ok(CronAuth),
            _ => {
                tracing::warn!("cron endpoint called without a valid secret");
                Err(AppError::Unauthorized)
            }
        }
    }
}
