//! OAuth connect flows: signed `state`, PKCE for X, and the shared callback
//! plumbing used by the Fortnox routes.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header::SET_COOKIE, HeaderMap},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::errors::AppError;
use crate::middleware::auth::{cookie_value, CurrentUser};
use crate::providers::state::{OAuthState, Pkce, STATE_MAX_AGE_SECS};
use crate::AppState;

pub const PKCE_COOKIE: &str = "x_pkce_verifier";
const TWITTER_SERVICE: &str = "twitter";
const TWITTER_CALLBACK_PATH: &str = "/api/oauth/twitter/callback";

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub(crate) fn redirect_uri(state: &AppState, path: &str) -> String {
    format!("{}{}", state.config.site_url.trim_end_matches('/'), path)
}

/// Where the browser lands after a callback, e.g. `/settings?fortnox=connected`.
pub(crate) fn settings_redirect(state: &AppState, service: &str, outcome: &str) -> Redirect {
    Redirect::to(&format!(
        "{}/settings?{service}={outcome}",
        state.config.site_url.trim_end_matches('/')
    ))
}

/// `Set-Cookie` value holding the state nonce for `path`; an empty nonce
/// with `Max-Age=0` clears it.
pub(crate) fn nonce_cookie(name: &str, nonce: &str, path: &str) -> String {
    let max_age = if nonce.is_empty() { 0 } else { STATE_MAX_AGE_SECS };
    format!("{name}={nonce}; HttpOnly; Secure; SameSite=Lax; Path={path}; Max-Age={max_age}")
}

/// The callback must come from the browser that started the flow: it has to
/// carry the nonce cookie set by `connect`, equal to the nonce in the state.
pub(crate) fn check_nonce_cookie(headers: &HeaderMap, name: &str, verified: &OAuthState) -> Result<(), AppError> {
    let given = cookie_value(headers, name).unwrap_or_default();
    if given.is_empty() || !bool::from(given.as_bytes().ct_eq(verified.nonce.as_bytes())) {
        tracing::warn!(provider = %verified.provider, user_id = %verified.user_id, "OAuth callback without matching state cookie");
        return Err(AppError::BadRequest("Invalid state parameter".into()));
    }
    Ok(())
}

/// Validates the callback parameters and returns the code and the verified
/// state the flow was started with.
pub(crate) fn verify_callback(
    state: &AppState,
    params: &CallbackParams,
    provider: &str,
) -> Result<(String, OAuthState), AppError> {
    let code = params
        .code
        .clone()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("Authorization code not provided".into()))?;
    let raw = params
        .state
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("Invalid state parameter".into()))?;
    let secret = state.config.oauth_state_secret()?;

    let verified = OAuthState::verify(raw, secret).map_err(|e| {
        tracing::warn!(provider, error = %e, "rejected OAuth state");
        AppError::BadRequest("Invalid state parameter".into())
    })?;
    if verified.provider != provider {
        return Err(AppError::BadRequest("Invalid state parameter".into()));
    }
    Ok((code, verified))
}

/// GET /api/oauth/twitter
pub async fn twitter_connect(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, AppError> {
    let provider = state.vault.providers().for_service(TWITTER_SERVICE)?;
    let secret = state.config.oauth_state_secret()?;

    let pkce = Pkce::generate();
    let signed_state = OAuthState::new(user.id, provider.id()).sign(secret);
    let url = provider.auth_url(
        &provider.default_scopes(),
        &signed_state,
        &redirect_uri(&state, TWITTER_CALLBACK_PATH),
        Some(&pkce.challenge),
    );

    let cookie = format!(
        "{PKCE_COOKIE}={}; HttpOnly; Secure; SameSite=Lax; Path=/api/oauth/twitter; Max-Age={STATE_MAX_AGE_SECS}",
        pkce.verifier
    );
    tracing::info!(user_id = %user.id, "starting X OAuth flow");
    Ok(([(SET_COOKIE, cookie)], Redirect::to(&url)).into_response())
}

/// GET /api/oauth/twitter/callback
pub async fn twitter_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let clear = format!("{PKCE_COOKIE}=; HttpOnly; Secure; SameSite=Lax; Path=/api/oauth/twitter; Max-Age=0");

    if let Some(error) = &params.error {
        tracing::warn!(error, "X authorization denied");
        return Ok(([(SET_COOKIE, clear)], settings_redirect(&state, TWITTER_SERVICE, "error")).into_response());
    }

    let provider = state.vault.providers().for_service(TWITTER_SERVICE)?;
    let (code, verified) = verify_callback(&state, &params, provider.id())?;
    let user_id = verified.user_id;
    let verifier = cookie_value(&headers, PKCE_COOKIE)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing PKCE verifier".into()))?;

    let tokens = provider
        .exchange_code(&code, &redirect_uri(&state, TWITTER_CALLBACK_PATH), Some(&verifier))
        .await
        .map_err(|e| AppError::upstream("Failed to exchange authorization code", e))?;
    state
        .vault
        .save_token_set(user_id, TWITTER_SERVICE, &tokens, None)
        .await?;

    tracing::info!(%user_id, "X account connected");
    Ok(([(SET_COOKIE, clear)], settings_redirect(&state, TWITTER_SERVICE, "connected")).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header::COOKIE, HeaderValue};
    use uuid::Uuid;

    fn headers(cookie: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        h
    }

    #[test]
    fn test_nonce_cookie_must_match_state() {
        let verified = OAuthState::new(Uuid::new_v4(), "fortnox");
        let ok = headers(&format!("other=1; fx_state={}", verified.nonce));
        assert!(check_nonce_cookie(&ok, "fx_state", &verified).is_ok());

        assert!(check_nonce_cookie(&HeaderMap::new(), "fx_state", &verified).is_err());
        assert!(check_nonce_cookie(&headers("fx_state="), "fx_state", &verified).is_err());
        assert!(check_nonce_cookie(&headers("fx_state=someone-else"), "fx_state", &verified).is_err());
    }

    #[test]
    fn test_nonce_cookie_clears_with_empty_nonce() {
        assert!(nonce_cookie("fx_state", "abc", "/api/fortnox").contains("Max-Age=600"));
        let clear = nonce_cookie("fx_state", "", "/api/fortnox");
        assert!(clear.starts_with("fx_state=;"));
        assert!(clear.ends_with("Max-Age=0"));
    }
}
