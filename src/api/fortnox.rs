use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header::SET_COOKIE, HeaderMap},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::oauth::{
    check_nonce_cookie, nonce_cookie, redirect_uri, settings_redirect, verify_callback, CallbackParams,
};
use crate::errors::AppError;
use crate::middleware::auth::CurrentUser;
use crate::providers::state::OAuthState;
use crate::vault::ConnectionStatus;
use crate::AppState;

const SERVICE: &str = "fortnox";
const CALLBACK_PATH: &str = "/api/fortnox/callback";
pub const STATE_COOKIE: &str = "fortnox_oauth_state";
const COOKIE_PATH: &str = "/api/fortnox";

#[derive(Deserialize)]
pub struct YearParams {
    pub year: Option<String>,
}

/// GET /api/fortnox/connect
pub async fn connect(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, AppError> {
    let provider = state.vault.providers().for_service(SERVICE)?;
    let secret = state.config.oauth_state_secret()?;
    let oauth_state = OAuthState::new(user.id, provider.id());
    let signed_state = oauth_state.sign(secret);
    let url = provider.auth_url(
        &provider.default_scopes(),
        &signed_state,
        &redirect_uri(&state, CALLBACK_PATH),
        None,
    );
    let cookie = nonce_cookie(STATE_COOKIE, &oauth_state.nonce, COOKIE_PATH);
    tracing::info!(user_id = %user.id, "starting Fortnox OAuth flow");
    Ok(([(SET_COOKIE, cookie)], Redirect::to(&url)).into_response())
}

/// GET /api/fortnox/callback
///
/// The browser arrives here without our bearer token; the signed state
/// carries the user id and the state cookie ties it to this browser.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let clear = nonce_cookie(STATE_COOKIE, "", COOKIE_PATH);
    if let Some(error) = &params.error {
        tracing::warn!(error, "Fortnox authorization denied");
        return Ok(([(SET_COOKIE, clear)], settings_redirect(&state, SERVICE, "error")).into_response());
    }

    let provider = state.vault.providers().for_service(SERVICE)?;
    let (code, verified) = verify_callback(&state, &params, provider.id())?;
    check_nonce_cookie(&headers, STATE_COOKIE, &verified)?;
    let user_id = verified.user_id;
    let tokens = provider
        .exchange_code(&code, &redirect_uri(&state, CALLBACK_PATH), None)
        .await
        .map_err(|e| AppError::upstream("Failed to exchange authorization code", e))?;
    state.vault.save_token_set(user_id, SERVICE, &tokens, None).await?;

    tracing::info!(%user_id, "Fortnox connected");
    Ok(([(SET_COOKIE, clear)], settings_redirect(&state, SERVICE, "connected")).into_response())
}

/// GET /api/fortnox/status
pub async fn status(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<ConnectionStatus>, AppError> {
    Ok(Json(state.vault.status(user.id, SERVICE).await?))
}

/// GET /api/fortnox/invoices/fetch-year?year=2024
pub async fn fetch_year(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<YearParams>,
) -> Result<Json<Value>, AppError> {
    let raw = params
        .year
        .ok_or_else(|| AppError::BadRequest("Missing required parameter: year".into()))?;
    let year: i32 = raw
        .trim()
        .parse()
        .ok()
        .filter(|y| (1900..=9999).contains(y))
        .ok_or_else(|| {
            AppError::BadRequest("Invalid year parameter. Year must be a valid number.".into())
        })?;

    let token = state.vault.get_valid_token(user.id, SERVICE).await?;
    let invoices = state
        .fortnox
        .fetch_invoices_for_year(&token, year)
        .await
        .map_err(|e| AppError::upstream("Failed to fetch invoices from Fortnox", e))?;

    Ok(Json(json!({
        "Invoices": invoices,
        "count": invoices.len(),
        "year": year,
    })))
}
