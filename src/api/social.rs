use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::config::Config;
use crate::errors::AppError;
use crate::middleware::workspace::WorkspaceContext;
use crate::models::social::NewSocialAccount;
use crate::vault::is_fresh;
use crate::AppState;

const FACEBOOK_SERVICE: &str = "facebook";

/// GET /api/social/accounts
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
) -> Result<Json<Value>, AppError> {
    let accounts = state.store.list_social_accounts(ctx.workspace_id).await?;
    Ok(Json(json!({ "accounts": accounts })))
}

/// POST /api/social/facebook/sync-pages
///
/// Lists the pages the user manages through the Graph API and upserts each
/// one, with its page token, into the workspace's social accounts.
pub async fn sync_facebook_pages(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
) -> Result<Json<Value>, AppError> {
    let app_secret = Config::require(&state.config.facebook_app_secret, "FACEBOOK_APP_SECRET")?;
    let not_connected = || AppError::NotConnected {
        service: "Facebook".into(),
    };

    // Long-lived Facebook user tokens are not refreshable; expiry means reconnect.
    let token = state
        .vault
        .load_token(ctx.user_id(), FACEBOOK_SERVICE)
        .await?
        .filter(|t| is_fresh(t, Utc::now()))
        .and_then(|t| t.access_token)
        .ok_or_else(not_connected)?;

    let pages = state
        .graph
        .list_pages(&token, app_secret)
        .await
        .map_err(|e| AppError::upstream("Failed to fetch Facebook pages", e))?;

    let mut accounts = Vec::with_capacity(pages.len());
    for page in pages {
        let account = state
            .store
            .upsert_social_account(&NewSocialAccount {
                user_id: ctx.user_id(),
                workspace_id: ctx.workspace_id,
                platform: "facebook".into(),
                account_id: page.id,
                account_name: page.name,
                access_token: page.access_token,
            })
            .await?;
        accounts.push(account);
    }

    tracing::info!(user_id = %ctx.user_id(), count = accounts.len(), "synced Facebook pages");
    Ok(Json(json!({
        "success": true,
        "synced": accounts.len(),
        "accounts": accounts,
    })))
}
