use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::required;
use crate::errors::AppError;
use crate::middleware::workspace::WorkspaceContext;
use crate::models::record::{ContentPatch, NewContentItem};
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateContentRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    pub platform: Option<String>,
    pub status: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

fn not_found() -> AppError {
    AppError::NotFound("Content not found".into())
}

/// GET /api/content
pub async fn list_content(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
) -> Result<Json<Value>, AppError> {
    let items = state.store.list_content(ctx.workspace_id).await?;
    Ok(Json(json!({ "content": items })))
}

/// POST /api/content
pub async fn create_content(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Json(payload): Json<CreateContentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let title = required(&payload.title, "Title is required")?.to_string();
    let item = state
        .store
        .create_content(
            ctx.workspace_id,
            ctx.user_id(),
            &NewContentItem {
                title,
                body: payload.body,
                platform: payload.platform,
                status: payload.status,
                scheduled_for: payload.scheduled_for,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "content": item }))))
}

/// GET /api/content/:id
pub async fn get_content(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let item = state
        .store
        .get_content(ctx.workspace_id, id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(json!({ "content": item })))
}

/// PUT /api/content/:id
pub async fn update_content(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
    Json(patch): Json<ContentPatch>,
) -> Result<Json<Value>, AppError> {
    if matches!(patch.title.as_deref(), Some(t) if t.trim().is_empty()) {
        return Err(AppError::BadRequest("Title cannot be empty".into()));
    }
    let item = state
        .store
        .update_content(ctx.workspace_id, id, &patch)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(json!({ "content": item })))
}

/// DELETE /api/content/:id
pub async fn delete_content(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !state.store.delete_content(ctx.workspace_id, id).await? {
        return Err(not_found());
    }
    Ok(Json(json!({ "success": true })))
}
