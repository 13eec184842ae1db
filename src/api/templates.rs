use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::required;
use crate::errors::AppError;
use crate::middleware::workspace::WorkspaceContext;
use crate::models::record::{EmailTemplatePatch, NewEmailTemplate};
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateTemplateRequest {
    pub name: Option<String>,
    pub subject: Option<String>,
    #[serde(default)]
    pub html_content: String,
    pub category: Option<String>,
}

fn not_found() -> AppError {
    AppError::NotFound("Template not found".into())
}

/// GET /api/email-marketing/templates
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
) -> Result<Json<Value>, AppError> {
    let templates = state.store.list_templates(ctx.workspace_id).await?;
    Ok(Json(json!({ "templates": templates })))
}

/// POST /api/email-marketing/templates
pub async fn create_template(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Json(payload): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let name = required(&payload.name, "Template name is required")?.to_string();
    let subject = required(&payload.subject, "Template subject is required")?.to_string();
    let template = state
        .store
        .create_template(
            ctx.workspace_id,
            ctx.user_id(),
            &NewEmailTemplate {
                name,
                subject,
                html_content: payload.html_content,
                category: payload.category,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "template": template }))))
}

/// GET /api/email-marketing/templates/:id
pub async fn get_template(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let template = state
        .store
        .get_template(ctx.workspace_id, id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(json!({ "template": template })))
}

/// PUT /api/email-marketing/templates/:id
pub async fn update_template(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
    Json(patch): Json<EmailTemplatePatch>,
) -> Result<Json<Value>, AppError> {
    let blank = |v: &Option<String>| matches!(v.as_deref(), Some(s) if s.trim().is_empty());
    if blank(&patch.name) || blank(&patch.subject) {
        return Err(AppError::BadRequest("Template name and subject cannot be empty".into()));
    }
    let template = state
        .store
        .update_template(ctx.workspace_id, id, &patch)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(json!({ "template": template })))
}

/// DELETE /api/email-marketing/templates/:id
pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !state.store.delete_template(ctx.workspace_id, id).await? {
        return Err(not_found());
    }
    Ok(Json(json!({ "success": true })))
}
