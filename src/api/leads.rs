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
use crate::models::record::{LeadPatch, NewLead};
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateLeadRequest {
    pub lead_name: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

fn not_found() -> AppError {
    AppError::NotFound("Lead not found".into())
}

/// GET /api/leads
pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
) -> Result<Json<Value>, AppError> {
    let leads = state.store.list_leads(ctx.workspace_id).await?;
    Ok(Json(json!({ "leads": leads })))
}

/// POST /api/leads
pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Json(payload): Json<CreateLeadRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let lead_name = required(&payload.lead_name, "Lead name is required")?.to_string();
    let lead = state
        .store
        .create_lead(
            ctx.workspace_id,
            ctx.user_id(),
            &NewLead {
                lead_name,
                company: payload.company,
                email: payload.email,
                phone: payload.phone,
                status: payload.status,
                notes: payload.notes,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "lead": lead }))))
}

/// GET /api/leads/:id
pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let lead = state
        .store
        .get_lead(ctx.workspace_id, id)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(json!({ "lead": lead })))
}

/// PUT /api/leads/:id
pub async fn update_lead(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
    Json(patch): Json<LeadPatch>,
) -> Result<Json<Value>, AppError> {
    if matches!(patch.lead_name.as_deref(), Some(n) if n.trim().is_empty()) {
        return Err(AppError::BadRequest("Lead name cannot be empty".into()));
    }
    let lead = state
        .store
        .update_lead(ctx.workspace_id, id, &patch)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(json!({ "lead": lead })))
}

/// DELETE /api/leads/:id
pub async fn delete_lead(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !state.store.delete_lead(ctx.workspace_id, id).await? {
        return Err(not_found());
    }
    Ok(Json(json!({ "success": true })))
}
