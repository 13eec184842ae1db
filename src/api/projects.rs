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
use crate::models::record::{NewProject, ProjectPatch};
use crate::AppState;

pub const DEFAULT_PROJECT_STATUS: &str = "active";

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub end_date: Option<DateTime<Utc>>,
}

fn not_found() -> AppError {
    AppError::NotFound("Project not found".into())
}

/// GET /api/projects
pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
) -> Result<Json<Value>, AppError> {
    let projects = state.store.list_projects(ctx.workspace_id).await?;
    Ok(Json(json!({ "projects": projects })))
}

/// POST /api/projects
pub async fn create_project(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let name = required(&payload.name, "Project name is required")?;
    let project = state
        .store
        .create_project(
            ctx.workspace_id,
            &NewProject {
                name: name.to_string(),
                description: payload.description,
                status: payload.status.unwrap_or_else(|| DEFAULT_PROJECT_STATUS.into()),
                user_id: Some(ctx.user_id()),
                end_date: payload.end_date,
            },
        )
        .await?;
    tracing::info!(project_id = %project.id, workspace_id = %ctx.workspace_id, "project created");
    Ok((StatusCode::CREATED, Json(json!({ "project": project }))))
}

/// GET /api/projects/:id, with its tasks
pub async fn get_project(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let project = state
        .store
        .get_project(ctx.workspace_id, id)
        .await?
        .ok_or_else(not_found)?;
    let tasks = state.store.list_tasks(project.id).await?;
    Ok(Json(json!({ "project": project, "tasks": tasks })))
}

/// PUT /api/projects/:id
pub async fn update_project(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
    Json(patch): Json<ProjectPatch>,
) -> Result<Json<Value>, AppError> {
    if matches!(patch.name.as_deref(), Some(n) if n.trim().is_empty()) {
        return Err(AppError::BadRequest("Project name cannot be empty".into()));
    }
    let project = state
        .store
        .update_project(ctx.workspace_id, id, &patch)
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(json!({ "project": project })))
}

/// DELETE /api/projects/:id
pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !state.store.delete_project(ctx.workspace_id, id).await? {
        return Err(not_found());
    }
    Ok(Json(json!({ "success": true })))
}
