use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::required;
use crate::errors::AppError;
use crate::middleware::auth::CurrentUser;
use crate::middleware::rbac::Role;
use crate::middleware::workspace::WorkspaceContext;
use crate::models::workspace::{NewTeamMember, Workspace};
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Serialize)]
pub struct WorkspaceWithRole {
    #[serde(flatten)]
    pub workspace: Workspace,
    pub role: Role,
}

#[derive(Deserialize)]
pub struct LeaveRequest {
    pub workspace_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct AddMemberRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    pub user_id: Option<Uuid>,
}

// ── Handlers ─────────────────────────────────────────────────

/// GET /api/workspaces
pub async fn list_workspaces(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Value>, AppError> {
    let mut out: Vec<WorkspaceWithRole> = state
        .store
        .owned_workspaces(user.id)
        .await?
        .into_iter()
        .map(|workspace| WorkspaceWithRole { workspace, role: Role::Owner })
        .collect();

    for membership in state.store.memberships(user.id).await? {
        if out.iter().any(|w| w.workspace.id == membership.workspace_id) {
            continue;
        }
        if let Some(workspace) = state.store.get_workspace(membership.workspace_id).await? {
            let role = if membership.is_admin { Role::Admin } else { Role::Member };
            out.push(WorkspaceWithRole { workspace, role });
        }
    }

    Ok(Json(json!({ "workspaces": out })))
}

/// POST /api/workspace/leave
pub async fn leave_workspace(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<LeaveRequest>,
) -> Result<Json<Value>, AppError> {
    let workspace_id = payload
        .workspace_id
        .ok_or_else(|| AppError::BadRequest("workspace_id is required".into()))?;

    let workspace = state
        .store
        .get_workspace(workspace_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Workspace not found".into()))?;
    if workspace.owner_id == user.id {
        return Err(AppError::BadRequest(
            "Workspace owners cannot leave their own workspace".into(),
        ));
    }

    if !state.store.leave_workspace(user.id, workspace_id).await? {
        return Err(AppError::NotFound("Not a member of this workspace".into()));
    }
    tracing::info!(user_id = %user.id, %workspace_id, "left workspace");
    Ok(Json(json!({ "success": true })))
}

/// GET /api/team-members
pub async fn list_team_members(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
) -> Result<Json<Value>, AppError> {
    let members = state.store.list_team_members(ctx.workspace_id).await?;
    Ok(Json(json!({ "members": members })))
}

/// POST /api/team-members (admins only)
pub async fn add_team_member(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Json(payload): Json<AddMemberRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    ctx.require(Role::Admin)?;
    let email = required(&payload.email, "Email is required")?;
    if !email.contains('@') {
        return Err(AppError::BadRequest("Invalid email address".into()));
    }

    let member = state
        .store
        .add_team_member(
            ctx.workspace_id,
            &NewTeamMember {
                user_id: payload.user_id,
                email: email.to_lowercase(),
                name: payload.name,
                is_admin: payload.is_admin,
            },
        )
        .await?;
    tracing::info!(workspace_id = %ctx.workspace_id, member_id = %member.id, "team member added");
    Ok((StatusCode::CREATED, Json(json!({ "member": member }))))
}

/// DELETE /api/team-members/:id (admins only)
pub async fn remove_team_member(
    State(state): State<Arc<AppState>>,
    ctx: WorkspaceContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    ctx.require(Role::Admin)?;
    if !state.store.remove_team_member(ctx.workspace_id, id).await? {
        return Err(AppError::NotFound("Team member not found".into()));
    }
    Ok(Json(json!({ "success": true })))
}
