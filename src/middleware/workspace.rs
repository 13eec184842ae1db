//! Tenant resolution: which workspace a request operates in, and in what role.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::Serialize;
use uuid::Uuid;

use super::auth::{CurrentUser, Identity};
use super::rbac::Role;
use crate::errors::AppError;
use crate::store::Store;
use crate::AppState;

pub const WORKSPACE_HEADER: &str = "x-workspace-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkspaceAccess {
    pub workspace_id: Uuid,
    pub role: Role,
}

/// Access of `user_id` to `workspace_id`, or `None` if it has none.
pub async fn access_to(
    store: &dyn Store,
    user_id: Uuid,
    workspace_id: Uuid,
) -> anyhow::Result<Option<WorkspaceAccess>> {
    let Some(workspace) = store.get_workspace(workspace_id).await? else {
        return Ok(None);
    };
    let memberships = store.memberships(user_id).await?;
    let membership = memberships.iter().find(|m| m.workspace_id == workspace_id);
    Ok(Role::of(user_id, &workspace, membership).map(|role| WorkspaceAccess { workspace_id, role }))
}

/// Picks the workspace for a request.
///
/// An explicitly requested workspace must be accessible. Otherwise the
/// profile's primary workspace wins, then the oldest membership, then the
/// oldest owned workspace.
pub async fn resolve_workspace(
    store: &dyn Store,
    user_id: Uuid,
    requested: Option<Uuid>,
) -> Result<WorkspaceAccess, AppError> {
    if let Some(id) = requested {
        return access_to(store, user_id, id).await?.ok_or_else(|| {
            tracing::warn!(%user_id, workspace_id = %id, "workspace access denied");
            AppError::Forbidden("Access denied to workspace".into())
        });
    }

    if let Some(id) = store.get_profile(user_id).await?.and_then(|p| p.workspace_id) {
        if let Some(access) = access_to(store, user_id, id).await? {
            return Ok(access);
        }
        tracing::debug!(%user_id, workspace_id = %id, "stale profile workspace pointer");
    }

    for membership in store.memberships(user_id).await? {
        if let Some(access) = access_to(store, user_id, membership.workspace_id).await? {
            return Ok(access);
        }
    }

    if let Some(ws) = store.owned_workspaces(user_id).await?.into_iter().next() {
        return Ok(WorkspaceAccess {
            workspace_id: ws.id,
            role: Role::Owner,
        });
    }

    Err(AppError::NotFound("No workspace found".into()))
}

/// Reads `workspace_id` from the query string or the `x-workspace-id` header.
pub fn requested_workspace(parts: &Parts) -> Result<Option<Uuid>, AppError> {
    let from_query = parts.uri.query().and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(k, _)| k == "workspace_id")
            .map(|(_, v)| v.into_owned())
    });
    let from_header = || {
        parts
            .headers
            .get(WORKSPACE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    match from_query.or_else(from_header).filter(|s| !s.is_empty()) {
        Some(raw) => Uuid::parse_str(raw.trim())
            .map(Some)
            .map_err(|_| AppError::BadRequest("Invalid workspace_id".into())),
        None => Ok(None),
    }
}

/// An authenticated caller bound to a workspace they may use.
///
/// Every workspace-scoped handler takes this; domain queries use
/// `workspace_id` from here and nowhere else.
#[derive(Debug, Clone)]
pub struct WorkspaceContext {
    pub identity: Identity,
    pub workspace_id: Uuid,
    pub role: Role,
}

impl WorkspaceContext {
    pub fn user_id(&self) -> Uuid {
        self.identity.id
    }

    pub fn require(&self, role: Role) -> Result<(), AppError> {
        super::rbac::require(self.role, role)
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for WorkspaceContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(identity) = CurrentUser::from_request_parts(parts, state).await?;
        let requested = requested_workspace(parts)?;
        let access = resolve_workspace(state.store.as_ref(), identity.id, requested).await?;
        Ok(WorkspaceContext {
            identity,
            workspace_id: access.workspace_id,
            role: access.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::workspace::Profile;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn test_no_workspace_is_not_found() {
        let store = MemoryStore::new();
        let err = resolve_workspace(&store, Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m == "No workspace found"));
    }

    #[tokio::test]
    async fn test_profile_pointer_wins_over_membership() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let a = store.put_workspace("a", Uuid::new_v4()).await;
        let b = store.put_workspace("b", user).await;
        store.put_member(a.id, user, false).await;
        store
            .put_profile(Profile { user_id: user, workspace_id: Some(b.id), email: None, full_name: None })
            .await;
        let access = resolve_workspace(&store, user, None).await.unwrap();
        assert_eq!(access.workspace_id, b.id);
        assert_eq!(access.role, Role::Owner);
    }

    #[tokio::test]
    async fn test_stale_profile_pointer_falls_back_to_membership() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let foreign = store.put_workspace("foreign", Uuid::new_v4()).await;
        let mine = store.put_workspace("mine", Uuid::new_v4()).await;
        store.put_member(mine.id, user, true).await;
        store
            .put_profile(Profile { user_id: user, workspace_id: Some(foreign.id), email: None, full_name: None })
            .await;
        let access = resolve_workspace(&store, user, None).await.unwrap();
        assert_eq!(access.workspace_id, mine.id);
        assert_eq!(access.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_requested_workspace_requires_access() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let foreign = store.put_workspace("foreign", Uuid::new_v4()).await;
        let err = resolve_workspace(&store, user, Some(foreign.id)).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        store.put_member(foreign.id, user, false).await;
        let access = resolve_workspace(&store, user, Some(foreign.id)).await.unwrap();
        assert_eq!(access.role, Role::Member);
    }

    #[test]
    fn test_requested_workspace_parsing() {
        let id = Uuid::new_v4();
        let req = axum::http::Request::builder()
            .uri(format!("/api/projects?workspace_id={id}"))
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert_eq!(requested_workspace(&parts).unwrap(), Some(id));

        let req = axum::http::Request::builder()
            .uri("/api/projects")
            .header(WORKSPACE_HEADER, "not-a-uuid")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert!(matches!(requested_workspace(&parts), Err(AppError::BadRequest(_))));
    }
}
