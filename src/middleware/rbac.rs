use serde::Serialize;

use crate::errors::AppError;
use crate::models::workspace::{TeamMember, Workspace};

/// A caller's role within one workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Admin,
    Owner,
}

impl Role {
    /// Role of `user_id` in `workspace`, given their membership row if any.
    /// `None` when the user has no access at all.
    pub fn of(user_id: uuid::Uuid, workspace: &Workspace, membership: Option<&TeamMember>) -> Option<Self> {
        if workspace.owner_id == user_id {
            return Some(Role::Owner);
        }
        membership.map(|m| if m.is_admin { Role::Admin } else { Role::Member })
    }

    pub fn has_permission(&self, required: Role) -> bool {
        *self >= required
    }
}

/// Returns 403 unless `role` meets `required`.
pub fn require(role: Role, required: Role) -> Result<(), AppError> {
    if role.has_permission(required) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "Insufficient role: {:?} required, but user has {:?}",
            required, role
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn workspace(owner: Uuid) -> Workspace {
        Workspace { id: Uuid::new_v4(), name: "ws".into(), owner_id: owner, created_at: Utc::now() }
    }

    fn member(ws: &Workspace, user: Uuid, is_admin: bool) -> TeamMember {
        TeamMember {
            id: Uuid::new_v4(),
            user_id: Some(user),
            workspace_id: ws.id,
            name: None,
            email: "m@b.se".into(),
            is_admin,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_role_resolution() {
        let owner = Uuid::new_v4();
        let ws = workspace(owner);
        let user = Uuid::new_v4();
        assert_eq!(Role::of(owner, &ws, None), Some(Role::Owner));
        assert_eq!(Role::of(user, &ws, Some(&member(&ws, user, true))), Some(Role::Admin));
        assert_eq!(Role::of(user, &ws, Some(&member(&ws, user, false))), Some(Role::Member));
        assert_eq!(Role::of(user, &ws, None), None);
    }

    #[test]
    fn test_require_ordering() {
        assert!(require(Role::Owner, Role::Admin).is_ok());
        assert!(require(Role::Admin, Role::Admin).is_ok());
        assert!(matches!(require(Role::Member, Role::Admin), Err(AppError::Forbidden(_))));
    }
}
