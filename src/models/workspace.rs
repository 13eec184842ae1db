use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's profile row. `workspace_id` is the primary workspace pointer.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    pub user_id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

/// Tenant boundary. Every domain record is scoped by a workspace id.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A workspace membership. `user_id` stays empty for invitations that
/// have not been accepted yet.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TeamMember {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub workspace_id: Uuid,
    pub name: Option<String>,
    pub email: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTeamMember {
    pub user_id: Option<Uuid>,
    pub email: String,
    pub name: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}
