use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A connected social page/profile. The access token never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SocialAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub platform: String,
    pub account_id: String,
    pub account_name: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSocialAccount {
    pub user_id: Uuid,
    pub workspace_id: Uuid,
    pub platform: String,
    pub account_id: String,
    pub account_name: String,
    pub access_token: Option<String>,
}
