use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A raw `settings` row as stored. Token fields may live in the flat
/// columns, inside `settings_data`, or both; see `vault::shape`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, PartialEq)]
pub struct CredentialRow {
    pub user_id: Uuid,
    pub service_name: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub settings_data: Option<serde_json::Value>,
    pub status: Option<String>,
    pub updated_at: DateTime<Utc>,
}

pub const STATUS_NEEDS_REAUTH: &str = "needs_reauth";
