use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::notification::email::EmailError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    /// No usable credential for a third-party service; the user must reconnect.
    #[error("{service} not connected")]
    NotConnected { service: String },

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// A required environment variable is missing. Surfaced at first use.
    #[error("{0} is not configured")]
    Config(&'static str),

    #[error("{message}")]
    Upstream { message: String, details: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn upstream(message: impl Into<String>, details: impl ToString) -> Self {
        AppError::Upstream {
            message: message.into(),
            details: details.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized | AppError::NotConnected { .. } => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Config(_)
            | AppError::Upstream { .. }
            | AppError::Database(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<EmailError> for AppError {
    fn from(e: EmailError) -> Self {
        match e {
            EmailError::NotConfigured(var) => AppError::Config(var),
            other => AppError::upstream("Failed to send email", other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, details) = match &self {
            AppError::NotConnected { .. } => (self.to_string(), Some("Please reconnect".to_string())),
            AppError::Config(var) => {
                tracing::error!(var, "missing configuration");
                ("Server configuration error".to_string(), Some(self.to_string()))
            }
            AppError::Upstream { message, details } => {
                tracing::error!(details = %details, "{}", message);
                (message.clone(), Some(details.clone()))
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                ("Database error".to_string(), Some(e.to_string()))
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                ("Internal server error".to_string(), Some(e.to_string()))
            }
            _ => (self.to_string(), None),
        };

        let body = match details {
            Some(details) => json!({ "error": error, "details": details }),
            None => json!({ "error": error }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_unauthorized_body() {
        let (status, body) = body_of(AppError::Unauthorized).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Unauthorized" }));
    }

    #[tokio::test]
    async fn test_not_connected_asks_for_reconnect() {
        let (status, body) = body_of(AppError::NotConnected { service: "Fortnox".into() }).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Fortnox not connected");
        assert_eq!(body["details"], "Please reconnect");
    }

    #[tokio::test]
    async fn test_upstream_preserves_details() {
        let (status, body) =
            body_of(AppError::upstream("Failed to fetch invoices", "Fortnox API error: 403")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to fetch invoices");
        assert_eq!(body["details"], "Fortnox API error: 403");
    }

    #[tokio::test]
    async fn test_config_error_is_500() {
        let (status, body) = body_of(AppError::Config("CRON_SECRET")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["details"], "CRON_SECRET is not configured");
    }

    #[tokio::test]
    async fn test_not_found_has_no_details() {
        let (status, body) = body_of(AppError::NotFound("No workspace found".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "No workspace found" }));
    }
}
