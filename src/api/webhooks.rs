//! Inbound workflow webhooks and their delivery log.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::automation::load_workflow;
use crate::errors::AppError;
use crate::middleware::auth::CurrentUser;
use crate::models::automation::{NewWebhookLog, NewWorkflowExecution};
use crate::notification::webhook::validate_signature;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
const DEFAULT_LOG_LIMIT: i64 = 10;
const MAX_LOG_LIMIT: i64 = 100;

/// Request headers never copied into the log.
const REDACTED_HEADERS: [&str; 3] = ["authorization", "cookie", SIGNATURE_HEADER];

#[derive(Deserialize)]
pub struct LogParams {
    pub workflow_id: Option<Uuid>,
    pub limit: Option<i64>,
}

fn rejected(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
}

/// POST /api/webhooks?workflow_id=..&secret=..
///
/// A workflow with a `webhook_secret` requires either the `secret` query
/// parameter or an `x-webhook-signature` HMAC of the raw body.
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let workflow_id = params
        .get("workflow_id")
        .ok_or_else(|| AppError::BadRequest("workflow_id parameter is required".into()))?;
    let workflow_id = Uuid::parse_str(workflow_id)
        .map_err(|_| AppError::BadRequest("Invalid workflow_id".into()))?;

    let workflow = state
        .store
        .get_workflow(workflow_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Workflow not found".into()))?;

    if let Some(expected) = workflow.webhook_secret() {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        let authorized = match (params.get("secret"), signature) {
            (Some(given), _) => bool::from(given.as_bytes().ct_eq(expected.as_bytes())),
            (None, Some(sig)) => validate_signature(&body, sig, expected),
            (None, None) => return Ok(rejected("Secret required for this webhook")),
        };
        if !authorized {
            tracing::warn!(%workflow_id, "inbound webhook with invalid secret");
            return Ok(rejected("Invalid secret"));
        }
    }

    let payload = serde_json::from_slice::<Value>(&body).unwrap_or_else(|_| {
        json!({
            "data": String::from_utf8_lossy(&body),
            "content_type": "text/plain",
        })
    });

    let logged_headers: Map<String, Value> = headers
        .iter()
        .filter(|(k, _)| !REDACTED_HEADERS.contains(&k.as_str()))
        .filter_map(|(k, v)| Some((k.to_string(), Value::String(v.to_str().ok()?.to_string()))))
        .collect();
    let logged_query: Map<String, Value> = params
        .iter()
        .filter(|(k, _)| k.as_str() != "secret")
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();

    let log = state
        .store
        .insert_webhook_log(&NewWebhookLog {
            workflow_id,
            user_id: workflow.user_id,
            method: "POST".into(),
            headers: Value::Object(logged_headers),
            body: payload.clone(),
            query: Value::Object(logged_query),
        })
        .await?;

    let execution = NewWorkflowExecution {
        workflow_id,
        user_id: workflow.user_id,
        trigger_type: "webhook".into(),
        status: "running".into(),
        trigger_data: payload,
        result: json!({ "webhook_id": log.id }),
    };
    // The webhook is acknowledged even if the execution record fails.
    if let Err(e) = state.store.insert_workflow_execution(&execution).await {
        tracing::error!(%workflow_id, error = %e, "failed to trigger workflow from webhook");
    }

    tracing::info!(%workflow_id, webhook_id = %log.id, "inbound webhook stored");
    Ok(Json(json!({
        "success": true,
        "message": "Webhook received and processed",
        "webhook_id": log.id,
        "workflow_id": workflow_id,
    }))
    .into_response())
}

/// GET /api/webhooks?workflow_id=..&limit=..
pub async fn list_webhook_logs(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<LogParams>,
) -> Result<Json<Value>, AppError> {
    let workflow_id = params
        .workflow_id
        .ok_or_else(|| AppError::BadRequest("workflow_id parameter is required".into()))?;
    load_workflow(&state, user.id, workflow_id).await?;

    let limit = params.limit.unwrap_or(DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);
    let webhooks = state.store.list_webhook_logs(workflow_id, limit).await?;
    Ok(Json(json!({
        "success": true,
        "count": webhooks.len(),
        "webhooks": webhooks,
    })))
}
