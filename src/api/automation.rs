//! Endpoints invoked by workflow nodes, from the dashboard or from internal
//! automation runners holding the signed service credential.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::AppError;
use crate::middleware::auth::{Identity, ServiceOrUser};
use crate::middleware::workspace::{access_to, resolve_workspace};
use crate::models::automation::{NewAutomationLog, NewWorkflowExecution, Workflow};
use crate::models::record::NewProject;
use crate::notification::webhook::{render_variables, TemplateContext, WebhookRequest};
use crate::AppState;

const DEFAULT_DESCRIPTION: &str = "Project created by automation workflow";

// ── Request DTOs ─────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCreationRequest {
    pub workflow_id: Option<String>,
    pub node_id: Option<String>,
    pub project_name: Option<String>,
    pub project_description: Option<String>,
    pub project_template: Option<String>,
    pub auto_assign: Option<bool>,
    #[serde(default)]
    pub context: Value,
    /// Accepted for compatibility; must match the authenticated caller.
    pub user_id: Option<Uuid>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowWebhookRequest {
    pub workflow_id: Uuid,
    pub node_id: Option<String>,
    pub url: Option<String>,
    pub method: Option<String>,
    pub body: Option<Value>,
    pub headers: Option<HashMap<String, String>>,
    pub retry_on_failure: Option<bool>,
    #[serde(default)]
    pub context: TemplateContext,
}

// ── Helpers ──────────────────────────────────────────────────

/// A body `userId` may only restate who the caller already is.
fn check_claimed_user(identity: &Identity, claimed: Option<Uuid>) -> Result<(), AppError> {
    match claimed {
        Some(id) if id != identity.id => {
            tracing::warn!(caller = %identity.id, claimed = %id, "userId does not match caller");
            Err(AppError::Forbidden("userId does not match the authenticated caller".into()))
        }
        _ => Ok(()),
    }
}

/// Loads a workflow the caller owns or can reach through its workspace.
pub(crate) async fn load_workflow(
    state: &AppState,
    user_id: Uuid,
    workflow_id: Uuid,
) -> Result<Workflow, AppError> {
    let not_found = || AppError::NotFound("Workflow not found".into());
    let workflow = state.store.get_workflow(workflow_id).await?.ok_or_else(not_found)?;
    if workflow.user_id == user_id {
        return Ok(workflow);
    }
    match workflow.workspace_id {
        Some(ws) if access_to(state.store.as_ref(), user_id, ws).await?.is_some() => Ok(workflow),
        _ => Err(not_found()),
    }
}

fn config_str<'a>(config: Option<&'a Value>, keys: &[&str]) -> Option<&'a str> {
    let config = config?;
    keys.iter().find_map(|k| config.get(*k).and_then(Value::as_str))
}

fn config_bool(config: Option<&Value>, keys: &[&str]) -> Option<bool> {
    let config = config?;
    keys.iter().find_map(|k| config.get(*k).and_then(Value::as_bool))
}

// ── Handlers ─────────────────────────────────────────────────

/// POST /api/automation/project-creation
pub async fn project_creation(
    State(state): State<Arc<AppState>>,
    ServiceOrUser(identity): ServiceOrUser,
    Json(payload): Json<ProjectCreationRequest>,
) -> Result<Json<Value>, AppError> {
    check_claimed_user(&identity, payload.user_id)?;
    let user_id = identity.id;

    let access = resolve_workspace(state.store.as_ref(), user_id, None).await?;

    let workflow_uuid = payload
        .workflow_id
        .as_deref()
        .and_then(|id| Uuid::parse_str(id).ok());
    let workflow = match workflow_uuid {
        Some(id) => match load_workflow(&state, user_id, id).await {
            Ok(wf) => Some(wf),
            Err(AppError::NotFound(_)) => {
                tracing::warn!(%user_id, workflow_id = %id, "workflow not found for caller, ignoring node config");
                None
            }
            Err(e) => return Err(e),
        },
        None => None,
    };
    let node_config = match (&workflow, payload.node_id.as_deref()) {
        (Some(wf), Some(node)) => wf.project_creation_config(node),
        _ => None,
    };

    tracing::info!(
        %user_id,
        workflow_id = ?payload.workflow_id,
        node_id = ?payload.node_id,
        "project creation automation triggered"
    );

    let name = payload
        .project_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("Automated Project - {}", Utc::now().format("%Y-%m-%d")));
    let description = payload
        .project_description
        .or(payload.project_template)
        .or_else(|| config_str(node_config.as_ref(), &["project_template", "projectTemplate"]).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
    let auto_assign = payload
        .auto_assign
        .or_else(|| config_bool(node_config.as_ref(), &["auto_assign", "autoAssign"]))
        .unwrap_or(true);

    let project = state
        .store
        .create_project(
            access.workspace_id,
            &NewProject {
                name,
                description: Some(description),
                status: super::projects::DEFAULT_PROJECT_STATUS.into(),
                user_id: auto_assign.then_some(user_id),
                end_date: None,
            },
        )
        .await?;

    state
        .store
        .insert_automation_log(&NewAutomationLog {
            workflow_id: workflow.as_ref().map(|wf| wf.id),
            user_id,
            workspace_id: Some(access.workspace_id),
            event_type: "project_creation".into(),
            status: "success".into(),
            message: format!("Project \"{}\" created by automation", project.name),
            metadata: json!({
                "project_id": project.id,
                "project_name": project.name,
                "node_id": payload.node_id,
                "auto_assigned": auto_assign,
                "workspace_id": access.workspace_id,
                "context": payload.context,
            }),
        })
        .await?;

    tracing::info!(project_id = %project.id, workspace_id = %access.workspace_id, "automation created project");

    Ok(Json(json!({
        "success": true,
        "project": {
            "id": project.id,
            "name": project.name,
            "description": project.description,
            "status": project.status,
            "workspace_id": project.workspace_id,
            "user_id": project.user_id,
            "created_at": project.created_at,
        },
        "message": format!("Project \"{}\" created successfully", project.name),
        "automation": {
            "workflow_id": payload.workflow_id,
            "node_id": payload.node_id,
            "auto_assigned": auto_assign,
        },
    })))
}

/// GET /api/automation/project-creation
pub async fn describe_project_creation() -> Json<Value> {
    Json(json!({
        "message": "Project Creation Automation API is running",
        "timestamp": Utc::now().to_rfc3339(),
        "endpoints": [
            "POST /api/automation/project-creation - Create projects via automation workflows"
        ],
    }))
}

/// POST /api/automation/webhook
///
/// Sends the outbound webhook configured on a workflow node. Request fields
/// override the node's config. The delivery outcome is returned as-is and
/// recorded as a workflow execution.
pub async fn send_workflow_webhook(
    State(state): State<Arc<AppState>>,
    ServiceOrUser(identity): ServiceOrUser,
    Json(payload): Json<WorkflowWebhookRequest>,
) -> Result<Json<Value>, AppError> {
    let workflow = load_workflow(&state, identity.id, payload.workflow_id).await?;
    let node = payload
        .node_id
        .as_deref()
        .and_then(|id| workflow.node_config(id));

    let mut ctx = payload.context.clone();
    if ctx.workflow.is_none() {
        ctx.workflow = Some(json!({ "id": workflow.id, "name": workflow.name }));
    }
    let now = Utc::now();

    let url = payload
        .url
        .clone()
        .or_else(|| config_str(node.as_ref(), &["url", "webhook_url", "webhookUrl"]).map(str::to_string))
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Webhook URL is required".into()))?;
    let url = render_variables(&url, &ctx, now);
    if reqwest::Url::parse(&url).is_err() {
        return Err(AppError::BadRequest(format!("Invalid webhook URL: {url}")));
    }

    let body = payload
        .body
        .clone()
        .or_else(|| node.as_ref().and_then(|n| n.get("body")).cloned())
        .map(|b| render_body(b, &ctx, now));
    let headers = payload.headers.clone().unwrap_or_else(|| {
        node.as_ref()
            .and_then(|n| n.get("headers"))
            .and_then(|h| serde_json::from_value(h.clone()).ok())
            .unwrap_or_default()
    });

    let request = WebhookRequest {
        url,
        method: payload
            .method
            .clone()
            .or_else(|| config_str(node.as_ref(), &["method"]).map(str::to_string)),
        body,
        headers,
        retry_on_failure: payload
            .retry_on_failure
            .or_else(|| config_bool(node.as_ref(), &["retry_on_failure", "retryOnFailure"]))
            .unwrap_or(false),
    };

    let outcome = state.webhooks.send(&request).await;

    let execution = NewWorkflowExecution {
        workflow_id: workflow.id,
        user_id: identity.id,
        trigger_type: "automation".into(),
        status: if outcome.success { "completed" } else { "failed" }.into(),
        trigger_data: json!({
            "node_id": payload.node_id,
            "memory": ctx.memory,
            "trigger": ctx.trigger,
        }),
        result: serde_json::to_value(&outcome).unwrap_or(Value::Null),
    };
    if let Err(e) = state.store.insert_workflow_execution(&execution).await {
        tracing::error!(workflow_id = %workflow.id, error = %e, "failed to record workflow execution");
    }

    Ok(Json(serde_json::to_value(outcome).map_err(anyhow::Error::from)?))
}

/// Renders template variables inside a string body or inside every string
/// of a JSON body.
fn render_body(body: Value, ctx: &TemplateContext, now: chrono::DateTime<Utc>) -> Value {
    match body {
        Value::String(s) => Value::String(render_variables(&s, ctx, now)),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| render_body(v, ctx, now)).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, render_body(v, ctx, now)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::IdentitySource;

    #[test]
    fn test_claimed_user_must_match() {
        let identity = Identity { id: Uuid::new_v4(), email: None, source: IdentitySource::Service };
        assert!(check_claimed_user(&identity, None).is_ok());
        assert!(check_claimed_user(&identity, Some(identity.id)).is_ok());
        assert!(matches!(
            check_claimed_user(&identity, Some(Uuid::new_v4())),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_render_body_walks_json() {
        let ctx = TemplateContext {
            memory: Some(json!({ "lead": "Acme" })),
            ..Default::default()
        };
        let out = render_body(json!({ "text": "New lead {{memory.lead}}", "n": 1, "tags": ["{{memory.lead}}"] }), &ctx, Utc::now());
        assert_eq!(out["text"], "New lead \"Acme\"");
        assert_eq!(out["tags"][0], "\"Acme\"");
        assert_eq!(out["n"], 1);
    }
}
