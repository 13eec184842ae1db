use std::sync::Arc;

use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use tracing::Instrument;

use crate::AppState;

pub mod automation;
pub mod content;
pub mod fortnox;
pub mod leads;
pub mod oauth;
pub mod projects;
pub mod reports;
pub mod social;
pub mod templates;
pub mod webhooks;
pub mod workspaces;

/// Every route of the API, relative to the site root.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health-check", get(health_check))
        // Workspaces & team
        .route("/api/workspaces", get(workspaces::list_workspaces))
        .route("/api/workspace/leave", post(workspaces::leave_workspace))
        .route(
            "/api/team-members",
            get(workspaces::list_team_members).post(workspaces::add_team_member),
        )
        .route("/api/team-members/:id", delete(workspaces::remove_team_member))
        // Domain records
        .route(
            "/api/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/api/projects/:id",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/api/leads", get(leads::list_leads).post(leads::create_lead))
        .route(
            "/api/leads/:id",
            get(leads::get_lead)
                .put(leads::update_lead)
                .delete(leads::delete_lead),
        )
        .route(
            "/api/content",
            get(content::list_content).post(content::create_content),
        )
        .route(
            "/api/content/:id",
            get(content::get_content)
                .put(content::update_content)
                .delete(content::delete_content),
        )
        .route(
            "/api/email-marketing/templates",
            get(templates::list_templates).post(templates::create_template),
        )
        .route(
            "/api/email-marketing/templates/:id",
            get(templates::get_template)
                .put(templates::update_template)
                .delete(templates::delete_template),
        )
        // Automation
        .route(
            "/api/automation/project-creation",
            get(automation::describe_project_creation).post(automation::project_creation),
        )
        .route("/api/automation/webhook", post(automation::send_workflow_webhook))
        .route(
            "/api/webhooks",
            get(webhooks::list_webhook_logs).post(webhooks::receive_webhook),
        )
        // Integrations
        .route("/api/fortnox/connect", get(fortnox::connect))
        .route("/api/fortnox/callback", get(fortnox::callback))
        .route("/api/fortnox/status", get(fortnox::status))
        .route("/api/fortnox/invoices/fetch-year", get(fortnox::fetch_year))
        .route("/api/oauth/twitter", get(oauth::twitter_connect))
        .route("/api/oauth/twitter/callback", get(oauth::twitter_callback))
        .route("/api/social/accounts", get(social::list_accounts))
        .route("/api/social/facebook/sync-pages", post(social::sync_facebook_pages))
        // Reports
        .route("/api/send-project-report", post(reports::send_project_report))
        .route("/api/cron/send-project-reports", get(reports::cron_send_project_reports))
        .fallback(fallback_404)
}

/// GET /api/health-check
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn fallback_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}

/// Tags every response with a fresh `x-request-id` so clients can correlate
/// failures with server logs.
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::debug_span!("request", request_id = %req_id);
    let mut resp = next.run(req).instrument(span).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Security headers for every response.
pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.remove("Server");

    resp
}

/// Rejects blank or missing required text fields with a field-specific 400.
pub(crate) fn required<'a>(
    value: &'a Option<String>,
    message: &str,
) -> Result<&'a str, crate::errors::AppError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| crate::errors::AppError::BadRequest(message.to_string()))
}
