//! Project report email: on demand, and for scheduled `project_report` jobs.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::AppError;
use crate::middleware::auth::{CronAuth, CurrentUser};
use crate::models::automation::Workflow;
use crate::notification::email::{EmailError, OutgoingEmail, ProjectReport, ReportTask};
use crate::AppState;

pub const REPORT_JOB_TYPE: &str = "project_report";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectReportRequest {
    pub project_name: Option<String>,
    pub tasks: Option<Vec<ReportTask>>,
    #[serde(default)]
    pub is_test: bool,
    pub recipients: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronParams {
    pub job_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub success: bool,
    pub job_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn send_report(state: &AppState, report: &ProjectReport, to: Vec<String>) -> Result<String, EmailError> {
    state
        .mailer
        .send(OutgoingEmail {
            to,
            subject: report.subject(),
            html: report.render(),
        })
        .await
}

/// POST /api/send-project-report
pub async fn send_project_report(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<ProjectReportRequest>,
) -> Result<Json<Value>, AppError> {
    let (Some(project_name), Some(tasks), Some(recipients)) =
        (payload.project_name, payload.tasks, payload.recipients)
    else {
        return Err(AppError::BadRequest("Missing required fields".into()));
    };
    if project_name.trim().is_empty() || recipients.is_empty() {
        return Err(AppError::BadRequest("Missing required fields".into()));
    }

    let report = ProjectReport {
        project_name,
        tasks,
        is_test: payload.is_test,
    };
    let message_id = send_report(&state, &report, recipients).await?;

    tracing::info!(user_id = %user.id, %message_id, "project report sent");
    Ok(Json(json!({ "success": true, "messageId": message_id })))
}

/// GET /api/cron/send-project-reports[?jobId=..]
pub async fn cron_send_project_reports(
    State(state): State<Arc<AppState>>,
    _auth: CronAuth,
    Query(params): Query<CronParams>,
) -> Result<Json<Value>, AppError> {
    let now = Utc::now();
    let jobs = match params.job_id {
        Some(id) => state
            .store
            .get_workflow(id)
            .await?
            .filter(|j| j.job_type == REPORT_JOB_TYPE && j.status == "active")
            .into_iter()
            .collect(),
        None => state.store.due_report_jobs(now).await?,
    };

    tracing::info!(count = jobs.len(), "project report jobs due");
    if jobs.is_empty() {
        return Ok(Json(json!({ "message": "No jobs to process" })));
    }

    let mut results = Vec::with_capacity(jobs.len());
    for job in &jobs {
        let result = match run_report_job(&state, job, now).await {
            Ok(project_id) => JobResult {
                success: true,
                job_id: job.id,
                project_id: Some(project_id),
                error: None,
            },
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "project report job failed");
                JobResult {
                    success: false,
                    job_id: job.id,
                    project_id: None,
                    error: Some(e.to_string()),
                }
            }
        };
        results.push(result);
    }

    let successful = results.iter().filter(|r| r.success).count();
    Ok(Json(json!({
        "message": format!("Processed {} reports", results.len()),
        "successful": successful,
        "failed": results.len() - successful,
        "results": results,
    })))
}

async fn run_report_job(state: &AppState, job: &Workflow, now: DateTime<Utc>) -> anyhow::Result<Uuid> {
    let project_id = job
        .settings
        .get("project_id")
        .or_else(|| job.settings.get("property_id"))
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| anyhow::anyhow!("job has no project_id"))?;
    let workspace_id = job
        .workspace_id
        .ok_or_else(|| anyhow::anyhow!("job has no workspace"))?;
    let project = state
        .store
        .get_project(workspace_id, project_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Could not find project with ID {project_id}"))?;

    let recipients: Vec<String> = job
        .settings
        .get("recipients")
        .and_then(|r| serde_json::from_value(r.clone()).ok())
        .unwrap_or_default();

    if recipients.is_empty() {
        tracing::warn!(job_id = %job.id, "no recipients for project report job");
    } else {
        let tasks = state.store.list_tasks(project.id).await?;
        let report = ProjectReport {
            project_name: project.name.clone(),
            tasks: tasks.iter().map(ReportTask::from).collect(),
            is_test: false,
        };
        let message_id = send_report(state, &report, recipients).await?;
        tracing::info!(job_id = %job.id, %message_id, "scheduled project report sent");
    }

    state
        .store
        .mark_job_run(job.id, now, next_report_run(&job.settings, now))
        .await?;
    Ok(project_id)
}

/// Next run at 09:00 UTC: tomorrow for `daily`, next month for `monthly`,
/// otherwise in seven days.
pub fn next_report_run(settings: &Value, now: DateTime<Utc>) -> DateTime<Utc> {
    let frequency = settings
        .get("frequency")
        .and_then(Value::as_str)
        .unwrap_or("weekly")
        .to_lowercase();
    let next = match frequency.as_str() {
        "daily" => now + Duration::days(1),
        "monthly" => now.checked_add_months(Months::new(1)).unwrap_or(now + Duration::days(30)),
        _ => now + Duration::days(7),
    };
    next.date_naive()
        .and_hms_opt(9, 0, 0)
        .map(|t| t.and_utc())
        .unwrap_or(next)
}
