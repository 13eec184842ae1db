use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::Store;
use crate::models::automation::{
    AutomationLog, NewAutomationLog, NewWebhookLog, NewWorkflowExecution, WebhookLog, Workflow,
    WorkflowExecution,
};
use crate::models::credential::{CredentialRow, STATUS_NEEDS_REAUTH};
use crate::models::record::{
    ContentItem, ContentPatch, EmailTemplate, EmailTemplatePatch, Lead, LeadPatch, NewContentItem,
    NewEmailTemplate, NewLead, NewProject, Project, ProjectPatch, Task,
};
use crate::models::social::{NewSocialAccount, SocialAccount};
use crate::models::workspace::{NewTeamMember, Profile, TeamMember, Workspace};

const PROJECT_COLUMNS: &str =
    "id, workspace_id, user_id, name, description, status, end_date, created_at";
const LEAD_COLUMNS: &str =
    "id, workspace_id, user_id, lead_name, company, email, phone, status, notes, created_at";
const CONTENT_COLUMNS: &str =
    "id, workspace_id, user_id, title, body, platform, status, scheduled_for, created_at";
const TEMPLATE_COLUMNS: &str =
    "id, workspace_id, user_id, name, subject, html_content, category, created_at";
const MEMBER_COLUMNS: &str = "id, user_id, workspace_id, name, email, is_admin, created_at";
const CREDENTIAL_COLUMNS: &str =
    "user_id, service_name, access_token, refresh_token, expires_at, settings_data, status, updated_at";
const WORKFLOW_COLUMNS: &str =
    "id, user_id, workspace_id, name, job_type, status, settings, next_run, last_run, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    // -- Profiles & workspaces --

    async fn get_profile(&self, user_id: Uuid) -> anyhow::Result<Option<Profile>> {
        let row = sqlx::query_as::<_, Profile>(
            "SELECT user_id, workspace_id, email, full_name FROM profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_workspace(&self, id: Uuid) -> anyhow::Result<Option<Workspace>> {
        let row = sqlx::query_as::<_, Workspace>(
            "SELECT id, name, owner_id, created_at FROM workspaces WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn memberships(&self, user_id: Uuid) -> anyhow::Result<Vec<TeamMember>> {
        let rows = sqlx::query_as::<_, TeamMember>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM team_members WHERE user_id = $1 ORDER BY created_at ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn owned_workspaces(&self, user_id: Uuid) -> anyhow::Result<Vec<Workspace>> {
        let rows = sqlx::query_as::<_, Workspace>(
            "SELECT id, name, owner_id, created_at FROM workspaces WHERE owner_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_team_members(&self, workspace_id: Uuid) -> anyhow::Result<Vec<TeamMember>> {
        let rows = sqlx::query_as::<_, TeamMember>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM team_members WHERE workspace_id = $1 ORDER BY created_at ASC"
        ))
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn add_team_member(
        &self,
        workspace_id: Uuid,
        member: &NewTeamMember,
    ) -> anyhow::Result<TeamMember> {
        let row = sqlx::query_as::<_, TeamMember>(&format!(
            r#"
            INSERT INTO team_members (user_id, workspace_id, name, email, is_admin)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {MEMBER_COLUMNS}
            "#
        ))
        .bind(member.user_id)
        .bind(workspace_id)
        .bind(&member.name)
        .bind(&member.email)
        .bind(member.is_admin)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn remove_team_member(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM team_members WHERE id = $1 AND workspace_id = $2")
            .bind(id)
            .bind(workspace_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn leave_workspace(&self, user_id: Uuid, workspace_id: Uuid) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result =
            sqlx::query("DELETE FROM team_members WHERE user_id = $1 AND workspace_id = $2")
                .bind(user_id)
                .bind(workspace_id)
                .execute(&mut *tx)
                .await?;
        sqlx::query(
            "UPDATE profiles SET workspace_id = NULL WHERE user_id = $1 AND workspace_id = $2",
        )
        .bind(user_id)
        .bind(workspace_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    // -- Projects --

    async fn list_projects(&self, workspace_id: Uuid) -> anyhow::Result<Vec<Project>> {
        let rows = sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE workspace_id = $1 ORDER BY created_at DESC"
        ))
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_project(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<Option<Project>> {
        let row = sqlx::query_as::<_, Project>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1 AND workspace_id = $2"
        ))
        .bind(id)
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_project(&self, workspace_id: Uuid, project: &NewProject) -> anyhow::Result<Project> {
        let row = sqlx::query_as::<_, Project>(&format!(
            r#"
            INSERT INTO projects (workspace_id, user_id, name, description, status, end_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(workspace_id)
        .bind(project.user_id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(&project.status)
        .bind(project.end_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_project(
        &self,
        workspace_id: Uuid,
        id: Uuid,
        patch: &ProjectPatch,
    ) -> anyhow::Result<Option<Project>> {
        let row = sqlx::query_as::<_, Project>(&format!(
            r#"
            UPDATE projects SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                status = COALESCE($5, status),
                end_date = COALESCE($6, end_date)
            WHERE id = $1 AND workspace_id = $2
            RETURNING {PROJECT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(workspace_id)
        .bind(&patch.name)
        .bind(&patch.description)
        .bind(&patch.status)
        .bind(patch.end_date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_project(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1 AND workspace_id = $2")
            .bind(id)
            .bind(workspace_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_tasks(&self, project_id: Uuid) -> anyhow::Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, Task>(
            r#"
            SELECT id, project_id, title, status, deadline, checklist, created_at
            FROM tasks WHERE project_id = $1 ORDER BY created_at ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -- Leads --

    async fn list_leads(&self, workspace_id: Uuid) -> anyhow::Result<Vec<Lead>> {
        let rows = sqlx::query_as::<_, Lead>(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE workspace_id = $1 ORDER BY created_at DESC"
        ))
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_lead(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<Option<Lead>> {
        let row = sqlx::query_as::<_, Lead>(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1 AND workspace_id = $2"
        ))
        .bind(id)
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_lead(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        lead: &NewLead,
    ) -> anyhow::Result<Lead> {
        let row = sqlx::query_as::<_, Lead>(&format!(
            r#"
            INSERT INTO leads (workspace_id, user_id, lead_name, company, email, phone, status, notes)
            VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, 'new'), $8)
            RETURNING {LEAD_COLUMNS}
            "#
        ))
        .bind(workspace_id)
        .bind(user_id)
        .bind(&lead.lead_name)
        .bind(&lead.company)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.status)
        .bind(&lead.notes)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_lead(
        &self,
        workspace_id: Uuid,
        id: Uuid,
        patch: &LeadPatch,
    ) -> anyhow::Result<Option<Lead>> {
        let row = sqlx::query_as::<_, Lead>(&format!(
            r#"
            UPDATE leads SET
                lead_name = COALESCE($3, lead_name),
                company = COALESCE($4, company),
                email = COALESCE($5, email),
                phone = COALESCE($6, phone),
                status = COALESCE($7, status),
                notes = COALESCE($8, notes)
            WHERE id = $1 AND workspace_id = $2
            RETURNING {LEAD_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(workspace_id)
        .bind(&patch.lead_name)
        .bind(&patch.company)
        .bind(&patch.email)
        .bind(&patch.phone)
        .bind(&patch.status)
        .bind(&patch.notes)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_lead(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM leads WHERE id = $1 AND workspace_id = $2")
            .bind(id)
            .bind(workspace_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- Content --

    async fn list_content(&self, workspace_id: Uuid) -> anyhow::Result<Vec<ContentItem>> {
        let rows = sqlx::query_as::<_, ContentItem>(&format!(
            "SELECT {CONTENT_COLUMNS} FROM content_items WHERE workspace_id = $1 ORDER BY created_at DESC"
        ))
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_content(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<Option<ContentItem>> {
        let row = sqlx::query_as::<_, ContentItem>(&format!(
            "SELECT {CONTENT_COLUMNS} FROM content_items WHERE id = $1 AND workspace_id = $2"
        ))
        .bind(id)
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_content(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        item: &NewContentItem,
    ) -> anyhow::Result<ContentItem> {
        let row = sqlx::query_as::<_, ContentItem>(&format!(
            r#"
            INSERT INTO content_items (workspace_id, user_id, title, body, platform, status, scheduled_for)
            VALUES ($1, $2, $3, $4, $5, COALESCE($6, 'draft'), $7)
            RETURNING {CONTENT_COLUMNS}
            "#
        ))
        .bind(workspace_id)
        .bind(user_id)
        .bind(&item.title)
        .bind(&item.body)
        .bind(&item.platform)
        .bind(&item.status)
        .bind(item.scheduled_for)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_content(
        &self,
        workspace_id: Uuid,
        id: Uuid,
        patch: &ContentPatch,
    ) -> anyhow::Result<Option<ContentItem>> {
        let row = sqlx::query_as::<_, ContentItem>(&format!(
            r#"
            UPDATE content_items SET
                title = COALESCE($3, title),
                body = COALESCE($4, body),
                platform = COALESCE($5, platform),
                status = COALESCE($6, status),
                scheduled_for = COALESCE($7, scheduled_for)
            WHERE id = $1 AND workspace_id = $2
            RETURNING {CONTENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(workspace_id)
        .bind(&patch.title)
        .bind(&patch.body)
        .bind(&patch.platform)
        .bind(&patch.status)
        .bind(patch.scheduled_for)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_content(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM content_items WHERE id = $1 AND workspace_id = $2")
            .bind(id)
            .bind(workspace_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- Email templates --

    async fn list_templates(&self, workspace_id: Uuid) -> anyhow::Result<Vec<EmailTemplate>> {
        let rows = sqlx::query_as::<_, EmailTemplate>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM email_templates WHERE workspace_id = $1 ORDER BY created_at DESC"
        ))
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn get_template(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<Option<EmailTemplate>> {
        let row = sqlx::query_as::<_, EmailTemplate>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM email_templates WHERE id = $1 AND workspace_id = $2"
        ))
        .bind(id)
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_template(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        template: &NewEmailTemplate,
    ) -> anyhow::Result<EmailTemplate> {
        let row = sqlx::query_as::<_, EmailTemplate>(&format!(
            r#"
            INSERT INTO email_templates (workspace_id, user_id, name, subject, html_content, category)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {TEMPLATE_COLUMNS}
            "#
        ))
        .bind(workspace_id)
        .bind(user_id)
        .bind(&template.name)
        .bind(&template.subject)
        .bind(&template.html_content)
        .bind(&template.category)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update_template(
        &self,
        workspace_id: Uuid,
        id: Uuid,
        patch: &EmailTemplatePatch,
    ) -> anyhow::Result<Option<EmailTemplate>> {
        let row = sqlx::query_as::<_, EmailTemplate>(&format!(
            r#"
            UPDATE email_templates SET
                name = COALESCE($3, name),
                subject = COALESCE($4, subject),
                html_content = COALESCE($5, html_content),
                category = COALESCE($6, category)
            WHERE id = $1 AND workspace_id = $2
            RETURNING {TEMPLATE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(workspace_id)
        .bind(&patch.name)
        .bind(&patch.subject)
        .bind(&patch.html_content)
        .bind(&patch.category)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_template(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM email_templates WHERE id = $1 AND workspace_id = $2")
            .bind(id)
            .bind(workspace_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -- Credentials --

    async fn get_credential(
        &self,
        user_id: Uuid,
        service_name: &str,
    ) -> anyhow::Result<Option<CredentialRow>> {
        let row = sqlx::query_as::<_, CredentialRow>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM settings WHERE user_id = $1 AND service_name = $2"
        ))
        .bind(user_id)
        .bind(service_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert_credential(&self, row: &CredentialRow) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings
                (user_id, service_name, access_token, refresh_token, expires_at, settings_data, status, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (service_name, user_id) DO UPDATE SET
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                expires_at = EXCLUDED.expires_at,
                settings_data = EXCLUDED.settings_data,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(row.user_id)
        .bind(&row.service_name)
        .bind(&row.access_token)
        .bind(&row.refresh_token)
        .bind(row.expires_at)
        .bind(&row.settings_data)
        .bind(&row.status)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_credential_status(
        &self,
        user_id: Uuid,
        service_name: &str,
        status: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE settings SET status = $3, updated_at = NOW() WHERE user_id = $1 AND service_name = $2",
        )
        .bind(user_id)
        .bind(service_name)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_refreshable_credentials(&self) -> anyhow::Result<Vec<CredentialRow>> {
        let rows = sqlx::query_as::<_, CredentialRow>(&format!(
            r#"
            SELECT {CREDENTIAL_COLUMNS} FROM settings
            WHERE (refresh_token IS NOT NULL OR settings_data IS NOT NULL)
              AND status IS DISTINCT FROM $1
            "#
        ))
        .bind(STATUS_NEEDS_REAUTH)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -- Social accounts --

    async fn list_social_accounts(&self, workspace_id: Uuid) -> anyhow::Result<Vec<SocialAccount>> {
        let rows = sqlx::query_as::<_, SocialAccount>(
            r#"
            SELECT id, user_id, workspace_id, platform, account_id, account_name, access_token, updated_at
            FROM social_accounts WHERE workspace_id = $1 ORDER BY platform, account_name
            "#,
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn upsert_social_account(&self, account: &NewSocialAccount) -> anyhow::Result<SocialAccount> {
        let row = sqlx::query_as::<_, SocialAccount>(
            r#"
            INSERT INTO social_accounts (user_id, workspace_id, platform, account_id, account_name, access_token)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, platform, account_id) DO UPDATE SET
                workspace_id = EXCLUDED.workspace_id,
                account_name = EXCLUDED.account_name,
                access_token = EXCLUDED.access_token,
                updated_at = NOW()
            RETURNING id, user_id, workspace_id, platform, account_id, account_name, access_token, updated_at
            "#,
        )
        .bind(account.user_id)
        .bind(account.workspace_id)
        .bind(&account.platform)
        .bind(&account.account_id)
        .bind(&account.account_name)
        .bind(&account.access_token)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    // -- Automation --

    async fn get_workflow(&self, id: Uuid) -> anyhow::Result<Option<Workflow>> {
        let row = sqlx::query_as::<_, Workflow>(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM cron_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn due_report_jobs(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Workflow>> {
        let rows = sqlx::query_as::<_, Workflow>(&format!(
            r#"
            SELECT {WORKFLOW_COLUMNS} FROM cron_jobs
            WHERE job_type = 'project_report' AND status = 'active' AND next_run <= $1
            ORDER BY next_run ASC
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn mark_job_run(
        &self,
        id: Uuid,
        last_run: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE cron_jobs SET last_run = $2, next_run = $3 WHERE id = $1")
            .bind(id)
            .bind(last_run)
            .bind(next_run)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_automation_log(&self, log: &NewAutomationLog) -> anyhow::Result<AutomationLog> {
        let row = sqlx::query_as::<_, AutomationLog>(
            r#"
            INSERT INTO automation_logs (workflow_id, user_id, workspace_id, event_type, status, message, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, workflow_id, user_id, workspace_id, event_type, status, message, metadata, created_at
            "#,
        )
        .bind(log.workflow_id)
        .bind(log.user_id)
        .bind(log.workspace_id)
        .bind(&log.event_type)
        .bind(&log.status)
        .bind(&log.message)
        .bind(&log.metadata)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn insert_webhook_log(&self, log: &NewWebhookLog) -> anyhow::Result<WebhookLog> {
        let row = sqlx::query_as::<_, WebhookLog>(
            r#"
            INSERT INTO webhook_logs (workflow_id, user_id, method, headers, body, query)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, workflow_id, user_id, method, headers, body, query, created_at
            "#,
        )
        .bind(log.workflow_id)
        .bind(log.user_id)
        .bind(&log.method)
        .bind(&log.headers)
        .bind(&log.body)
        .bind(&log.query)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_webhook_logs(&self, workflow_id: Uuid, limit: i64) -> anyhow::Result<Vec<WebhookLog>> {
        let rows = sqlx::query_as::<_, WebhookLog>(
            r#"
            SELECT id, workflow_id, user_id, method, headers, body, query, created_at
            FROM webhook_logs WHERE workflow_id = $1
            ORDER BY created_at DESC LIMIT $2
            "#,
        )
        .bind(workflow_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_workflow_execution(
        &self,
        execution: &NewWorkflowExecution,
    ) -> anyhow::Result<WorkflowExecution> {
        let row = sqlx::query_as::<_, WorkflowExecution>(
            r#"
            INSERT INTO workflow_executions (workflow_id, user_id, trigger_type, status, trigger_data, result)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, workflow_id, user_id, trigger_type, status, trigger_data, result, created_at
            "#,
        )
        .bind(execution.workflow_id)
        .bind(execution.user_id)
        .bind(&execution.trigger_type)
        .bind(&execution.status)
        .bind(&execution.trigger_data)
        .bind(&execution.result)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
