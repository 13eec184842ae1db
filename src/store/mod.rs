//! Persistence boundary.
//!
//! Every domain-record method takes the workspace id the caller was
//! resolved to, so tenant scoping cannot be forgotten at a call site.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::automation::{
    AutomationLog, NewAutomationLog, NewWebhookLog, NewWorkflowExecution, WebhookLog, Workflow,
    WorkflowExecution,
};
use crate::models::credential::CredentialRow;
use crate::models::record::{
    ContentItem, ContentPatch, EmailTemplate, EmailTemplatePatch, Lead, LeadPatch, NewContentItem,
    NewEmailTemplate, NewLead, NewProject, Project, ProjectPatch, Task,
};
use crate::models::social::{NewSocialAccount, SocialAccount};
use crate::models::workspace::{NewTeamMember, Profile, TeamMember, Workspace};

pub mod memory;
pub mod postgres;

#[async_trait]
pub trait Store: Send + Sync {
    // -- Profiles & workspaces --

    async fn get_profile(&self, user_id: Uuid) -> anyhow::Result<Option<Profile>>;
    async fn get_workspace(&self, id: Uuid) -> anyhow::Result<Option<Workspace>>;
    /// Memberships of a user, oldest first.
    async fn memberships(&self, user_id: Uuid) -> anyhow::Result<Vec<TeamMember>>;
    /// Workspaces owned by a user, oldest first.
    async fn owned_workspaces(&self, user_id: Uuid) -> anyhow::Result<Vec<Workspace>>;
    async fn list_team_members(&self, workspace_id: Uuid) -> anyhow::Result<Vec<TeamMember>>;
    async fn add_team_member(
        &self,
        workspace_id: Uuid,
        member: &NewTeamMember,
    ) -> anyhow::Result<TeamMember>;
    async fn remove_team_member(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<bool>;
    /// Deletes the membership and clears the profile pointer if it targets this workspace.
    async fn leave_workspace(&self, user_id: Uuid, workspace_id: Uuid) -> anyhow::Result<bool>;

    // -- Projects --

    async fn list_projects(&self, workspace_id: Uuid) -> anyhow::Result<Vec<Project>>;
    async fn get_project(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<Option<Project>>;
    async fn create_project(&self, workspace_id: Uuid, project: &NewProject) -> anyhow::Result<Project>;
    async fn update_project(
        &self,
        workspace_id: Uuid,
        id: Uuid,
        patch: &ProjectPatch,
    ) -> anyhow::Result<Option<Project>>;
    async fn delete_project(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<bool>;
    async fn list_tasks(&self, project_id: Uuid) -> anyhow::Result<Vec<Task>>;

    // -- Leads --

    async fn list_leads(&self, workspace_id: Uuid) -> anyhow::Result<Vec<Lead>>;
    async fn get_lead(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<Option<Lead>>;
    async fn create_lead(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        lead: &NewLead,
    ) -> anyhow::Result<Lead>;
    async fn update_lead(
        &self,
        workspace_id: Uuid,
        id: Uuid,
        patch: &LeadPatch,
    ) -> anyhow::Result<Option<Lead>>;
    async fn delete_lead(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<bool>;

    // -- Content --

    async fn list_content(&self, workspace_id: Uuid) -> anyhow::Result<Vec<ContentItem>>;
    async fn get_content(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<Option<ContentItem>>;
    async fn create_content(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        item: &NewContentItem,
    ) -> anyhow::Result<ContentItem>;
    async fn update_content(
        &self,
        workspace_id: Uuid,
        id: Uuid,
        patch: &ContentPatch,
    ) -> anyhow::Result<Option<ContentItem>>;
    async fn delete_content(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<bool>;

    // -- Email templates --

    async fn list_templates(&self, workspace_id: Uuid) -> anyhow::Result<Vec<EmailTemplate>>;
    async fn get_template(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<Option<EmailTemplate>>;
    async fn create_template(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        template: &NewEmailTemplate,
    ) -> anyhow::Result<EmailTemplate>;
    async fn update_template(
        &self,
        workspace_id: Uuid,
        id: Uuid,
        patch: &EmailTemplatePatch,
    ) -> anyhow::Result<Option<EmailTemplate>>;
    async fn delete_template(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<bool>;

    // -- Credentials --

    async fn get_credential(
        &self,
        user_id: Uuid,
        service_name: &str,
    ) -> anyhow::Result<Option<CredentialRow>>;
    /// Upsert on `(service_name, user_id)`.
    async fn upsert_credential(&self, row: &CredentialRow) -> anyhow::Result<()>;
    async fn set_credential_status(
        &self,
        user_id: Uuid,
        service_name: &str,
        status: &str,
    ) -> anyhow::Result<()>;
    /// Rows that may carry a refresh token, excluding ones awaiting re-auth.
    async fn list_refreshable_credentials(&self) -> anyhow::Result<Vec<CredentialRow>>;

    // -- Social accounts --

    async fn list_social_accounts(&self, workspace_id: Uuid) -> anyhow::Result<Vec<SocialAccount>>;
    /// Upsert on `(user_id, platform, account_id)`.
    async fn upsert_social_account(&self, account: &NewSocialAccount) -> anyhow::Result<SocialAccount>;

    // -- Automation --

    async fn get_workflow(&self, id: Uuid) -> anyhow::Result<Option<Workflow>>;
    /// `project_report` jobs whose `next_run` is at or before `now`.
    async fn due_report_jobs(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Workflow>>;
    async fn mark_job_run(
        &self,
        id: Uuid,
        last_run: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> anyhow::Result<()>;
    async fn insert_automation_log(&self, log: &NewAutomationLog) -> anyhow::Result<AutomationLog>;
    async fn insert_webhook_log(&self, log: &NewWebhookLog) -> anyhow::Result<WebhookLog>;
    async fn list_webhook_logs(&self, workflow_id: Uuid, limit: i64) -> anyhow::Result<Vec<WebhookLog>>;
    async fn insert_workflow_execution(
        &self,
        execution: &NewWorkflowExecution,
    ) -> anyhow::Result<WorkflowExecution>;
}
