//! In-process store used by `serve --in-memory` and the test suites.
//!
//! Besides the data itself it counts writes and domain-record reads made
//! through the [`Store`] trait, so tests can assert that a rejected request
//! never touched storage. Seeding helpers (`put_*`) bypass the counters.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
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

#[derive(Default)]
struct Tables {
    profiles: Vec<Profile>,
    workspaces: Vec<Workspace>,
    team_members: Vec<TeamMember>,
    projects: Vec<Project>,
    tasks: Vec<Task>,
    leads: Vec<Lead>,
    content: Vec<ContentItem>,
    templates: Vec<EmailTemplate>,
    credentials: Vec<CredentialRow>,
    social_accounts: Vec<SocialAccount>,
    workflows: Vec<Workflow>,
    automation_logs: Vec<AutomationLog>,
    webhook_logs: Vec<WebhookLog>,
    executions: Vec<WorkflowExecution>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    writes: AtomicUsize,
    domain_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes made through the `Store` trait.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of domain-record reads (projects, leads, content, templates, tasks).
    pub fn domain_read_count(&self) -> usize {
        self.domain_reads.load(Ordering::SeqCst)
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn read_domain(&self) {
        self.domain_reads.fetch_add(1, Ordering::SeqCst);
    }

    // -- Seeding --

    pub async fn put_profile(&self, profile: Profile) {
        let mut t = self.tables.write().await;
        t.profiles.retain(|p| p.user_id != profile.user_id);
        t.profiles.push(profile);
    }

    pub async fn put_workspace(&self, name: &str, owner_id: Uuid) -> Workspace {
        let ws = Workspace {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner_id,
            created_at: Utc::now(),
        };
        self.tables.write().await.workspaces.push(ws.clone());
        ws
    }

    pub async fn put_member(&self, workspace_id: Uuid, user_id: Uuid, is_admin: bool) -> TeamMember {
        let member = TeamMember {
            id: Uuid::new_v4(),
            user_id: Some(user_id),
            workspace_id,
            name: None,
            email: format!("{user_id}@example.com"),
            is_admin,
            created_at: Utc::now(),
        };
        self.tables.write().await.team_members.push(member.clone());
        member
    }

    pub async fn put_task(&self, task: Task) {
        self.tables.write().await.tasks.push(task);
    }

    pub async fn put_workflow(&self, workflow: Workflow) {
        self.tables.write().await.workflows.push(workflow);
    }

    pub async fn put_credential(&self, row: CredentialRow) {
        let mut t = self.tables.write().await;
        t.credentials
            .retain(|c| !(c.user_id == row.user_id && c.service_name == row.service_name));
        t.credentials.push(row);
    }

    // -- Inspection --

    pub async fn automation_logs(&self) -> Vec<AutomationLog> {
        self.tables.read().await.automation_logs.clone()
    }

    pub async fn workflow_executions(&self) -> Vec<WorkflowExecution> {
        self.tables.read().await.executions.clone()
    }

    pub async fn projects(&self) -> Vec<Project> {
        self.tables.read().await.projects.clone()
    }
}

fn patch<T: Clone>(field: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *field = v.clone();
    }
}

fn patch_opt<T: Clone>(field: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        *field = value.clone();
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_profile(&self, user_id: Uuid) -> anyhow::Result<Option<Profile>> {
        let t = self.tables.read().await;
        Ok(t.profiles.iter().find(|p| p.user_id == user_id).cloned())
    }

    async fn get_workspace(&self, id: Uuid) -> anyhow::Result<Option<Workspace>> {
        let t = self.tables.read().await;
        Ok(t.workspaces.iter().find(|w| w.id == id).cloned())
    }

    async fn memberships(&self, user_id: Uuid) -> anyhow::Result<Vec<TeamMember>> {
        let t = self.tables.read().await;
        Ok(t.team_members
            .iter()
            .filter(|m| m.user_id == Some(user_id))
            .cloned()
            .collect())
    }

    async fn owned_workspaces(&self, user_id: Uuid) -> anyhow::Result<Vec<Workspace>> {
        let t = self.tables.read().await;
        Ok(t.workspaces
            .iter()
            .filter(|w| w.owner_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_team_members(&self, workspace_id: Uuid) -> anyhow::Result<Vec<TeamMember>> {
        let t = self.tables.read().await;
        Ok(t.team_members
            .iter()
            .filter(|m| m.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn add_team_member(
        &self,
        workspace_id: Uuid,
        member: &NewTeamMember,
    ) -> anyhow::Result<TeamMember> {
        let mut t = self.tables.write().await;
        if member.user_id.is_some()
            && t.team_members
                .iter()
                .any(|m| m.workspace_id == workspace_id && m.user_id == member.user_id)
        {
            anyhow::bail!("duplicate key value violates unique constraint \"team_members_user_id_workspace_id_key\"");
        }
        let row = TeamMember {
            id: Uuid::new_v4(),
            user_id: member.user_id,
            workspace_id,
            name: member.name.clone(),
            email: member.email.clone(),
            is_admin: member.is_admin,
            created_at: Utc::now(),
        };
        t.team_members.push(row.clone());
        self.wrote();
        Ok(row)
    }

    async fn remove_team_member(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let mut t = self.tables.write().await;
        let before = t.team_members.len();
        t.team_members
            .retain(|m| !(m.id == id && m.workspace_id == workspace_id));
        self.wrote();
        Ok(t.team_members.len() < before)
    }

    async fn leave_workspace(&self, user_id: Uuid, workspace_id: Uuid) -> anyhow::Result<bool> {
        let mut t = self.tables.write().await;
        let before = t.team_members.len();
        t.team_members
            .retain(|m| !(m.user_id == Some(user_id) && m.workspace_id == workspace_id));
        let removed = t.team_members.len() < before;
        for p in t.profiles.iter_mut() {
            if p.user_id == user_id && p.workspace_id == Some(workspace_id) {
                p.workspace_id = None;
            }
        }
        self.wrote();
        Ok(removed)
    }

    // -- Projects --

    async fn list_projects(&self, workspace_id: Uuid) -> anyhow::Result<Vec<Project>> {
        self.read_domain();
        let t = self.tables.read().await;
        Ok(t.projects
            .iter()
            .rev()
            .filter(|p| p.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn get_project(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<Option<Project>> {
        self.read_domain();
        let t = self.tables.read().await;
        Ok(t.projects
            .iter()
            .find(|p| p.id == id && p.workspace_id == workspace_id)
            .cloned())
    }

    async fn create_project(&self, workspace_id: Uuid, project: &NewProject) -> anyhow::Result<Project> {
        let row = Project {
            id: Uuid::new_v4(),
            workspace_id,
            user_id: project.user_id,
            name: project.name.clone(),
            description: project.description.clone(),
            status: project.status.clone(),
            end_date: project.end_date,
            created_at: Utc::now(),
        };
        self.tables.write().await.projects.push(row.clone());
        self.wrote();
        Ok(row)
    }

    async fn update_project(
        &self,
        workspace_id: Uuid,
        id: Uuid,
        p: &ProjectPatch,
    ) -> anyhow::Result<Option<Project>> {
        let mut t = self.tables.write().await;
        self.wrote();
        Ok(t.projects
            .iter_mut()
            .find(|r| r.id == id && r.workspace_id == workspace_id)
            .map(|r| {
                patch(&mut r.name, &p.name);
                patch_opt(&mut r.description, &p.description);
                patch(&mut r.status, &p.status);
                patch_opt(&mut r.end_date, &p.end_date);
                r.clone()
            }))
    }

    async fn delete_project(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let mut t = self.tables.write().await;
        let before = t.projects.len();
        t.projects
            .retain(|r| !(r.id == id && r.workspace_id == workspace_id));
        let removed = t.projects.len() < before;
        if removed {
            t.tasks.retain(|task| task.project_id != id);
        }
        self.wrote();
        Ok(removed)
    }

    async fn list_tasks(&self, project_id: Uuid) -> anyhow::Result<Vec<Task>> {
        self.read_domain();
        let t = self.tables.read().await;
        Ok(t.tasks
            .iter()
            .filter(|task| task.project_id == project_id)
            .cloned()
            .collect())
    }

    // -- Leads --

    async fn list_leads(&self, workspace_id: Uuid) -> anyhow::Result<Vec<Lead>> {
        self.read_domain();
        let t = self.tables.read().await;
        Ok(t.leads
            .iter()
            .rev()
            .filter(|r| r.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn get_lead(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<Option<Lead>> {
        self.read_domain();
        let t = self.tables.read().await;
        Ok(t.leads
            .iter()
            .find(|r| r.id == id && r.workspace_id == workspace_id)
            .cloned())
    }

    async fn create_lead(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        lead: &NewLead,
    ) -> anyhow::Result<Lead> {
        let row = Lead {
            id: Uuid::new_v4(),
            workspace_id,
            user_id: Some(user_id),
            lead_name: lead.lead_name.clone(),
            company: lead.company.clone(),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
            status: lead.status.clone().unwrap_or_else(|| "new".into()),
            notes: lead.notes.clone(),
            created_at: Utc::now(),
        };
        self.tables.write().await.leads.push(row.clone());
        self.wrote();
        Ok(row)
    }

    async fn update_lead(
        &self,
        workspace_id: Uuid,
        id: Uuid,
        p: &LeadPatch,
    ) -> anyhow::Result<Option<Lead>> {
        let mut t = self.tables.write().await;
        self.wrote();
        Ok(t.leads
            .iter_mut()
            .find(|r| r.id == id && r.workspace_id == workspace_id)
            .map(|r| {
                patch(&mut r.lead_name, &p.lead_name);
                patch_opt(&mut r.company, &p.company);
                patch_opt(&mut r.email, &p.email);
                patch_opt(&mut r.phone, &p.phone);
                patch(&mut r.status, &p.status);
                patch_opt(&mut r.notes, &p.notes);
                r.clone()
            }))
    }

    async fn delete_lead(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let mut t = self.tables.write().await;
        let before = t.leads.len();
        t.leads.retain(|r| !(r.id == id && r.workspace_id == workspace_id));
        self.wrote();
        Ok(t.leads.len() < before)
    }

    // -- Content --

    async fn list_content(&self, workspace_id: Uuid) -> anyhow::Result<Vec<ContentItem>> {
        self.read_domain();
        let t = self.tables.read().await;
        Ok(t.content
            .iter()
            .rev()
            .filter(|r| r.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn get_content(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<Option<ContentItem>> {
        self.read_domain();
        let t = self.tables.read().await;
        Ok(t.content
            .iter()
            .find(|r| r.id == id && r.workspace_id == workspace_id)
            .cloned())
    }

    async fn create_content(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        item: &NewContentItem,
    ) -> anyhow::Result<ContentItem> {
        let row = ContentItem {
            id: Uuid::new_v4(),
            workspace_id,
            user_id: Some(user_id),
            title: item.title.clone(),
            body: item.body.clone(),
            platform: item.platform.clone(),
            status: item.status.clone().unwrap_or_else(|| "draft".into()),
            scheduled_for: item.scheduled_for,
            created_at: Utc::now(),
        };
        self.tables.write().await.content.push(row.clone());
        self.wrote();
        Ok(row)
    }

    async fn update_content(
        &self,
        workspace_id: Uuid,
        id: Uuid,
        p: &ContentPatch,
    ) -> anyhow::Result<Option<ContentItem>> {
        let mut t = self.tables.write().await;
        self.wrote();
        Ok(t.content
            .iter_mut()
            .find(|r| r.id == id && r.workspace_id == workspace_id)
            .map(|r| {
                patch(&mut r.title, &p.title);
                patch_opt(&mut r.body, &p.body);
                patch_opt(&mut r.platform, &p.platform);
                patch(&mut r.status, &p.status);
                patch_opt(&mut r.scheduled_for, &p.scheduled_for);
                r.clone()
            }))
    }

    async fn delete_content(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let mut t = self.tables.write().await;
        let before = t.content.len();
        t.content.retain(|r| !(r.id == id && r.workspace_id == workspace_id));
        self.wrote();
        Ok(t.content.len() < before)
    }

    // -- Email templates --

    async fn list_templates(&self, workspace_id: Uuid) -> anyhow::Result<Vec<EmailTemplate>> {
        self.read_domain();
        let t = self.tables.read().await;
        Ok(t.templates
            .iter()
            .rev()
            .filter(|r| r.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn get_template(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<Option<EmailTemplate>> {
        self.read_domain();
        let t = self.tables.read().await;
        Ok(t.templates
            .iter()
            .find(|r| r.id == id && r.workspace_id == workspace_id)
            .cloned())
    }

    async fn create_template(
        &self,
        workspace_id: Uuid,
        user_id: Uuid,
        template: &NewEmailTemplate,
    ) -> anyhow::Result<EmailTemplate> {
        let row = EmailTemplate {
            id: Uuid::new_v4(),
            workspace_id,
            user_id: Some(user_id),
            name: template.name.clone(),
            subject: template.subject.clone(),
            html_content: template.html_content.clone(),
            category: template.category.clone(),
            created_at: Utc::now(),
        };
        self.tables.write().await.templates.push(row.clone());
        self.wrote();
        Ok(row)
    }

    async fn update_template(
        &self,
        workspace_id: Uuid,
        id: Uuid,
        p: &EmailTemplatePatch,
    ) -> anyhow::Result<Option<EmailTemplate>> {
        let mut t = self.tables.write().await;
        self.wrote();
        Ok(t.templates
            .iter_mut()
            .find(|r| r.id == id && r.workspace_id == workspace_id)
            .map(|r| {
                patch(&mut r.name, &p.name);
                patch(&mut r.subject, &p.subject);
                patch(&mut r.html_content, &p.html_content);
                patch_opt(&mut r.category, &p.category);
                r.clone()
            }))
    }

    async fn delete_template(&self, workspace_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        let mut t = self.tables.write().await;
        let before = t.templates.len();
        t.templates.retain(|r| !(r.id == id && r.workspace_id == workspace_id));
        self.wrote();
        Ok(t.templates.len() < before)
    }

    // -- Credentials --

    async fn get_credential(
        &self,
        user_id: Uuid,
        service_name: &str,
    ) -> anyhow::Result<Option<CredentialRow>> {
        let t = self.tables.read().await;
        Ok(t.credentials
            .iter()
            .find(|c| c.user_id == user_id && c.service_name == service_name)
            .cloned())
    }

    async fn upsert_credential(&self, row: &CredentialRow) -> anyhow::Result<()> {
        self.put_credential(row.clone()).await;
        self.wrote();
        Ok(())
    }

    async fn set_credential_status(
        &self,
        user_id: Uuid,
        service_name: &str,
        status: &str,
    ) -> anyhow::Result<()> {
        let mut t = self.tables.write().await;
        if let Some(c) = t
            .credentials
            .iter_mut()
            .find(|c| c.user_id == user_id && c.service_name == service_name)
        {
            c.status = Some(status.to_string());
            c.updated_at = Utc::now();
        }
        self.wrote();
        Ok(())
    }

    async fn list_refreshable_credentials(&self) -> anyhow::Result<Vec<CredentialRow>> {
        let t = self.tables.read().await;
        Ok(t.credentials
            .iter()
            .filter(|c| c.refresh_token.is_some() || c.settings_data.is_some())
            .filter(|c| c.status.as_deref() != Some(STATUS_NEEDS_REAUTH))
            .cloned()
            .collect())
    }

    // -- Social accounts --

    async fn list_social_accounts(&self, workspace_id: Uuid) -> anyhow::Result<Vec<SocialAccount>> {
        let t = self.tables.read().await;
        Ok(t.social_accounts
            .iter()
            .filter(|a| a.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn upsert_social_account(&self, account: &NewSocialAccount) -> anyhow::Result<SocialAccount> {
        let mut t = self.tables.write().await;
        let existing = t.social_accounts.iter_mut().find(|a| {
            a.user_id == account.user_id
                && a.platform == account.platform
                && a.account_id == account.account_id
        });
        let row = match existing {
            Some(a) => {
                a.workspace_id = account.workspace_id;
                a.account_name = account.account_name.clone();
                a.access_token = account.access_token.clone();
                a.updated_at = Utc::now();
                a.clone()
            }
            None => {
                let a = SocialAccount {
                    id: Uuid::new_v4(),
                    user_id: account.user_id,
                    workspace_id: account.workspace_id,
                    platform: account.platform.clone(),
                    account_id: account.account_id.clone(),
                    account_name: account.account_name.clone(),
                    access_token: account.access_token.clone(),
                    updated_at: Utc::now(),
                };
                t.social_accounts.push(a.clone());
                a
            }
        };
        self.wrote();
        Ok(row)
    }

    // -- Automation --

    async fn get_workflow(&self, id: Uuid) -> anyhow::Result<Option<Workflow>> {
        let t = self.tables.read().await;
        Ok(t.workflows.iter().find(|w| w.id == id).cloned())
    }

    async fn due_report_jobs(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Workflow>> {
        let t = self.tables.read().await;
        Ok(t.workflows
            .iter()
            .filter(|w| w.job_type == "project_report" && w.status == "active")
            .filter(|w| w.next_run.is_some_and(|n| n <= now))
            .cloned()
            .collect())
    }

    async fn mark_job_run(
        &self,
        id: Uuid,
        last_run: DateTime<Utc>,
        next_run: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut t = self.tables.write().await;
        if let Some(w) = t.workflows.iter_mut().find(|w| w.id == id) {
            w.last_run = Some(last_run);
            w.next_run = Some(next_run);
        }
        self.wrote();
        Ok(())
    }

    async fn insert_automation_log(&self, log: &NewAutomationLog) -> anyhow::Result<AutomationLog> {
        let row = AutomationLog {
            id: Uuid::new_v4(),
            workflow_id: log.workflow_id,
            user_id: log.user_id,
            workspace_id: log.workspace_id,
            event_type: log.event_type.clone(),
            status: log.status.clone(),
            message: log.message.clone(),
            metadata: log.metadata.clone(),
            created_at: Utc::now(),
        };
        self.tables.write().await.automation_logs.push(row.clone());
        self.wrote();
        Ok(row)
    }

    async fn insert_webhook_log(&self, log: &NewWebhookLog) -> anyhow::Result<WebhookLog> {
        let row = WebhookLog {
            id: Uuid::new_v4(),
            workflow_id: log.workflow_id,
            user_id: log.user_id,
            method: log.method.clone(),
            headers: log.headers.clone(),
            body: log.body.clone(),
            query: log.query.clone(),
            created_at: Utc::now(),
        };
        self.tables.write().await.webhook_logs.push(row.clone());
        self.wrote();
        Ok(row)
    }

    async fn list_webhook_logs(&self, workflow_id: Uuid, limit: i64) -> anyhow::Result<Vec<WebhookLog>> {
        let t = self.tables.read().await;
        Ok(t.webhook_logs
            .iter()
            .rev()
            .filter(|l| l.workflow_id == workflow_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn insert_workflow_execution(
        &self,
        execution: &NewWorkflowExecution,
    ) -> anyhow::Result<WorkflowExecution> {
        let row = WorkflowExecution {
            id: Uuid::new_v4(),
            workflow_id: execution.workflow_id,
            user_id: execution.user_id,
            trigger_type: execution.trigger_type.clone(),
            status: execution.status.clone(),
            trigger_data: execution.trigger_data.clone(),
            result: execution.result.clone(),
            created_at: Utc::now(),
        };
        self.tables.write().await.executions.push(row.clone());
        self.wrote();
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_domain_reads_are_scoped_and_counted() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let a = store.put_workspace("A", owner).await;
        let b = store.put_workspace("B", owner).await;

        let project = store
            .create_project(
                a.id,
                &NewProject { name: "Acme".into(), status: "active".into(), ..Default::default() },
            )
            .await
            .unwrap();

        assert_eq!(store.list_projects(a.id).await.unwrap().len(), 1);
        assert!(store.list_projects(b.id).await.unwrap().is_empty());
        assert!(store.get_project(b.id, project.id).await.unwrap().is_none());
        assert_eq!(store.domain_read_count(), 3);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_leave_workspace_clears_profile_pointer() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let ws = store.put_workspace("W", Uuid::new_v4()).await;
        store.put_member(ws.id, user, false).await;
        store
            .put_profile(Profile { user_id: user, workspace_id: Some(ws.id), email: None, full_name: None })
            .await;

        assert!(store.leave_workspace(user, ws.id).await.unwrap());
        assert!(store.memberships(user).await.unwrap().is_empty());
        assert_eq!(store.get_profile(user).await.unwrap().unwrap().workspace_id, None);
    }

    #[tokio::test]
    async fn test_social_account_upsert_keeps_one_row() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let ws = store.put_workspace("W", user).await;
        let page = NewSocialAccount {
            user_id: user,
            workspace_id: ws.id,
            platform: "facebook".into(),
            account_id: "123".into(),
            account_name: "Old".into(),
            access_token: Some("t1".into()),
        };
        let first = store.upsert_social_account(&page).await.unwrap();
        let second = store
            .upsert_social_account(&NewSocialAccount { account_name: "New".into(), ..page })
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let all = store.list_social_accounts(ws.id).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].account_name, "New");
    }
}
