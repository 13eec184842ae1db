use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// `subtype` of the workflow node that creates projects.
pub const PROJECT_CREATION_SUBTYPE: &str = "project_creation";

/// A row of `cron_jobs`. Holds both automation workflows
/// (`job_type = "workflow"`) and scheduled report jobs
/// (`job_type = "project_report"`).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Workflow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub name: String,
    pub job_type: String,
    pub status: String,
    pub settings: serde_json::Value,
    pub next_run: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// A node under `settings.automation_config.nodes`.
    pub fn node(&self, node_id: &str) -> Option<&Value> {
        self.settings
            .pointer("/automation_config/nodes")?
            .as_array()?
            .iter()
            .find(|n| n.get("id").and_then(Value::as_str) == Some(node_id))
    }

    /// A node's settings. Keys set directly on `data` win over `data.config`,
    /// which wins over a top-level `config`.
    pub fn node_config(&self, node_id: &str) -> Option<Value> {
        self.node(node_id).map(node_settings)
    }

    /// Settings of a node only if it is a project-creation node.
    pub fn project_creation_config(&self, node_id: &str) -> Option<Value> {
        self.node(node_id)
            .filter(|n| n.get("subtype").and_then(Value::as_str) == Some(PROJECT_CREATION_SUBTYPE))
            .map(node_settings)
    }

    /// The shared secret inbound webhooks must present, if one is set.
    pub fn webhook_secret(&self) -> Option<&str> {
        self.settings
            .pointer("/webhook_secret")
            .or_else(|| self.settings.pointer("/automation_config/webhook_secret"))
            .and_then(|v| v.as_str())
    }
}

fn node_settings(node: &Value) -> Value {
    let mut merged = Map::new();
    for layer in [node.get("config"), node.pointer("/data/config"), node.get("data")] {
        if let Some(Value::Object(map)) = layer {
            for (k, v) in map {
                if k != "config" {
                    merged.insert(k.clone(), v.clone());
                }
            }
        }
    }
    Value::Object(merged)
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AutomationLog {
    pub id: Uuid,
    pub workflow_id: Option<Uuid>,
    pub user_id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub event_type: String,
    pub status: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAutomationLog {
    pub workflow_id: Option<Uuid>,
    pub user_id: Uuid,
    pub workspace_id: Option<Uuid>,
    pub event_type: String,
    pub status: String,
    pub message: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookLog {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub user_id: Uuid,
    pub method: String,
    pub headers: serde_json::Value,
    pub body: serde_json::Value,
    pub query: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWebhookLog {
    pub workflow_id: Uuid,
    pub user_id: Uuid,
    pub method: String,
    pub headers: serde_json::Value,
    pub body: serde_json::Value,
    pub query: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub user_id: Uuid,
    pub trigger_type: String,
    pub status: String,
    pub trigger_data: serde_json::Value,
    pub result: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWorkflowExecution {
    pub workflow_id: Uuid,
    pub user_id: Uuid,
    pub trigger_type: String,
    pub status: String,
    pub trigger_data: serde_json::Value,
    pub result: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow(settings: serde_json::Value) -> Workflow {
        Workflow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            workspace_id: None,
            name: "wf".into(),
            job_type: "workflow".into(),
            status: "active".into(),
            settings,
            next_run: None,
            last_run: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_node_config_reads_data_keys_first() {
        let wf = workflow(json!({
            "automation_config": { "nodes": [{
                "id": "n",
                "subtype": "project_creation",
                "data": {
                    "project_template": "Kickoff checklist",
                    "auto_assign": false,
                    "config": { "project_template": "shadowed", "extra": 1 }
                }
            }]}
        }));
        let config = wf.node_config("n").unwrap();
        assert_eq!(config["project_template"], "Kickoff checklist");
        assert_eq!(config["auto_assign"], false);
        assert_eq!(config["extra"], 1);
        assert!(config.get("config").is_none());
    }

    #[test]
    fn test_project_creation_config_requires_subtype() {
        let wf = workflow(json!({
            "automation_config": { "nodes": [
                { "id": "a", "subtype": "project_creation", "data": { "project_template": "T" } },
                { "id": "b", "subtype": "send_email", "data": { "project_template": "T" } },
                { "id": "c", "data": { "project_template": "T" } }
            ]}
        }));
        assert_eq!(wf.project_creation_config("a").unwrap()["project_template"], "T");
        assert!(wf.project_creation_config("b").is_none());
        assert!(wf.project_creation_config("c").is_none());
        assert!(wf.node_config("b").is_some());
    }

    #[test]
    fn test_node_config_reads_data_config() {
        let wf = workflow(json!({
            "automation_config": { "nodes": [
                { "id": "n1", "data": { "config": { "autoAssign": true } } },
                { "id": "n2", "config": { "url": "https://example.com" } }
            ]}
        }));
        assert_eq!(wf.node_config("n1").unwrap()["autoAssign"], true);
        assert_eq!(wf.node_config("n2").unwrap()["url"], "https://example.com");
        assert!(wf.node_config("n3").is_none());
    }

    #[test]
    fn test_webhook_secret_lookup() {
        assert_eq!(workflow(json!({ "webhook_secret": "s3" })).webhook_secret(), Some("s3"));
        assert_eq!(workflow(json!({})).webhook_secret(), None);
    }
}
