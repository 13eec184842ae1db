//! Project-creation automation and project report delivery.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use common::{get, json, TestApp, CRON_SECRET};
use solvify::models::automation::Workflow;
use solvify::models::record::{NewProject, Task};
use solvify::store::Store;

fn automation_workflow(user_id: Uuid, workspace_id: Uuid) -> Workflow {
    Workflow {
        id: Uuid::new_v4(),
        user_id,
        workspace_id: Some(workspace_id),
        name: "New client".into(),
        job_type: "workflow".into(),
        status: "active".into(),
        settings: json!({
            "automation_config": {
                "nodes": [{
                    "id": "create-project",
                    "type": "action",
                    "subtype": "project_creation",
                    "data": { "label": "Create project", "project_template": "Kickoff checklist", "auto_assign": false }
                }]
            }
        }),
        next_run: None,
        last_run: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_project_creation_creates_project_and_logs() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let ws = app.store.put_workspace("Acme Group", user).await;
    let token = app.login(user).await;

    let (status, body) = app
        .send(json(
            "POST",
            "/api/automation/project-creation",
            Some(&token),
            json!({
                "workflowId": "wf-1",
                "nodeId": "node-1",
                "projectName": "Acme",
                "userId": user,
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["project"]["name"], "Acme");
    assert_eq!(body["project"]["status"], "active");
    assert_eq!(body["project"]["workspace_id"], json!(ws.id));
    assert_eq!(body["project"]["user_id"], json!(user));
    assert_eq!(body["automation"]["node_id"], "node-1");
    let project_id = body["project"]["id"].clone();

    let logs = app.store.automation_logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].event_type, "project_creation");
    assert_eq!(logs[0].status, "success");
    assert_eq!(logs[0].user_id, user);
    assert_eq!(logs[0].metadata["project_id"], project_id);
    assert_eq!(logs[0].metadata["project_name"], "Acme");

    let projects = app.store.projects().await;
    assert_eq!(projects.len(), 1);
    assert_eq!(json!(projects[0].id), project_id);
}

#[tokio::test]
async fn test_project_creation_uses_node_config() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let ws = app.store.put_workspace("Acme Group", user).await;
    let wf = automation_workflow(user, ws.id);
    let wf_id = wf.id;
    app.store.put_workflow(wf).await;
    let token = app.login(user).await;

    let (status, body) = app
        .send(json(
            "POST",
            "/api/automation/project-creation",
            Some(&token),
            json!({ "workflowId": wf_id, "nodeId": "create-project" }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project"]["description"], "Kickoff checklist");
    assert_eq!(body["project"]["user_id"], Value::Null);
    assert_eq!(body["automation"]["auto_assigned"], false);
    let name = body["project"]["name"].as_str().unwrap();
    assert!(name.starts_with("Automated Project - "), "{name}");

    let logs = app.store.automation_logs().await;
    assert_eq!(logs[0].workflow_id, Some(wf_id));
}

#[tokio::test]
async fn test_project_creation_ignores_other_tenants_workflow() {
    let app = TestApp::new().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let alice_ws = app.store.put_workspace("Alice AB", alice).await;
    let bob_ws = app.store.put_workspace("Bob AB", bob).await;
    let mut wf = automation_workflow(alice, alice_ws.id);
    wf.settings["automation_config"]["nodes"][0]["data"]["project_template"] = json!("Alice internal notes");
    let wf_id = wf.id;
    app.store.put_workflow(wf).await;
    let token = app.login(bob).await;

    let (status, body) = app
        .send(json(
            "POST",
            "/api/automation/project-creation",
            Some(&token),
            json!({ "workflowId": wf_id, "nodeId": "create-project", "projectName": "x" }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project"]["description"], "Project created by automation workflow");
    assert_eq!(body["project"]["workspace_id"], json!(bob_ws.id));
    assert_eq!(body["project"]["user_id"], json!(bob));

    let logs = app.store.automation_logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].workflow_id, None);
    assert_eq!(logs[0].workspace_id, Some(bob_ws.id));
}

#[tokio::test]
async fn test_project_creation_skips_nodes_of_other_subtypes() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let ws = app.store.put_workspace("Acme Group", user).await;
    let mut wf = automation_workflow(user, ws.id);
    wf.settings["automation_config"]["nodes"][0]["subtype"] = json!("send_email");
    let wf_id = wf.id;
    app.store.put_workflow(wf).await;
    let token = app.login(user).await;

    let (status, body) = app
        .send(json(
            "POST",
            "/api/automation/project-creation",
            Some(&token),
            json!({ "workflowId": wf_id, "nodeId": "create-project" }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project"]["description"], "Project created by automation workflow");
    assert_eq!(body["automation"]["auto_assigned"], true);
}

#[tokio::test]
async fn test_project_creation_rejects_other_user_id() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    app.store.put_workspace("Acme Group", user).await;
    let token = app.login(user).await;

    let (status, _) = app
        .send(json(
            "POST",
            "/api/automation/project-creation",
            Some(&token),
            json!({ "projectName": "Acme", "userId": Uuid::new_v4() }),
        ))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(app.store.projects().await.is_empty());
    assert!(app.store.automation_logs().await.is_empty());
}

#[tokio::test]
async fn test_send_project_report_emails_recipients() {
    let app = TestApp::new().await;
    let token = app.login(Uuid::new_v4()).await;

    let (status, body) = app
        .send(json(
            "POST",
            "/api/send-project-report",
            Some(&token),
            json!({
                "projectName": "Website <relaunch>",
                "isTest": true,
                "recipients": ["pm@acme.se"],
                "tasks": [{
                    "title": "Design",
                    "checklist": [
                        { "text": "Wireframes", "done": true },
                        { "text": "Mockups", "done": false, "deadline": "2030-01-10" }
                    ]
                }]
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["messageId"], "<memory-1@solvify.local>");

    let sent = app.mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["pm@acme.se".to_string()]);
    assert!(sent[0].subject.starts_with("[TEST] "));
    assert!(sent[0].html.contains("Website &lt;relaunch&gt;"));
    assert!(sent[0].html.contains("Mockups"));
}

#[tokio::test]
async fn test_send_project_report_requires_fields() {
    let app = TestApp::new().await;
    let token = app.login(Uuid::new_v4()).await;

    let (status, body) = app
        .send(json(
            "POST",
            "/api/send-project-report",
            Some(&token),
            json!({ "projectName": "P", "tasks": [] }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing required fields");
    assert!(app.mailer.sent().await.is_empty());
}

#[tokio::test]
async fn test_cron_sends_due_reports_and_reschedules() {
    let app = TestApp::new().await;
    let owner = Uuid::new_v4();
    let ws = app.store.put_workspace("Acme Group", owner).await;
    let project = app
        .store
        .create_project(
            ws.id,
            &NewProject {
                name: "Relaunch".into(),
                description: None,
                status: "active".into(),
                user_id: Some(owner),
                end_date: None,
            },
        )
        .await
        .unwrap();
    app.store
        .put_task(Task {
            id: Uuid::new_v4(),
            project_id: project.id,
            title: "Copy".into(),
            status: "open".into(),
            deadline: None,
            checklist: json!([{ "text": "Draft", "done": true }]),
            created_at: Utc::now(),
        })
        .await;

    let due = Workflow {
        id: Uuid::new_v4(),
        user_id: owner,
        workspace_id: Some(ws.id),
        name: "Weekly report".into(),
        job_type: "project_report".into(),
        status: "active".into(),
        settings: json!({ "project_id": project.id, "recipients": ["ceo@acme.se", "pm@acme.se"] }),
        next_run: Some(Utc::now() - Duration::minutes(5)),
        last_run: None,
        created_at: Utc::now(),
    };
    let due_id = due.id;
    app.store.put_workflow(due).await;

    let broken = Workflow {
        id: Uuid::new_v4(),
        settings: json!({ "recipients": ["x@acme.se"] }),
        name: "No project".into(),
        ..app.store.get_workflow(due_id).await.unwrap().unwrap()
    };
    app.store.put_workflow(broken).await;

    let (status, body) = app
        .send(get("/api/cron/send-project-reports", Some(CRON_SECRET)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["successful"], 1);
    assert_eq!(body["failed"], 1);

    let sent = app.mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to.len(), 2);
    assert!(sent[0].subject.contains("Relaunch"));

    let job = app.store.get_workflow(due_id).await.unwrap().unwrap();
    assert!(job.last_run.is_some());
    assert!(job.next_run.unwrap() > Utc::now() + Duration::days(6));

    // Nothing is due any more.
    let (_, body) = app
        .send(get("/api/cron/send-project-reports", Some(CRON_SECRET)))
        .await;
    assert_eq!(body["successful"], 0);
    assert_eq!(body["failed"], 1);
}
