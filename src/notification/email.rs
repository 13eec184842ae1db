//! Outbound email: the [`Mailer`] seam, its SMTP implementation, and the
//! HTML project report.

use std::fmt::Write as _;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::record::Task;

const SMTPS_PORT: u16 = 465;
const MAX_UPCOMING: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email build error: {0}")]
    Build(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends `email` and returns its message id.
    async fn send(&self, email: OutgoingEmail) -> Result<String, EmailError>;
}

/// Implicit-TLS SMTP relay authenticated with an app password.
pub struct SmtpMailer {
    host: String,
    user: Option<String>,
    password: Option<String>,
}

impl SmtpMailer {
    pub fn new(host: &str, user: Option<String>, password: Option<String>) -> Self {
        Self {
            host: host.to_string(),
            user,
            password,
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<String, EmailError> {
        let user = self.user.as_deref().ok_or(EmailError::NotConfigured("EMAIL_USER"))?;
        let password = self
            .password
            .as_deref()
            .ok_or(EmailError::NotConfigured("GMAIL_APP_PASSWORD"))?;

        let domain = user.rsplit_once('@').map(|(_, d)| d).unwrap_or("localhost");
        let message_id = format!("<{}@{}>", Uuid::new_v4(), domain);

        let mut builder = Message::builder()
            .from(user.parse()?)
            .subject(email.subject.as_str())
            .message_id(Some(message_id.clone()))
            .header(ContentType::TEXT_HTML);
        for to in &email.to {
            builder = builder.to(to.parse()?);
        }
        let message = builder
            .body(email.html)
            .map_err(|e| EmailError::Build(e.to_string()))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)?
            .port(SMTPS_PORT)
            .credentials(Credentials::new(user.to_string(), password.to_string()))
            .build();
        let response = transport.send(message).await?;

        tracing::info!(
            recipients = email.to.len(),
            reply = response.first_line().unwrap_or_default(),
            "email sent"
        );
        Ok(message_id)
    }
}

/// Keeps sent mail in memory. Used by `serve --in-memory` and tests.
#[derive(Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<String, EmailError> {
        let mut sent = self.sent.lock().await;
        sent.push(email);
        Ok(format!("<memory-{}@solvify.local>", sent.len()))
    }
}

// ── Project report ───────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChecklistItem {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub deadline: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReportTask {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
}

impl From<&Task> for ReportTask {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            deadline: task.deadline.map(|d| d.to_rfc3339()),
            checklist: serde_json::from_value(task.checklist.clone()).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Upcoming {
    pub task: String,
    pub item: String,
    pub deadline: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportStats {
    pub total_tasks: usize,
    /// Tasks whose checklist items are all done.
    pub completed_tasks: usize,
    pub total_items: usize,
    pub completed_items: usize,
    pub progress: u32,
    pub upcoming: Vec<Upcoming>,
}

#[derive(Debug, Clone)]
pub struct ProjectReport {
    pub project_name: String,
    pub tasks: Vec<ReportTask>,
    pub is_test: bool,
}

impl ProjectReport {
    pub fn subject(&self) -> String {
        let prefix = if self.is_test { "[TEST] " } else { "" };
        format!("{prefix}{} - Project Report", self.project_name)
    }

    pub fn stats(&self) -> ReportStats {
        let total_items: usize = self.tasks.iter().map(|t| t.checklist.len()).sum();
        let completed_items: usize = self
            .tasks
            .iter()
            .map(|t| t.checklist.iter().filter(|i| i.done).count())
            .sum();

        let mut upcoming: Vec<(Option<DateTime<Utc>>, Upcoming)> = self
            .tasks
            .iter()
            .flat_map(|task| {
                task.checklist
                    .iter()
                    .filter(|i| !i.done)
                    .filter_map(move |i| {
                        let deadline = i.deadline.clone()?;
                        Some((
                            parse_date(&deadline),
                            Upcoming {
                                task: task.title.clone(),
                                item: i.text.clone(),
                                deadline,
                            },
                        ))
                    })
            })
            .collect();
        // Unparseable dates sort last.
        upcoming.sort_by_key(|(at, _)| (at.is_none(), *at));

        ReportStats {
            total_tasks: self.tasks.len(),
            completed_tasks: self
                .tasks
                .iter()
                .filter(|t| t.checklist.iter().all(|i| i.done))
                .count(),
            total_items,
            completed_items,
            progress: percent(completed_items, total_items),
            upcoming: upcoming
                .into_iter()
                .take(MAX_UPCOMING)
                .map(|(_, u)| u)
                .collect(),
        }
    }

    pub fn render(&self) -> String {
        let stats = self.stats();
        let mut html = String::new();
        let name = escape(&self.project_name);

        let _ = write!(
            html,
            r#"<div style="font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px;">
<h1 style="color: #333;">{name} - Project Report</h1>
<div style="background: #f5f5f5; padding: 20px; border-radius: 8px; margin: 20px 0;">
<h2 style="color: #444;">Overview</h2>
<ul style="list-style: none; padding: 0;">
<li>Total Tasks: {}</li>
<li>Completed Tasks: {}</li>
<li>Total Checklist Items: {}</li>
<li>Completed Items: {}</li>
<li>Overall Progress: {}%</li>
</ul>
</div>
"#,
            stats.total_tasks,
            stats.completed_tasks,
            stats.total_items,
            stats.completed_items,
            stats.progress
        );

        html.push_str(r#"<div style="background: #f5f5f5; padding: 20px; border-radius: 8px; margin: 20px 0;"><h2 style="color: #444;">Task Details</h2>"#);
        for task in &self.tasks {
            let done = task.checklist.iter().filter(|i| i.done).count();
            let progress = percent(done, task.checklist.len());
            let _ = write!(
                html,
                r#"<div style="background: white; padding: 16px; border-radius: 4px; margin-bottom: 16px;"><h3 style="color: #444; margin: 0;">{}</h3><span style="color: #666;">{progress}% Complete</span>"#,
                escape(&task.title)
            );
            if let Some(deadline) = &task.deadline {
                let _ = write!(html, r#"<p style="color: #666;">Deadline: {}</p>"#, display_date(deadline));
            }
            let _ = write!(
                html,
                r#"<div style="background: #eee; height: 8px; border-radius: 4px;"><div style="background: #22c55e; height: 100%; width: {progress}%; border-radius: 4px;"></div></div>"#
            );
            for item in &task.checklist {
                let (color, mark) = if item.done { ("#22c55e", "&#10003;") } else { ("#666", "&#9675;") };
                let _ = write!(
                    html,
                    r#"<div style="padding: 8px 0; border-bottom: 1px solid #eee;"><span style="color: {color};">{mark} {}</span>"#,
                    escape(&item.text)
                );
                if let Some(deadline) = &item.deadline {
                    let _ = write!(html, r#" <span style="color: #666; font-size: 0.9em;">Due: {}</span>"#, display_date(deadline));
                }
                html.push_str("</div>");
            }
            html.push_str("</div>");
        }
        html.push_str("</div>");

        if !stats.upcoming.is_empty() {
            html.push_str(r#"<div style="background: #f5f5f5; padding: 20px; border-radius: 8px; margin: 20px 0;"><h2 style="color: #444;">Upcoming Deadlines</h2><table style="width: 100%; border-collapse: collapse;"><thead><tr><th style="text-align: left;">Task</th><th style="text-align: left;">Item</th><th style="text-align: right;">Deadline</th></tr></thead><tbody>"#);
            for u in &stats.upcoming {
                let _ = write!(
                    html,
                    r#"<tr><td>{}</td><td>{}</td><td style="text-align: right;">{}</td></tr>"#,
                    escape(&u.task),
                    escape(&u.item),
                    display_date(&u.deadline)
                );
            }
            html.push_str("</tbody></table></div>");
        }

        html.push_str(r#"<div style="color: #666; font-size: 0.9em; margin-top: 20px;"><p>This report was automatically generated by Solvify Project Management.</p></div></div>"#);
        html
    }
}

fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round() as u32
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|d| d.and_utc())
        })
}

fn display_date(s: &str) -> String {
    parse_date(s)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| escape(s))
}

/// Minimal HTML escaping for text nodes and attribute values.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(text: &str, done: bool, deadline: Option<&str>) -> ChecklistItem {
        ChecklistItem {
            text: text.into(),
            done,
            deadline: deadline.map(str::to_string),
        }
    }

    fn report() -> ProjectReport {
        ProjectReport {
            project_name: "Acme <Launch>".into(),
            is_test: true,
            tasks: vec![
                ReportTask {
                    title: "Design".into(),
                    deadline: Some("2030-03-01".into()),
                    checklist: vec![item("Wireframes", true, None), item("Mockups", true, None)],
                },
                ReportTask {
                    title: "Build".into(),
                    deadline: None,
                    checklist: vec![
                        item("API", false, Some("2030-05-01")),
                        item("UI", false, Some("2030-04-01T10:00:00Z")),
                        item("Docs", false, Some("whenever")),
                    ],
                },
            ],
        }
    }

    #[test]
    fn test_stats() {
        let stats = report().stats();
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.total_items, 5);
        assert_eq!(stats.completed_items, 2);
        assert_eq!(stats.progress, 40);
        let order: Vec<_> = stats.upcoming.iter().map(|u| u.item.as_str()).collect();
        assert_eq!(order, vec!["UI", "API", "Docs"]);
    }

    #[test]
    fn test_empty_report_has_zero_progress() {
        let r = ProjectReport { project_name: "x".into(), tasks: vec![], is_test: false };
        assert_eq!(r.stats().progress, 0);
        assert_eq!(r.subject(), "x - Project Report");
    }

    #[test]
    fn test_render_escapes_and_lists_deadlines() {
        let r = report();
        let html = r.render();
        assert!(html.contains("Acme &lt;Launch&gt; - Project Report"));
        assert!(!html.contains("<Launch>"));
        assert!(html.contains("Overall Progress: 40%"));
        assert!(html.contains("Upcoming Deadlines"));
        assert!(html.contains("2030-04-01"));
        assert_eq!(r.subject(), "[TEST] Acme <Launch> - Project Report");
    }

    #[test]
    fn test_task_checklist_from_json() {
        let task = Task {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            title: "t".into(),
            status: "todo".into(),
            deadline: None,
            checklist: serde_json::json!([{ "text": "a", "done": true }, { "text": "b" }]),
            created_at: Utc::now(),
        };
        let r = ReportTask::from(&task);
        assert_eq!(r.checklist.len(), 2);
        assert!(!r.checklist[1].done);
    }

    #[tokio::test]
    async fn test_smtp_without_password_is_config_error() {
        let mailer = SmtpMailer::new("smtp.example.com", Some("a@b.se".into()), None);
        let err = mailer
            .send(OutgoingEmail { to: vec!["c@d.se".into()], subject: "s".into(), html: "h".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, EmailError::NotConfigured("GMAIL_APP_PASSWORD")));
    }

    #[tokio::test]
    async fn test_memory_mailer_records() {
        let mailer = MemoryMailer::new();
        let id = mailer
            .send(OutgoingEmail { to: vec!["c@d.se".into()], subject: "s".into(), html: "h".into() })
            .await
            .unwrap();
        assert!(id.starts_with("<memory-1"));
        assert_eq!(mailer.sent().await.len(), 1);
    }
}
