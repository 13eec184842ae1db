//! Outbound workflow webhooks, signature checks, and `{{variable}}` rendering.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use super::retry::BackoffPolicy;

pub const USER_AGENT: &str = "Solvify-Automation/1.0";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub retry_on_failure: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub data: Value,
}

/// Result of a delivery. Never an error: callers branch on `success`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WebhookOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<WebhookResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
}

#[derive(Debug)]
enum AttemptError {
    Status(WebhookResponse),
    Network(String),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Status(r) => write!(f, "HTTP {}: {}", r.status, r.status_text),
            AttemptError::Network(e) => f.write_str(e),
        }
    }
}

#[derive(Clone)]
pub struct WebhookSender {
    client: reqwest::Client,
    base_delay: Duration,
}

impl WebhookSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_delay: BackoffPolicy::default().base_delay,
        }
    }

    /// Shrinks the backoff unit. Delays keep their doubling shape.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    fn policy(&self, retry: bool) -> BackoffPolicy {
        let policy = if retry {
            BackoffPolicy::default()
        } else {
            BackoffPolicy::once()
        };
        policy.with_base_delay(self.base_delay)
    }

    /// Delivers `req`. With `retry_on_failure` a non-2xx status or network
    /// error is retried up to three attempts in total.
    pub async fn send(&self, req: &WebhookRequest) -> WebhookOutcome {
        let method_name = req.method.as_deref().unwrap_or("POST").to_uppercase();
        let method = match Method::from_bytes(method_name.as_bytes()) {
            Ok(m) => m,
            Err(_) => {
                return WebhookOutcome {
                    success: false,
                    response: None,
                    error: Some(format!("Webhook error: invalid method {method_name}")),
                    attempts: 0,
                }
            }
        };

        let mut headers = HashMap::from([
            ("Content-Type".to_string(), "application/json".to_string()),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
        ]);
        for (k, v) in &req.headers {
            headers.retain(|existing, _| !existing.eq_ignore_ascii_case(k));
            headers.insert(k.clone(), v.clone());
        }

        let body = match (&req.body, matches!(method_name.as_str(), "POST" | "PUT" | "PATCH")) {
            (Some(Value::String(s)), true) => Some(s.clone()),
            (Some(Value::Null), _) | (None, _) | (_, false) => None,
            (Some(v), true) => Some(v.to_string()),
        };

        let policy = self.policy(req.retry_on_failure);
        let (result, attempts) = policy
            .run(
                |attempt| {
                    let method = method.clone();
                    let headers = &headers;
                    let body = body.clone();
                    async move {
                        tracing::debug!(url = %req.url, attempt, "sending webhook");
                        self.attempt(&req.url, method, headers, body).await
                    }
                },
                |_| true,
            )
            .await;

        match result {
            Ok(response) => {
                info!(url = %req.url, attempts, status = response.status, "webhook delivered");
                WebhookOutcome {
                    success: true,
                    response: Some(response),
                    error: None,
                    attempts,
                }
            }
            Err(e) => {
                warn!(url = %req.url, attempts, error = %e, "webhook delivery failed");
                let error = Some(format!("Webhook failed after {attempts} attempts: {e}"));
                let response = match e {
                    AttemptError::Status(r) => Some(r),
                    AttemptError::Network(_) => None,
                };
                WebhookOutcome {
                    success: false,
                    response,
                    error,
                    attempts,
                }
            }
        }
    }

    async fn attempt(
        &self,
        url: &str,
        method: Method,
        headers: &HashMap<String, String>,
        body: Option<String>,
    ) -> Result<WebhookResponse, AttemptError> {
        let mut builder = self.client.request(method, url);
        for (k, v) in headers {
            builder = builder.header(k.as_str(), v.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;

        let status = resp.status();
        let response_headers: HashMap<String, String> = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let is_json = response_headers
            .get("content-type")
            .is_some_and(|ct| ct.contains("application/json"));
        let text = resp
            .text()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;
        let data = if is_json {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        } else {
            Value::String(text)
        };

        let response = WebhookResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers: response_headers,
            data,
        };
        if status.is_success() {
            Ok(response)
        } else {
            Err(AttemptError::Status(response))
        }
    }
}

/// URL an external system calls to trigger a workflow.
pub fn webhook_url(base_url: &str, workflow_id: &str, secret: Option<&str>) -> String {
    let mut url = format!(
        "{}/api/webhooks?workflow_id={}",
        base_url.trim_end_matches('/'),
        workflow_id
    );
    if let Some(secret) = secret {
        url.push_str("&secret=");
        url.push_str(&urlencoding::encode(secret));
    }
    url
}

// ── HMAC Signing ─────────────────────────────────────────────

/// HMAC-SHA256 of `payload` keyed by `secret`, as "sha256=<hex>".
pub fn sign(secret: &str, payload: &[u8]) -> String {
    format!("sha256={}", hmac_hex(secret, payload))
}

/// Constant-time check of a hex signature, with or without the "sha256=" prefix.
pub fn validate_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let given = signature.strip_prefix("sha256=").unwrap_or(signature);
    let expected = hmac_hex(secret, payload);
    expected.as_bytes().ct_eq(given.as_bytes()).into()
}

fn hmac_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

// ── Template variables ───────────────────────────────────────

/// Values available to `{{memory.x}}`, `{{trigger.x}}` and `{{workflow.x}}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateContext {
    #[serde(default)]
    pub memory: Option<Value>,
    #[serde(default)]
    pub trigger: Option<Value>,
    #[serde(default)]
    pub workflow: Option<Value>,
}

static SCOPED_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{(memory|trigger|workflow)\.(\w+)\}\}").expect("valid regex")
});

/// Substitutes template variables. Scoped values are inserted JSON-encoded;
/// unknown keys are left as written.
pub fn render_variables(text: &str, ctx: &TemplateContext, now: DateTime<Utc>) -> String {
    let rendered = SCOPED_VAR.replace_all(text, |caps: &Captures| {
        let scope = match &caps[1] {
            "memory" => ctx.memory.as_ref(),
            "trigger" => ctx.trigger.as_ref(),
            _ => ctx.workflow.as_ref(),
        };
        scope
            .and_then(|s| s.get(&caps[2]))
            .map(Value::to_string)
            .unwrap_or_else(|| caps[0].to_string())
    });

    rendered
        .replace("{{timestamp}}", &now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .replace("{{date}}", &now.format("%Y-%m-%d").to_string())
        .replace("{{time}}", &now.format("%H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_signature_roundtrip() {
        let sig = sign("secret123", b"payload");
        assert!(sig.starts_with("sha256="));
        assert!(validate_signature(b"payload", &sig, "secret123"));
        assert!(validate_signature(b"payload", sig.trim_start_matches("sha256="), "secret123"));
        assert!(!validate_signature(b"payload", &sig, "secret124"));
        assert!(!validate_signature(b"tampered", &sig, "secret123"));
    }

    #[test]
    fn test_render_variables() {
        let ctx = TemplateContext {
            memory: Some(json!({ "count": 3, "name": "Acme" })),
            trigger: Some(json!({ "event": "created" })),
            workflow: None,
        };
        let now = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let out = render_variables(
            "{{memory.name}} x{{memory.count}} on {{trigger.event}} {{workflow.id}} {{memory.missing}} {{date}} {{time}}",
            &ctx,
            now,
        );
        assert_eq!(
            out,
            r#""Acme" x3 on "created" {{workflow.id}} {{memory.missing}} 2024-05-06 07:08:09"#
        );
        assert_eq!(render_variables("{{timestamp}}", &ctx, now), "2024-05-06T07:08:09.000Z");
    }

    #[test]
    fn test_webhook_url_encodes_secret() {
        assert_eq!(
            webhook_url("https://app.solvify.se/", "wf1", Some("a b&c")),
            "https://app.solvify.se/api/webhooks?workflow_id=wf1&secret=a%20b%26c"
        );
    }
}
