use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::paginate::collect_pages;

pub const INVOICE_PAGE_SIZE: usize = 500;
const MAX_INVOICE_PAGES: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum FortnoxError {
    #[error("Fortnox request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Fortnox API error: {status} - {details}")]
    Api { status: u16, details: String },
}

/// The invoice projection returned by `/api/fortnox/invoices/fetch-year`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct InvoiceSummary {
    #[serde(default, deserialize_with = "lenient_string")]
    pub document_number: String,
    #[serde(default)]
    pub invoice_date: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub balance: f64,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default = "default_currency", deserialize_with = "or_default_currency")]
    pub currency: String,
    #[serde(default = "default_invoice_type")]
    pub invoice_type: String,
    #[serde(default = "default_payment_way")]
    pub payment_way: String,
    #[serde(default, rename = "ExternalInvoiceReference1")]
    pub external_invoice_reference1: String,
}

#[derive(Deserialize)]
struct InvoicePage {
    #[serde(rename = "Invoices", default)]
    invoices: Vec<InvoiceSummary>,
}

/// Fortnox REST v3 client. Every call takes the caller's access token.
#[derive(Clone)]
pub struct FortnoxClient {
    http: reqwest::Client,
    base_url: String,
}

impl FortnoxClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// All invoices dated within `year`, fetched 500 per page.
    pub async fn fetch_invoices_for_year(
        &self,
        access_token: &str,
        year: i32,
    ) -> Result<Vec<InvoiceSummary>, FortnoxError> {
        let from = format!("{year}-01-01");
        let to = format!("{year}-12-31");
        let invoices = collect_pages(INVOICE_PAGE_SIZE, MAX_INVOICE_PAGES, move |page| {
            let (from, to) = (from.clone(), to.clone());
            async move { self.invoice_page(access_token, &from, &to, page).await }
        })
        .await?;
        tracing::info!(year, count = invoices.len(), "fetched Fortnox invoices");
        Ok(invoices)
    }

    async fn invoice_page(
        &self,
        access_token: &str,
        from: &str,
        to: &str,
        page: usize,
    ) -> Result<Vec<InvoiceSummary>, FortnoxError> {
        let limit = INVOICE_PAGE_SIZE.to_string();
        let page_str = page.to_string();
        let resp = self
            .http
            .get(format!("{}/invoices", self.base_url))
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .query(&[
                ("fromdate", from),
                ("todate", to),
                ("limit", limit.as_str()),
                ("page", page_str.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(FortnoxError::Api {
                status: status.as_u16(),
                details: error_details(&text),
            });
        }
        Ok(resp.json::<InvoicePage>().await?.invoices)
    }
}

/// Prefers Fortnox's `ErrorInformation` block over the raw body.
fn error_details(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            let info = v.get("ErrorInformation")?;
            let message = info.get("message").or_else(|| info.get("Message"))?;
            let code = info.get("code").or_else(|| info.get("Code")).cloned().unwrap_or(Value::Null);
            Some(format!("{} (Code: {})", message.as_str().unwrap_or_default(), code))
        })
        .unwrap_or_else(|| body.to_string())
}

fn default_currency() -> String {
    "SEK".into()
}

fn default_invoice_type() -> String {
    "INVOICE".into()
}

fn default_payment_way() -> String {
    "BANK".into()
}

fn or_default_currency<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let v = Option::<String>::deserialize(d)?;
    Ok(v.filter(|s| !s.is_empty()).unwrap_or_else(default_currency))
}

/// Fortnox returns amounts as numbers or numeric strings; anything else is 0.
fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invoice_projection_defaults() {
        let inv: InvoiceSummary = serde_json::from_value(json!({
            "DocumentNumber": "1001",
            "InvoiceDate": "2024-03-01",
            "CustomerName": "Acme AB",
            "Total": "1250.50",
            "Balance": 0,
            "DueDate": "2024-03-31",
            "Currency": null,
            "Sent": true
        }))
        .unwrap();
        assert_eq!(inv.total, 1250.5);
        assert_eq!(inv.currency, "SEK");
        assert_eq!(inv.invoice_type, "INVOICE");
        assert_eq!(inv.payment_way, "BANK");
        assert_eq!(inv.external_invoice_reference1, "");

        let out = serde_json::to_value(&inv).unwrap();
        assert_eq!(out["DocumentNumber"], "1001");
        assert_eq!(out["ExternalInvoiceReference1"], "");
        assert!(out.get("Sent").is_none());
    }

    #[test]
    fn test_error_details_prefers_error_information() {
        let body = r#"{"ErrorInformation":{"error":1,"message":"Invalid token","code":2000311}}"#;
        assert_eq!(error_details(body), "Invalid token (Code: 2000311)");
        assert_eq!(error_details("plain"), "plain");
    }
}
