use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

const PAGE_SIZE: usize = 100;
const MAX_PAGES: usize = 20;

/// `appsecret_proof`: hex HMAC-SHA256 of the access token keyed by the app secret.
pub fn appsecret_proof(access_token: &str, app_secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(access_token.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Graph API request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Graph API error: {0}")]
    Api(String),
}

/// A Facebook page the user manages, with its page access token.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphPage {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Deserialize)]
struct PageList {
    #[serde(default)]
    data: Vec<GraphPage>,
    #[serde(default)]
    paging: Option<Paging>,
}

#[derive(Deserialize)]
struct Paging {
    cursors: Option<Cursors>,
}

#[derive(Deserialize)]
struct Cursors {
    after: Option<String>,
}

/// Facebook Graph API client. Every authenticated call carries `appsecret_proof`.
#[derive(Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
}

impl GraphClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Pages managed by the token's user (`GET /me/accounts`), following cursors.
    pub async fn list_pages(
        &self,
        access_token: &str,
        app_secret: &str,
    ) -> Result<Vec<GraphPage>, GraphError> {
        let proof = appsecret_proof(access_token, app_secret);
        let mut pages = Vec::new();
        let mut after: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let list = self.accounts_page(access_token, &proof, after.as_deref()).await?;
            let len = list.data.len();
            pages.extend(list.data);
            after = list.paging.and_then(|p| p.cursors).and_then(|c| c.after);
            if len < PAGE_SIZE || after.is_none() {
                break;
            }
        }
        Ok(pages)
    }

    async fn accounts_page(
        &self,
        access_token: &str,
        proof: &str,
        after: Option<&str>,
    ) -> Result<PageList, GraphError> {
        let limit = PAGE_SIZE.to_string();
        let mut query = vec![
            ("fields", "id,name,access_token,category"),
            ("limit", limit.as_str()),
            ("access_token", access_token),
            ("appsecret_proof", proof),
        ];
        if let Some(after) = after {
            query.push(("after", after));
        }

        let resp = self
            .http
            .get(format!("{}/me/accounts", self.base_url))
            .query(&query)
            .send()
            .await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GraphError::Api(body));
        }
        Ok(resp.json().await?)
    }
}
