use serde::Deserialize;
use uuid::Uuid;

/// The fields of a Supabase Auth user we rely on.
#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Verifies Supabase-issued access tokens against the Auth server.
#[derive(Clone)]
pub struct SupabaseAuth {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl SupabaseAuth {
    pub fn new(http: reqwest::Client, url: &str, api_key: Option<String>) -> Self {
        Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Looks up the user owning `access_token`. Any rejection or transport
    /// failure yields `None`.
    pub async fn get_user(&self, access_token: &str) -> Option<SupabaseUser> {
        let mut req = self
            .http
            .get(format!("{}/auth/v1/user", self.url))
            .bearer_auth(access_token);
        if let Some(key) = &self.api_key {
            req = req.header("apikey", key);
        }

        match req.send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<SupabaseUser>().await {
                Ok(user) => Some(user),
                Err(e) => {
                    tracing::warn!(error = %e, "unreadable Supabase user response");
                    None
                }
            },
            Ok(resp) => {
                tracing::debug!(status = %resp.status(), "Supabase rejected bearer token");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Supabase auth lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_valid_token_resolves_user() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer good"))
            .and(header("apikey", "service-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": id, "email": "a@b.se" })),
            )
            .mount(&server)
            .await;

        let auth = SupabaseAuth::new(reqwest::Client::new(), &server.uri(), Some("service-key".into()));
        let user = auth.get_user("good").await.unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.email.as_deref(), Some("a@b.se"));
    }

    #[tokio::test]
    async fn test_rejected_token_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let auth = SupabaseAuth::new(reqwest::Client::new(), &server.uri(), None);
        assert!(auth.get_user("bad").await.is_none());
    }
}
