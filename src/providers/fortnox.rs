use async_trait::async_trait;

use super::traits::{OAuthProvider, TokenSet};
use super::{urlencode, ProviderError};

/// Fortnox accounting.
///
/// Access tokens live one hour. Refresh tokens rotate on every refresh, so
/// the returned refresh token must always replace the stored one.
pub struct FortnoxProvider {
    client_id: String,
    client_secret: String,
    auth_url: String,
    token_url: String,
    http: reqwest::Client,
}

impl FortnoxProvider {
    pub fn new(
        client_id: String,
        client_secret: String,
        auth_url: String,
        token_url: String,
        http: reqwest::Client,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            auth_url,
            token_url,
            http,
        }
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenSet, ProviderError> {
        let resp = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_response("fortnox", status, body));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl OAuthProvider for FortnoxProvider {
    fn id(&self) -> &str {
        "fortnox"
    }

    fn display_name(&self) -> &str {
        "Fortnox"
    }

    fn default_scopes(&self) -> Vec<String> {
        ["invoice", "customer", "companyinformation", "bookkeeping"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn auth_url(
        &self,
        scopes: &[String],
        state: &str,
        redirect_uri: &str,
        _code_challenge: Option<&str>,
    ) -> String {
        format!(
            "{base}?client_id={client_id}&redirect_uri={redirect_uri}&scope={scope}&state={state}\
             &access_type=offline&response_type=code",
            base = self.auth_url,
            client_id = urlencode(&self.client_id),
            redirect_uri = urlencode(redirect_uri),
            scope = urlencode(&scopes.join(" ")),
            state = urlencode(state),
        )
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        _code_verifier: Option<&str>,
    ) -> Result<TokenSet, ProviderError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, ProviderError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> FortnoxProvider {
        FortnoxProvider::new(
            "cid".into(),
            "secret".into(),
            "https://apps.fortnox.se/oauth-v1/auth".into(),
            format!("{}/oauth-v1/token", server.uri()),
            reqwest::Client::new(),
        )
    }

    #[tokio::test]
    async fn test_refresh_posts_refresh_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth-v1/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=r1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "a2",
                "refresh_token": "r2",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let set = provider(&server).refresh_token("r1").await.unwrap();
        assert_eq!(set.access_token, "a2");
        assert_eq!(set.refresh_token.as_deref(), Some("r2"));
        assert_eq!(set.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn test_invalid_grant_needs_reauth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
            )
            .mount(&server)
            .await;

        let err = provider(&server).refresh_token("stale").await.unwrap_err();
        assert!(err.needs_reauth());
    }

    #[test]
    fn test_auth_url_carries_state() {
        let p = FortnoxProvider::new(
            "cid".into(),
            "s".into(),
            "https://apps.fortnox.se/oauth-v1/auth".into(),
            "https://apps.fortnox.se/oauth-v1/token".into(),
            reqwest::Client::new(),
        );
        let url = p.auth_url(&p.default_scopes(), "st.sig", "https://app/cb", None);
        assert!(url.starts_with("https://apps.fortnox.se/oauth-v1/auth?client_id=cid"));
        assert!(url.contains("state=st.sig"));
        assert!(url.contains("scope=invoice+customer"));
    }
}
