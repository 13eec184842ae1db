use async_trait::async_trait;

use super::traits::{OAuthProvider, TokenSet};
use super::{urlencode, ProviderError};

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google OAuth 2.0, shared by the `google-*` services (Drive, Gmail, Calendar).
///
/// Refresh responses omit `refresh_token`; the stored one stays valid.
pub struct GoogleProvider {
    client_id: String,
    client_secret: String,
    token_url: String,
    http: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(client_id: String, client_secret: String, token_url: String, http: reqwest::Client) -> Self {
        Self {
            client_id,
            client_secret,
            token_url,
            http,
        }
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenSet, ProviderError> {
        let resp = self.http.post(&self.token_url).form(form).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_response("google", status, body));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn id(&self) -> &str {
        "google"
    }

    fn display_name(&self) -> &str {
        "Google"
    }

    fn default_scopes(&self) -> Vec<String> {
        vec![
            "https://www.googleapis.com/auth/drive.readonly".into(),
            "https://www.googleapis.com/auth/userinfo.email".into(),
        ]
    }

    fn auth_url(
        &self,
        scopes: &[String],
        state: &str,
        redirect_uri: &str,
        _code_challenge: Option<&str>,
    ) -> String {
        format!(
            "{AUTHORIZE_URL}?client_id={client_id}&redirect_uri={redirect_uri}&response_type=code\
             &scope={scope}&state={state}&access_type=offline&prompt=consent",
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
            ("code", code),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, ProviderError> {
        self.token_request(&[
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }
}
