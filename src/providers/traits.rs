use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ProviderError;

/// Tokens returned by a provider after code exchange or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
}

impl TokenSet {
    /// Absolute expiry computed from `expires_in`, relative to `now`.
    /// `None` when the provider sent no lifetime or one that overflows.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let lifetime = chrono::Duration::try_seconds(self.expires_in?)?;
        now.checked_add_signed(lifetime)
    }
}

/// One OAuth 2.0 authorization server.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Provider identifier, e.g. "fortnox".
    fn id(&self) -> &str;

    fn display_name(&self) -> &str;

    fn default_scopes(&self) -> Vec<String>;

    /// Authorization URL the user is redirected to. `code_challenge` is the
    /// S256 PKCE challenge for providers that require one.
    fn auth_url(
        &self,
        scopes: &[String],
        state: &str,
        redirect_uri: &str,
        code_challenge: Option<&str>,
    ) -> String;

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenSet, ProviderError>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, ProviderError>;

    fn supports_pkce(&self) -> bool {
        false
    }
}
