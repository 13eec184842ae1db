use async_trait::async_trait;

use super::traits::{OAuthProvider, TokenSet};
use super::{urlencode, ProviderError};

const AUTHORIZE_URL: &str = "https://twitter.com/i/oauth2/authorize";

/// X (Twitter) OAuth 2.0 with PKCE.
///
/// Quirks:
/// - PKCE is mandatory; only S256 challenges are issued.
/// - The token endpoint requires Basic auth (client_id:client_secret).
/// - Refresh tokens are only returned when `offline.access` is granted.
pub struct XProvider {
    client_id: String,
    client_secret: String,
    token_url: String,
    http: reqwest::Client,
}

impl XProvider {
    pub fn new(client_id: String, client_secret: String, token_url: String, http: reqwest::Client) -> Self {
        Self {
            client_id,
            client_secret,
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
            return Err(ProviderError::from_response("x", status, body));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl OAuthProvider for XProvider {
    fn id(&self) -> &str {
        "x"
    }

    fn display_name(&self) -> &str {
        "X (Twitter)"
    }

    fn default_scopes(&self) -> Vec<String> {
        ["tweet.read", "tweet.write", "users.read", "offline.access"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn auth_url(
        &self,
        scopes: &[String],
        state: &str,
        redirect_uri: &str,
        code_challenge: Option<&str>,
    ) -> String {
        let mut url = format!(
            "{AUTHORIZE_URL}?response_type=code&client_id={client_id}&redirect_uri={redirect_uri}\
             &scope={scope}&state={state}",
            client_id = urlencode(&self.client_id),
            redirect_uri = urlencode(redirect_uri),
            scope = urlencode(&scopes.join(" ")),
            state = urlencode(state),
        );
        if let Some(challenge) = code_challenge {
            url.push_str(&format!(
                "&code_challenge={}&code_challenge_method=S256",
                urlencode(challenge)
            ));
        }
        url
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenSet, ProviderError> {
        self.token_request(&[
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier.unwrap_or_default()),
        ])
        .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, ProviderError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    fn supports_pkce(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_auth_url_uses_s256() {
        let p = XProvider::new("cid".into(), "s".into(), "http://unused".into(), reqwest::Client::new());
        let url = p.auth_url(&p.default_scopes(), "st", "https://app/cb", Some("abc"));
        assert!(url.contains("code_challenge=abc"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("offline.access"));
    }

    #[tokio::test]
    async fn test_exchange_sends_verifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("code_verifier=v123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "xa",
                "token_type": "bearer",
                "expires_in": 7200,
                "refresh_token": "xr",
                "scope": "tweet.read"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let p = XProvider::new("cid".into(), "s".into(), server.uri(), reqwest::Client::new());
        let set = p.exchange_code("code", "https://app/cb", Some("v123")).await.unwrap();
        assert_eq!(set.access_token, "xa");
    }
}
