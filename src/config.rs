use crate::errors::AppError;

/// Runtime configuration. Secrets are optional at load time and checked at
/// first use through [`Config::require`], so a missing integration secret
/// only breaks the endpoints that need it.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub supabase_url: String,
    pub supabase_service_role_key: Option<String>,
    pub nextauth_secret: Option<String>,
    pub cron_secret: Option<String>,
    /// Key for signed service-to-service calls. Falls back to CRON_SECRET.
    pub service_secret: Option<String>,
    /// Key for OAuth `state` signing. Falls back to NEXTAUTH_SECRET.
    pub oauth_state_secret: Option<String>,
    pub facebook_app_secret: Option<String>,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub twitter_client_id: Option<String>,
    pub twitter_client_secret: Option<String>,
    pub fortnox_client_id: Option<String>,
    pub fortnox_client_secret: Option<String>,
    pub email_user: Option<String>,
    pub gmail_app_password: Option<String>,
    pub smtp_host: String,
    pub site_url: String,
    pub dashboard_origin: String,

    // Upstream base URLs, overridable for staging and tests.
    pub fortnox_api_url: String,
    pub fortnox_auth_url: String,
    pub fortnox_token_url: String,
    pub graph_api_url: String,
    pub google_token_url: String,
    pub twitter_token_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: "postgres://localhost/solvify".into(),
            supabase_url: "http://localhost:54321".into(),
            supabase_service_role_key: None,
            nextauth_secret: None,
            cron_secret: None,
            service_secret: None,
            oauth_state_secret: None,
            facebook_app_secret: None,
            google_client_id: None,
            google_client_secret: None,
            twitter_client_id: None,
            twitter_client_secret: None,
            fortnox_client_id: None,
            fortnox_client_secret: None,
            email_user: None,
            gmail_app_password: None,
            smtp_host: "smtp.gmail.com".into(),
            site_url: "http://localhost:3000".into(),
            dashboard_origin: "http://localhost:3000".into(),
            fortnox_api_url: "https://api.fortnox.se/3".into(),
            fortnox_auth_url: "https://apps.fortnox.se/oauth-v1/auth".into(),
            fortnox_token_url: "https://apps.fortnox.se/oauth-v1/token".into(),
            graph_api_url: "https://graph.facebook.com/v18.0".into(),
            google_token_url: "https://oauth2.googleapis.com/token".into(),
            twitter_token_url: "https://api.twitter.com/2/oauth2/token".into(),
        }
    }
}

impl Config {
    /// Returns the value or a configuration error naming the variable.
    pub fn require<'a>(value: &'a Option<String>, var: &'static str) -> Result<&'a str, AppError> {
        value
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or(AppError::Config(var))
    }

    pub fn service_secret(&self) -> Option<&str> {
        self.service_secret
            .as_deref()
            .or(self.cron_secret.as_deref())
    }

    pub fn oauth_state_secret(&self) -> Result<&str, AppError> {
        self.oauth_state_secret
            .as_deref()
            .or(self.nextauth_secret.as_deref())
            .ok_or(AppError::Config("OAUTH_STATE_SECRET"))
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let defaults = Config::default();
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
    let or_default = |name: &str, default: String| var(name).unwrap_or(default);

    Ok(Config {
        port: std::env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.port),
        database_url: or_default("DATABASE_URL", defaults.database_url),
        supabase_url: var("NEXT_PUBLIC_SUPABASE_URL")
            .or_else(|| var("SUPABASE_URL"))
            .unwrap_or(defaults.supabase_url),
        supabase_service_role_key: var("SUPABASE_SERVICE_ROLE_KEY"),
        nextauth_secret: var("NEXTAUTH_SECRET"),
        cron_secret: var("CRON_SECRET"),
        service_secret: var("SERVICE_SECRET"),
        oauth_state_secret: var("OAUTH_STATE_SECRET"),
        facebook_app_secret: var("FACEBOOK_APP_SECRET").or_else(|| var("META_CLIENT_SECRET")),
        google_client_id: var("GOOGLE_CLIENT_ID"),
        google_client_secret: var("GOOGLE_CLIENT_SECRET"),
        twitter_client_id: var("TWITTER_CLIENT_ID"),
        twitter_client_secret: var("TWITTER_CLIENT_SECRET"),
        fortnox_client_id: var("FORTNOX_CLIENT_ID"),
        fortnox_client_secret: var("FORTNOX_CLIENT_SECRET"),
        email_user: var("EMAIL_USER"),
        gmail_app_password: var("GMAIL_APP_PASSWORD"),
        smtp_host: or_default("SMTP_HOST", defaults.smtp_host),
        site_url: or_default("NEXT_PUBLIC_SITE_URL", defaults.site_url),
        dashboard_origin: or_default("DASHBOARD_ORIGIN", defaults.dashboard_origin),
        fortnox_api_url: or_default("FORTNOX_API_URL", defaults.fortnox_api_url),
        fortnox_auth_url: or_default("FORTNOX_AUTH_URL", defaults.fortnox_auth_url),
        fortnox_token_url: or_default("FORTNOX_TOKEN_URL", defaults.fortnox_token_url),
        graph_api_url: or_default("GRAPH_API_URL", defaults.graph_api_url),
        google_token_url: or_default("GOOGLE_TOKEN_URL", defaults.google_token_url),
        twitter_token_url: or_default("TWITTER_TOKEN_URL", defaults.twitter_token_url),
    })
}
