use std::collections::HashMap;

use super::fortnox::FortnoxProvider;
use super::google::GoogleProvider;
use super::traits::OAuthProvider;
use super::x::XProvider;
use crate::config::Config;
use crate::errors::AppError;

/// Registry of configured OAuth providers, keyed by provider ID.
pub struct ProviderRegistry {
    providers: HashMap<String, Box<dyn OAuthProvider>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Registers every provider whose client credentials are present.
    pub fn from_config(cfg: &Config, http: &reqwest::Client) -> Self {
        let mut registry = Self::new();
        if let (Some(id), Some(secret)) = (&cfg.fortnox_client_id, &cfg.fortnox_client_secret) {
            registry.register(Box::new(FortnoxProvider::new(
                id.clone(),
                secret.clone(),
                cfg.fortnox_auth_url.clone(),
                cfg.fortnox_token_url.clone(),
                http.clone(),
            )));
        }
        if let (Some(id), Some(secret)) = (&cfg.google_client_id, &cfg.google_client_secret) {
            registry.register(Box::new(GoogleProvider::new(
                id.clone(),
                secret.clone(),
                cfg.google_token_url.clone(),
                http.clone(),
            )));
        }
        if let (Some(id), Some(secret)) = (&cfg.twitter_client_id, &cfg.twitter_client_secret) {
            registry.register(Box::new(XProvider::new(
                id.clone(),
                secret.clone(),
                cfg.twitter_token_url.clone(),
                http.clone(),
            )));
        }
        registry
    }

    pub fn register(&mut self, provider: Box<dyn OAuthProvider>) {
        let id = provider.id().to_string();
        self.providers.insert(id, provider);
    }

    pub fn get(&self, id: &str) -> Option<&dyn OAuthProvider> {
        self.providers.get(id).map(|p| p.as_ref())
    }

    /// Resolves the provider that issues tokens for a stored service name.
    ///
    /// Unknown services are a bad request; known but unconfigured ones are a
    /// configuration error naming the missing variable.
    pub fn for_service(&self, service_name: &str) -> Result<&dyn OAuthProvider, AppError> {
        let (id, var) = provider_for_service(service_name).ok_or_else(|| {
            AppError::BadRequest(format!("Unsupported service: {service_name}"))
        })?;
        self.get(id).ok_or(AppError::Config(var))
    }

    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|k| k.as_str()).collect()
    }
}

/// Maps a `settings.service_name` to a provider id and the env var that enables it.
pub fn provider_for_service(service_name: &str) -> Option<(&'static str, &'static str)> {
    match service_name {
        "fortnox" => Some(("fortnox", "FORTNOX_CLIENT_ID")),
        "twitter" | "x" => Some(("x", "TWITTER_CLIENT_ID")),
        s if s == "google" || s.starts_with("google-") => Some(("google", "GOOGLE_CLIENT_ID")),
        _ => None,
    }
}

/// Human-readable service name for error messages, e.g. "Google Drive".
pub fn display_service(service_name: &str) -> String {
    service_name
        .split(['-', '_'])
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
