//! Solvify CRM API: authentication, workspace scoping, and third-party
//! integrations behind one axum router.

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod notification;
pub mod providers;
pub mod store;
pub mod upstream;
pub mod vault;

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};

use notification::email::Mailer;
use notification::webhook::WebhookSender;
use providers::registry::ProviderRegistry;
use store::Store;
use upstream::fortnox::FortnoxClient;
use upstream::graph::GraphClient;
use upstream::supabase::SupabaseAuth;
use vault::CredentialVault;

/// Shared application state passed to handlers and extractors.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: config::Config,
    pub auth: SupabaseAuth,
    pub vault: CredentialVault,
    pub webhooks: WebhookSender,
    pub mailer: Arc<dyn Mailer>,
    pub fortnox: FortnoxClient,
    pub graph: GraphClient,
}

impl AppState {
    /// Builds every client from `config`. Nothing here touches the network.
    pub fn new(
        config: config::Config,
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
    ) -> anyhow::Result<Self> {
        let http = upstream::http_client()?;
        let providers = Arc::new(ProviderRegistry::from_config(&config, &http));
        tracing::info!(providers = ?providers.list(), "OAuth providers registered");

        Ok(Self {
            auth: SupabaseAuth::new(
                http.clone(),
                &config.supabase_url,
                config.supabase_service_role_key.clone(),
            ),
            vault: CredentialVault::new(store.clone(), providers),
            webhooks: WebhookSender::new(http.clone()),
            fortnox: FortnoxClient::new(http.clone(), &config.fortnox_api_url),
            graph: GraphClient::new(http, &config.graph_api_url),
            store,
            mailer,
            config,
        })
    }
}

/// The full HTTP application: routes plus the cross-cutting layers.
pub fn app(state: Arc<AppState>) -> Router {
    let dashboard_origin = state.config.dashboard_origin.clone();

    api::router()
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
                    let origin = origin.to_str().unwrap_or("");
                    origin == dashboard_origin
                        || origin.starts_with("http://localhost:")
                        || origin.starts_with("http://127.0.0.1:")
                }))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::PATCH,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    HeaderName::from_static("content-type"),
                    HeaderName::from_static("authorization"),
                    HeaderName::from_static("x-workspace-id"),
                    HeaderName::from_static("x-request-id"),
                ])
                .allow_credentials(true),
        )
        .layer(axum::middleware::from_fn(api::request_id_middleware))
        .layer(axum::middleware::from_fn(api::security_headers_middleware))
}
