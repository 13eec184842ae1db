use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use solvify::cli::{self, Commands, CredentialCommands};
use solvify::config::Config;
use solvify::notification::email::{Mailer, MemoryMailer, SmtpMailer};
use solvify::store::memory::MemoryStore;
use solvify::store::postgres::PgStore;
use solvify::store::Store;
use solvify::{jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let cfg = solvify::config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(Commands::Serve { port, in_memory }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port, in_memory).await
        }
        Some(Commands::Migrate) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            db.migrate().await?;
            tracing::info!("Migrations applied");
            Ok(())
        }
        Some(Commands::Credential { command }) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            let mailer = mailer_for(&cfg, false);
            let state = build_state(cfg, Arc::new(db), mailer)?;
            handle_credential_command(command, &state).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port, false).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

/// fmt logging, plus an OTLP exporter when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
fn init_tracing() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "solvify-api"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "solvify=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();
    Ok(())
}

/// `--in-memory` keeps outgoing mail in process instead of relaying it.
fn mailer_for(cfg: &Config, in_memory: bool) -> Arc<dyn Mailer> {
    if in_memory {
        return Arc::new(MemoryMailer::new());
    }
    Arc::new(SmtpMailer::new(
        &cfg.smtp_host,
        cfg.email_user.clone(),
        cfg.gmail_app_password.clone(),
    ))
}

fn build_state(cfg: Config, store: Arc<dyn Store>, mailer: Arc<dyn Mailer>) -> anyhow::Result<Arc<AppState>> {
    Ok(Arc::new(AppState::new(cfg, store, mailer)?))
}

async fn run_server(cfg: Config, port: u16, in_memory: bool) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = if in_memory {
        tracing::warn!("Using in-memory store and mailer; data and outgoing mail are lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        tracing::info!("Connecting to database...");
        let db = PgStore::connect(&cfg.database_url).await?;
        tracing::info!("Running migrations...");
        db.migrate().await?;
        Arc::new(db)
    };
    let mailer = mailer_for(&cfg, in_memory);

    let state = build_state(cfg, store, mailer)?;

    jobs::refresh::spawn(state.clone());
    tracing::info!("Background token refresh job started (every 30m)");

    let app = solvify::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Solvify API listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn handle_credential_command(cmd: CredentialCommands, state: &AppState) -> anyhow::Result<()> {
    match cmd {
        CredentialCommands::Status { user, service } => {
            let status = state.vault.status(user, &service).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        CredentialCommands::Refresh { user, service } => {
            let current = state
                .vault
                .load_token(user, &service)
                .await?
                .with_context(|| format!("no {service} credential for user {user}"))?;
            let token = state
                .vault
                .refresh(user, &service, &current)
                .await?;
            println!("Refreshed {service} token for {user}");
            if let Some(exp) = token.expires_at {
                println!("  expires at {}", exp.to_rfc3339());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use solvify::notification::email::{EmailError, OutgoingEmail};

    #[tokio::test]
    async fn test_in_memory_mailer_needs_no_smtp_credentials() {
        let mailer = mailer_for(&Config::default(), true);
        let id = mailer
            .send(OutgoingEmail {
                to: vec!["pm@acme.se".into()],
                subject: "Weekly report".into(),
                html: "<p>ok</p>".into(),
            })
            .await
            .unwrap();
        assert_eq!(id, "<memory-1@solvify.local>");
    }

    #[tokio::test]
    async fn test_smtp_mailer_without_credentials_is_not_configured() {
        let mailer = mailer_for(&Config::default(), false);
        let result = mailer
            .send(OutgoingEmail {
                to: vec!["pm@acme.se".into()],
                subject: "Weekly report".into(),
                html: "<p>ok</p>".into(),
            })
            .await;
        assert!(matches!(result, Err(EmailError::NotConfigured("EMAIL_USER"))));
    }
}
