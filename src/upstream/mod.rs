//! Clients for third-party HTTP APIs.

pub mod fortnox;
pub mod graph;
pub mod paginate;
pub mod supabase;

use std::time::Duration;

/// Shared outbound client. Upstream calls carry an explicit timeout.
pub fn http_client() -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(concat!("solvify/", env!("CARGO_PKG_VERSION")))
        .build()?)
}
