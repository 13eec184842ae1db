//! Background job: refresh third-party tokens before they lapse.
//!
//! Runs every 30 minutes. Any credential with a refresh token that expires
//! within the look-ahead window is exchanged through its provider and written
//! back in the row's existing layout. Rows rejected by the provider are
//! flagged for re-auth by the vault and skipped on later passes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time;

use crate::vault::shape;
use crate::AppState;

pub const INTERVAL: Duration = Duration::from_secs(30 * 60);
pub const LOOK_AHEAD_HOURS: i64 = 24;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Spawn the background refresh task. Call this once at startup.
pub fn spawn(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = time::interval(INTERVAL);
        loop {
            interval.tick().await;
            match refresh_expiring(&state, Utc::now()).await {
                Ok(summary) if summary.refreshed + summary.failed > 0 => {
                    tracing::info!(
                        refreshed = summary.refreshed,
                        failed = summary.failed,
                        skipped = summary.skipped,
                        "token refresh pass finished"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!("token refresh job failed: {}", e),
            }
        }
    });
}

/// One pass over every refreshable credential.
pub async fn refresh_expiring(state: &AppState, now: DateTime<Utc>) -> anyhow::Result<RefreshSummary> {
    let horizon = now + chrono::Duration::hours(LOOK_AHEAD_HOURS);
    let mut summary = RefreshSummary::default();

    for row in state.store.list_refreshable_credentials().await? {
        let decoded = shape::decode(&row);
        let due = decoded.token.refresh_token.is_some()
            && decoded.token.expires_at.is_some_and(|exp| exp <= horizon);
        if !due || state.vault.providers().for_service(&row.service_name).is_err() {
            summary.skipped += 1;
            continue;
        }

        match state.vault.refresh(row.user_id, &row.service_name, &decoded.token).await {
            Ok(_) => summary.refreshed += 1,
            Err(e) => {
                tracing::warn!(
                    user_id = %row.user_id,
                    service = %row.service_name,
                    error = %e,
                    "proactive token refresh failed"
                );
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}
