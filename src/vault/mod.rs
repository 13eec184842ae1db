//! Per-user third-party credentials and the token refresh path.

pub mod shape;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::credential::STATUS_NEEDS_REAUTH;
use crate::providers::registry::{display_service, ProviderRegistry};
use crate::providers::traits::TokenSet;
use crate::store::Store;
use shape::{DecodedCredential, StoredToken};

/// A token expiring within this margin is treated as expired.
pub const REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Connection state reported by the `/status` endpoints.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub expired: bool,
    pub needs_reauth: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct CredentialVault {
    store: Arc<dyn Store>,
    providers: Arc<ProviderRegistry>,
}

impl CredentialVault {
    pub fn new(store: Arc<dyn Store>, providers: Arc<ProviderRegistry>) -> Self {
        Self { store, providers }
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Loads and decodes the row for `(user_id, service_name)`.
    pub async fn load(
        &self,
        user_id: Uuid,
        service_name: &str,
    ) -> anyhow::Result<Option<DecodedCredential>> {
        let row = self.store.get_credential(user_id, service_name).await?;
        Ok(row.as_ref().map(shape::decode))
    }

    /// Canonical token tuple, identical regardless of how the row stores it.
    pub async fn load_token(
        &self,
        user_id: Uuid,
        service_name: &str,
    ) -> anyhow::Result<Option<StoredToken>> {
        Ok(self
            .load(user_id, service_name)
            .await?
            .map(|d| d.token)
            .filter(|t| !t.is_empty()))
    }

    pub async fn status(&self, user_id: Uuid, service_name: &str) -> anyhow::Result<ConnectionStatus> {
        let decoded = self.load(user_id, service_name).await?;
        Ok(match decoded {
            Some(d) if d.token.access_token.is_some() => {
                let needs_reauth = d.status.as_deref() == Some(STATUS_NEEDS_REAUTH);
                ConnectionStatus {
                    connected: !needs_reauth,
                    expired: !is_fresh(&d.token, Utc::now()),
                    needs_reauth,
                    expires_at: d.token.expires_at,
                }
            }
            _ => ConnectionStatus {
                connected: false,
                expired: false,
                needs_reauth: false,
                expires_at: None,
            },
        })
    }

    /// Returns an access token good for at least the refresh margin,
    /// refreshing and persisting it first when needed.
    pub async fn get_valid_token(&self, user_id: Uuid, service_name: &str) -> Result<String, AppError> {
        let not_connected = || AppError::NotConnected {
            service: display_service(service_name),
        };

        let decoded = self
            .load(user_id, service_name)
            .await?
            .ok_or_else(not_connected)?;
        if decoded.status.as_deref() == Some(STATUS_NEEDS_REAUTH) {
            return Err(not_connected());
        }
        let access_token = decoded.token.access_token.clone().ok_or_else(not_connected)?;

        if is_fresh(&decoded.token, Utc::now()) {
            return Ok(access_token);
        }

        tracing::info!(%user_id, service = service_name, "access token expired, refreshing");
        let refreshed = self.refresh(user_id, service_name, &decoded.token).await?;
        refreshed.access_token.ok_or_else(not_connected)
    }

    /// Exchanges the stored refresh token and writes the result back in the
    /// row's existing storage layout.
    pub async fn refresh(
        &self,
        user_id: Uuid,
        service_name: &str,
        current: &StoredToken,
    ) -> Result<StoredToken, AppError> {
        let refresh_token = current.refresh_token.as_deref().ok_or_else(|| AppError::NotConnected {
            service: display_service(service_name),
        })?;
        let provider = self.providers.for_service(service_name)?;

        match provider.refresh_token(refresh_token).await {
            Ok(set) => Ok(self.save_token_set(user_id, service_name, &set, Some(current)).await?),
            Err(e) if e.needs_reauth() => {
                tracing::warn!(%user_id, service = service_name, error = %e, "refresh token rejected");
                self.store
                    .set_credential_status(user_id, service_name, STATUS_NEEDS_REAUTH)
                    .await?;
                Err(AppError::NotConnected {
                    service: display_service(service_name),
                })
            }
            Err(e) => Err(AppError::upstream(
                format!("Failed to refresh {} token", display_service(service_name)),
                e,
            )),
        }
    }

    /// Persists a token set from a code exchange or refresh. A refresh
    /// response without a refresh token keeps the previous one.
    pub async fn save_token_set(
        &self,
        user_id: Uuid,
        service_name: &str,
        set: &TokenSet,
        previous: Option<&StoredToken>,
    ) -> anyhow::Result<StoredToken> {
        let token = StoredToken {
            access_token: Some(set.access_token.clone()),
            refresh_token: set
                .refresh_token
                .clone()
                .or_else(|| previous.and_then(|p| p.refresh_token.clone())),
            expires_at: set.expires_at(Utc::now()),
        };
        let existing = self.store.get_credential(user_id, service_name).await?;
        let row = shape::encode(existing.as_ref(), user_id, service_name, &token);
        self.store.upsert_credential(&row).await?;
        tracing::info!(%user_id, service = service_name, "stored credential");
        Ok(token)
    }
}

/// True if the token has no expiry or expires after `now` plus the margin.
pub fn is_fresh(token: &StoredToken, now: DateTime<Utc>) -> bool {
    match token.expires_at {
        Some(exp) => exp > now + Duration::seconds(REFRESH_MARGIN_SECS),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_fresh_margin() {
        let now = Utc::now();
        let mut token = StoredToken::default();
        assert!(is_fresh(&token, now));
        token.expires_at = Some(now + Duration::minutes(10));
        assert!(is_fresh(&token, now));
        token.expires_at = Some(now + Duration::minutes(4));
        assert!(!is_fresh(&token, now));
        token.expires_at = Some(now - Duration::minutes(1));
        assert!(!is_fresh(&token, now));
    }
}
