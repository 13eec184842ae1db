pub mod fortnox;
pub mod google;
pub mod registry;
pub mod state;
pub mod traits;
pub mod x;

/// Failure talking to an OAuth token endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider refused the grant; the stored refresh token is no longer usable.
    #[error("{provider} rejected the grant: {body}")]
    InvalidGrant { provider: String, body: String },

    #[error("{provider} token endpoint returned {status}: {body}")]
    Rejected {
        provider: String,
        status: u16,
        body: String,
    },
}

impl ProviderError {
    /// Classifies a non-2xx token endpoint response.
    pub(crate) fn from_response(provider: &str, status: u16, body: String) -> Self {
        if body.contains("invalid_grant") {
            ProviderError::InvalidGrant {
                provider: provider.to_string(),
                body,
            }
        } else {
            ProviderError::Rejected {
                provider: provider.to_string(),
                status,
                body,
            }
        }
    }

    pub fn needs_reauth(&self) -> bool {
        matches!(self, ProviderError::InvalidGrant { .. })
    }
}

pub(crate) fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
