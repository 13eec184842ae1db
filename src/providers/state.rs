//! Signed OAuth `state` values and PKCE pairs.
//!
//! A state is `base64url(json).hex(hmac_sha256(secret, base64url(json)))`.
//! The callback trusts the user id inside it only after the MAC checks out.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// States older than this are rejected.
pub const STATE_MAX_AGE_SECS: i64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OAuthState {
    pub user_id: Uuid,
    pub provider: String,
    pub nonce: String,
    pub issued_at: i64,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum StateError {
    #[error("malformed state")]
    Malformed,
    #[error("state signature mismatch")]
    BadSignature,
    #[error("state expired")]
    Expired,
}

impl OAuthState {
    pub fn new(user_id: Uuid, provider: &str) -> Self {
        Self {
            user_id,
            provider: provider.to_string(),
            nonce: random_string(16),
            issued_at: Utc::now().timestamp(),
        }
    }

    pub fn sign(&self, secret: &str) -> String {
        // Serializing a plain struct cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);
        let mac = mac_hex(secret, payload.as_bytes());
        format!("{payload}.{mac}")
    }

    pub fn verify(signed: &str, secret: &str) -> Result<Self, StateError> {
        let (payload, mac) = signed.rsplit_once('.').ok_or(StateError::Malformed)?;
        let expected = mac_hex(secret, payload.as_bytes());
        if !bool::from(expected.as_bytes().ct_eq(mac.as_bytes())) {
            return Err(StateError::BadSignature);
        }
        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| StateError::Malformed)?;
        let state: OAuthState = serde_json::from_slice(&json).map_err(|_| StateError::Malformed)?;
        if Utc::now().timestamp() - state.issued_at > STATE_MAX_AGE_SECS {
            return Err(StateError::Expired);
        }
        Ok(state)
    }
}

/// A PKCE verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        Self::from_verifier(random_string(64))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self { verifier, challenge }
    }
}

fn mac_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let state = OAuthState::new(Uuid::new_v4(), "fortnox");
        let signed = state.sign("k");
        assert_eq!(OAuthState::verify(&signed, "k").unwrap(), state);
    }

    #[test]
    fn test_tampered_state_rejected() {
        let signed = OAuthState::new(Uuid::new_v4(), "fortnox").sign("k");
        let forged = OAuthState::new(Uuid::new_v4(), "fortnox").sign("other");
        let (payload, _) = forged.rsplit_once('.').unwrap();
        let (_, mac) = signed.rsplit_once('.').unwrap();
        assert_eq!(
            OAuthState::verify(&format!("{payload}.{mac}"), "k"),
            Err(StateError::BadSignature)
        );
        assert_eq!(OAuthState::verify("nodot", "k"), Err(StateError::Malformed));
    }

    #[test]
    fn test_expired_state_rejected() {
        let mut state = OAuthState::new(Uuid::new_v4(), "x");
        state.issued_at -= STATE_MAX_AGE_SECS + 1;
        assert_eq!(OAuthState::verify(&state.sign("k"), "k"), Err(StateError::Expired));
    }

    #[test]
    fn test_pkce_rfc7636_vector() {
        let pkce = Pkce::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gXk2mzlEo".into());
        assert_eq!(pkce.challenge, "E9Melhoa2OwvFr4HBI-B3ZqRsFkqvJ3hOEHcNnMvJJk");
    }
}
