//! Opaque OAuth callback state token.
//!
//! The external callback endpoint that exchanges an authorization code
//! hands back the `state` query parameter untouched. It must round-trip
//! the provider kind, the owning user, a nonce, and the issuance instant
//! so the core can route the callback and reject stale or forged
//! requests.
//!
//! Encoding is URL-safe base64 over canonical JSON; the token is opaque
//! to everything outside this module.

use crate::error::{AuthError, Result};
use crate::types::ProviderKind;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum age of a callback state token before it is rejected
pub const STATE_MAX_AGE_SECS: i64 = 600;

/// Structured content of the OAuth `state` parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackState {
    pub provider: ProviderKind,
    pub user_id: String,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
}

impl CallbackState {
    /// Create a fresh state token for a sign-in flow starting now.
    pub fn new(provider: ProviderKind, user_id: impl Into<String>) -> Self {
        Self {
            provider,
            user_id: user_id.into(),
            nonce: Uuid::new_v4().to_string(),
            issued_at: Utc::now(),
        }
    }

    /// Encode as the opaque `state` query parameter value.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| AuthError::Other(format!("Failed to encode callback state: {}", e)))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decode an incoming `state` parameter.
    ///
    /// # Errors
    ///
    /// [`AuthError::StateInvalid`] when the value is not base64 or not the
    /// expected JSON shape.
    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| AuthError::StateInvalid)?;
        serde_json::from_slice(&bytes).map_err(|_| AuthError::StateInvalid)
    }

    /// Reject state older than [`STATE_MAX_AGE_SECS`].
    ///
    /// # Errors
    ///
    /// [`AuthError::StateExpired`] carrying the observed age, or
    /// [`AuthError::StateInvalid`] when the issuance instant lies in the
    /// future (clock tampering).
    pub fn validate(&self) -> Result<()> {
        let age = Utc::now() - self.issued_at;
        if age < Duration::zero() {
            return Err(AuthError::StateInvalid);
        }
        if age > Duration::seconds(STATE_MAX_AGE_SECS) {
            return Err(AuthError::StateExpired {
                age_secs: age.num_seconds(),
            });
        }
        Ok(())
    }

    /// Decode and validate in one step.
    pub fn decode_validated(encoded: &str) -> Result<Self> {
        let state = Self::decode(encoded)?;
        state.validate()?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        let state = CallbackState::new(ProviderKind::GoogleDrive, "user-1");
        let encoded = state.encode().unwrap();
        let decoded = CallbackState::decode(&encoded).unwrap();
        assert_eq!(state, decoded);
    }

    #[test]
    fn test_nonces_are_unique() {
        let a = CallbackState::new(ProviderKind::GoogleDrive, "user-1");
        let b = CallbackState::new(ProviderKind::GoogleDrive, "user-1");
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn test_fresh_state_validates() {
        let state = CallbackState::new(ProviderKind::Webdav, "user-1");
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_stale_state_rejected() {
        let mut state = CallbackState::new(ProviderKind::GoogleDrive, "user-1");
        state.issued_at = Utc::now() - Duration::seconds(STATE_MAX_AGE_SECS + 60);

        match state.validate() {
            Err(AuthError::StateExpired { age_secs }) => {
                assert!(age_secs > STATE_MAX_AGE_SECS);
            }
            other => panic!("expected StateExpired, got {:?}", other),
        }
    }

    #[test]
    fn test_future_issuance_rejected() {
        let mut state = CallbackState::new(ProviderKind::GoogleDrive, "user-1");
        state.issued_at = Utc::now() + Duration::minutes(5);
        assert!(matches!(state.validate(), Err(AuthError::StateInvalid)));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            CallbackState::decode("not!base64!"),
            Err(AuthError::StateInvalid)
        ));
        // Valid base64, wrong shape
        let garbage = URL_SAFE_NO_PAD.encode(b"{\"foo\": 1}");
        assert!(matches!(
            CallbackState::decode(&garbage),
            Err(AuthError::StateInvalid)
        ));
    }

    #[test]
    fn test_decode_validated_combines_both_checks() {
        let state = CallbackState::new(ProviderKind::GoogleDrive, "user-1");
        let encoded = state.encode().unwrap();
        assert!(CallbackState::decode_validated(&encoded).is_ok());

        let mut stale = state;
        stale.issued_at = Utc::now() - Duration::seconds(STATE_MAX_AGE_SECS * 2);
        let encoded = stale.encode().unwrap();
        assert!(CallbackState::decode_validated(&encoded).is_err());
    }
}
