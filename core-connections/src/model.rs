//! Connection model: one configured backend link for one user.

use bridge_traits::provider::ProviderCredentials;
use chrono::{DateTime, Utc};
use core_auth::{AuthFamily, OAuthTokens, ProviderKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ConnectionError, Result};

/// Unique identifier for a configured backend connection.
///
/// # Examples
///
/// ```
/// use core_connections::ConnectionId;
///
/// let id = ConnectionId::new();
/// let parsed = ConnectionId::from_string(&id.to_string()).unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a connection ID from a string
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ConnectionError::InvalidRecord(format!("Invalid connection id: {}", e)))
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of the owning user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Authentication payload of a connection.
///
/// Exactly one arm is ever populated; the enum makes the "never both"
/// invariant structural rather than a runtime check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", content = "payload")]
pub enum AuthPayload {
    /// OAuth token set for Drive-like backends
    OAuth(OAuthTokens),
    /// Static credentials for server-protocol backends
    Credentials(ProviderCredentials),
}

impl AuthPayload {
    /// Which authentication family this payload belongs to
    pub fn family(&self) -> AuthFamily {
        match self {
            AuthPayload::OAuth(_) => AuthFamily::OAuth,
            AuthPayload::Credentials(_) => AuthFamily::Credentials,
        }
    }

    /// Borrow the OAuth token set, if this is the OAuth arm
    pub fn oauth_tokens(&self) -> Option<&OAuthTokens> {
        match self {
            AuthPayload::OAuth(tokens) => Some(tokens),
            AuthPayload::Credentials(_) => None,
        }
    }

    /// Borrow the credentials, if this is the credential arm
    pub fn credentials(&self) -> Option<&ProviderCredentials> {
        match self {
            AuthPayload::OAuth(_) => None,
            AuthPayload::Credentials(creds) => Some(creds),
        }
    }
}

/// One configured backend link for one user.
///
/// Created on a successful initial handshake; mutated on every token
/// refresh, sync result, or default reassignment; removed only by an
/// explicit disconnect-and-remove.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub provider: ProviderKind,
    pub auth: AuthPayload,
    /// Root path of this connection inside the remote namespace
    pub sync_root: String,
    /// At most one connection per user carries this flag (enforced on save)
    pub is_default: bool,
    pub is_connected: bool,
    pub last_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    /// Create a connection for an OAuth-family backend.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::AuthMismatch`] when `provider` is not an
    /// OAuth-family kind.
    pub fn new_oauth(
        user_id: UserId,
        provider: ProviderKind,
        tokens: OAuthTokens,
        sync_root: impl Into<String>,
    ) -> Result<Self> {
        Self::new(user_id, provider, AuthPayload::OAuth(tokens), sync_root)
    }

    /// Create a connection for a credential-family backend.
    pub fn new_credentials(
        user_id: UserId,
        provider: ProviderKind,
        credentials: ProviderCredentials,
        sync_root: impl Into<String>,
    ) -> Result<Self> {
        Self::new(
            user_id,
            provider,
            AuthPayload::Credentials(credentials),
            sync_root,
        )
    }

    fn new(
        user_id: UserId,
        provider: ProviderKind,
        auth: AuthPayload,
        sync_root: impl Into<String>,
    ) -> Result<Self> {
        if auth.family() != provider.auth_family() {
            return Err(ConnectionError::AuthMismatch {
                provider: provider.as_str().to_string(),
            });
        }
        let now = Utc::now();
        Ok(Self {
            id: ConnectionId::new(),
            user_id,
            provider,
            auth,
            sync_root: sync_root.into(),
            is_default: false,
            is_connected: true,
            last_error: None,
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether the auth payload matches the provider's family.
    ///
    /// Always true for connections built through the constructors; guards
    /// hand-assembled or deserialized records.
    pub fn is_auth_consistent(&self) -> bool {
        self.auth.family() == self.provider.auth_family()
    }

    /// Replace the OAuth token set after a refresh.
    pub fn with_refreshed_tokens(mut self, tokens: OAuthTokens) -> Result<Self> {
        if self.provider.auth_family() != AuthFamily::OAuth {
            return Err(ConnectionError::AuthMismatch {
                provider: self.provider.as_str().to_string(),
            });
        }
        self.auth = AuthPayload::OAuth(tokens);
        self.touch();
        Ok(self)
    }

    /// Record a successful sync pass.
    pub fn mark_synced(&mut self) {
        self.last_synced_at = Some(Utc::now());
        self.last_error = None;
        self.is_connected = true;
        self.touch();
    }

    /// Demote to disconnected after an irrecoverable failure.
    pub fn demote(&mut self, reason: impl Into<String>) {
        self.is_connected = false;
        self.last_error = Some(reason.into());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> OAuthTokens {
        OAuthTokens::new(
            "access".to_string(),
            Some("refresh".to_string()),
            3600,
            "Bearer".to_string(),
        )
    }

    fn credentials() -> ProviderCredentials {
        ProviderCredentials {
            endpoint_url: "https://dav.example.com".to_string(),
            username: "user".to_string(),
            secret: "pass".to_string(),
            private_key: None,
            base_path: Some("/remote.php/dav".to_string()),
        }
    }

    #[test]
    fn test_new_oauth_connection() {
        let conn = Connection::new_oauth(
            UserId::from("user-1"),
            ProviderKind::GoogleDrive,
            tokens(),
            "/Apps/Daybook",
        )
        .unwrap();

        assert!(conn.is_connected);
        assert!(!conn.is_default);
        assert!(conn.is_auth_consistent());
        assert!(conn.auth.oauth_tokens().is_some());
        assert!(conn.auth.credentials().is_none());
    }

    #[test]
    fn test_oauth_payload_on_credential_provider_rejected() {
        let result = Connection::new_oauth(
            UserId::from("user-1"),
            ProviderKind::Webdav,
            tokens(),
            "/Daybook",
        );
        assert!(matches!(result, Err(ConnectionError::AuthMismatch { .. })));
    }

    #[test]
    fn test_credentials_payload_on_oauth_provider_rejected() {
        let result = Connection::new_credentials(
            UserId::from("user-1"),
            ProviderKind::GoogleDrive,
            credentials(),
            "/Daybook",
        );
        assert!(matches!(result, Err(ConnectionError::AuthMismatch { .. })));
    }

    #[test]
    fn test_demote_sets_error_and_disconnects() {
        let mut conn = Connection::new_credentials(
            UserId::from("user-1"),
            ProviderKind::Webdav,
            credentials(),
            "/Daybook",
        )
        .unwrap();

        conn.demote("401 from server");
        assert!(!conn.is_connected);
        assert_eq!(conn.last_error.as_deref(), Some("401 from server"));
    }

    #[test]
    fn test_mark_synced_clears_error() {
        let mut conn = Connection::new_oauth(
            UserId::from("user-1"),
            ProviderKind::GoogleDrive,
            tokens(),
            "/Apps/Daybook",
        )
        .unwrap();

        conn.demote("transient");
        conn.mark_synced();
        assert!(conn.is_connected);
        assert!(conn.last_error.is_none());
        assert!(conn.last_synced_at.is_some());
    }

    #[test]
    fn test_with_refreshed_tokens() {
        let conn = Connection::new_oauth(
            UserId::from("user-1"),
            ProviderKind::GoogleDrive,
            tokens(),
            "/Apps/Daybook",
        )
        .unwrap();

        let fresh = OAuthTokens::new("new-access".to_string(), None, 3600, "Bearer".to_string());
        let conn = conn.with_refreshed_tokens(fresh).unwrap();
        let stored = conn.auth.oauth_tokens().unwrap();
        assert_eq!(stored.access_token, "new-access");
        // Refresh token is whatever the flow manager resolved, here None
        assert!(stored.refresh_token.is_none());
    }

    #[test]
    fn test_auth_payload_serialization_round_trip() {
        let payload = AuthPayload::Credentials(credentials());
        let json = serde_json::to_string(&payload).unwrap();
        let back: AuthPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.family(), AuthFamily::Credentials);
        assert_eq!(back.credentials().unwrap().username, "user");
    }
}
