use bridge_traits::provider::TokenGrant;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Authentication family a provider kind belongs to.
///
/// OAuth-family backends run the authorization-code flow and carry a
/// token set; credential-family backends hold static credentials for a
/// server reached through a trusted relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthFamily {
    OAuth,
    Credentials,
}

/// Supported cloud storage backends.
///
/// The set is sealed: a `Connection` always carries exactly one of these
/// kinds, and the provider factory is keyed by it.
///
/// # Examples
///
/// ```
/// use core_auth::ProviderKind;
///
/// let provider = ProviderKind::GoogleDrive;
/// assert_eq!(provider.display_name(), "Google Drive");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Google Drive cloud storage (OAuth family)
    GoogleDrive,
    /// WebDAV server reached through the trusted relay (credential family)
    Webdav,
}

impl ProviderKind {
    /// Get the human-readable display name for this provider
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::GoogleDrive => "Google Drive",
            ProviderKind::Webdav => "WebDAV",
        }
    }

    /// Get the provider identifier string
    ///
    /// Used for persistence, logging and configuration purposes.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::GoogleDrive => "google_drive",
            ProviderKind::Webdav => "webdav",
        }
    }

    /// Which authentication family this kind belongs to
    pub fn auth_family(&self) -> AuthFamily {
        match self {
            ProviderKind::GoogleDrive => AuthFamily::OAuth,
            ProviderKind::Webdav => AuthFamily::Credentials,
        }
    }

    /// Parse a provider kind from a string identifier
    ///
    /// # Examples
    ///
    /// ```
    /// use core_auth::ProviderKind;
    ///
    /// assert_eq!(ProviderKind::parse("google_drive"), Some(ProviderKind::GoogleDrive));
    /// assert_eq!(ProviderKind::parse("invalid"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "google_drive" | "googledrive" => Some(ProviderKind::GoogleDrive),
            "webdav" | "web_dav" => Some(ProviderKind::Webdav),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// OAuth 2.0 token set.
///
/// Contains the access token, optional refresh token, and expiration time
/// for an authenticated connection.
///
/// # Security
///
/// Tokens should be stored securely and never logged. The `Debug`
/// implementation redacts sensitive information.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    /// The access token used for API requests
    pub access_token: String,
    /// The refresh token used to obtain new access tokens, when the
    /// provider issued one
    pub refresh_token: Option<String>,
    /// When the access token expires (UTC)
    pub expires_at: chrono::DateTime<chrono::Utc>,
    /// Token type reported by the provider (normally "Bearer")
    pub token_type: String,
}

impl OAuthTokens {
    /// Create a new token set expiring `expires_in` seconds from now
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i64,
        token_type: String,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(expires_in),
            token_type,
        }
    }

    /// Check if the access token is expired or will expire soon.
    ///
    /// Uses the default 300 second buffer so tokens are refreshed before
    /// they actually lapse.
    pub fn is_expired(&self) -> bool {
        self.is_expired_with_buffer(300)
    }

    /// Check if the access token is expired with a custom buffer
    pub fn is_expired_with_buffer(&self, buffer_seconds: i64) -> bool {
        let now = chrono::Utc::now();
        let buffer = chrono::Duration::seconds(buffer_seconds);
        now >= self.expires_at - buffer
    }

    /// Get the time remaining until token expiration.
    ///
    /// Returns `None` if the token is already expired.
    pub fn time_until_expiry(&self) -> Option<chrono::Duration> {
        let now = chrono::Utc::now();
        if now >= self.expires_at {
            None
        } else {
            Some(self.expires_at - now)
        }
    }
}

impl From<TokenGrant> for OAuthTokens {
    fn from(grant: TokenGrant) -> Self {
        Self::new(
            grant.access_token,
            grant.refresh_token,
            grant.expires_in,
            grant.token_type,
        )
    }
}

// Custom Debug implementation to avoid logging tokens
impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn tokens_expiring_in(duration: Duration) -> OAuthTokens {
        OAuthTokens {
            access_token: "token".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: Utc::now() + duration,
            token_type: "Bearer".to_string(),
        }
    }

    #[test]
    fn test_provider_kind_as_str_round_trip() {
        for kind in [ProviderKind::GoogleDrive, ProviderKind::Webdav] {
            assert_eq!(ProviderKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ProviderKind::parse("invalid"), None);
    }

    #[test]
    fn test_provider_kind_auth_family() {
        assert_eq!(ProviderKind::GoogleDrive.auth_family(), AuthFamily::OAuth);
        assert_eq!(ProviderKind::Webdav.auth_family(), AuthFamily::Credentials);
    }

    #[test]
    fn test_oauth_tokens_is_expired_fresh() {
        assert!(!tokens_expiring_in(Duration::hours(1)).is_expired());
    }

    #[test]
    fn test_oauth_tokens_is_expired_within_buffer() {
        // Less than the default 300s buffer
        assert!(tokens_expiring_in(Duration::seconds(200)).is_expired());
    }

    #[test]
    fn test_oauth_tokens_is_expired_past() {
        assert!(tokens_expiring_in(Duration::hours(-1)).is_expired());
    }

    #[test]
    fn test_oauth_tokens_custom_buffer() {
        let tokens = tokens_expiring_in(Duration::minutes(10));
        assert!(!tokens.is_expired_with_buffer(60));
        assert!(tokens.is_expired_with_buffer(600));
    }

    #[test]
    fn test_oauth_tokens_time_until_expiry() {
        let tokens = tokens_expiring_in(Duration::hours(1));
        let remaining = tokens.time_until_expiry().unwrap();
        assert!(remaining.num_minutes() >= 59 && remaining.num_minutes() <= 60);

        assert!(tokens_expiring_in(Duration::hours(-1))
            .time_until_expiry()
            .is_none());
    }

    #[test]
    fn test_oauth_tokens_debug_redacts() {
        let tokens = OAuthTokens {
            access_token: "secret_access_token".to_string(),
            refresh_token: Some("secret_refresh_token".to_string()),
            expires_at: Utc::now(),
            token_type: "Bearer".to_string(),
        };
        let debug_str = format!("{:?}", tokens);
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("secret_access_token"));
        assert!(!debug_str.contains("secret_refresh_token"));
    }

    #[test]
    fn test_oauth_tokens_from_grant() {
        let grant = TokenGrant {
            access_token: "access".to_string(),
            refresh_token: None,
            expires_in: 3600,
            token_type: "Bearer".to_string(),
        };
        let tokens: OAuthTokens = grant.into();
        assert_eq!(tokens.access_token, "access");
        assert!(tokens.refresh_token.is_none());
        assert!(!tokens.is_expired());
    }

    #[test]
    fn test_oauth_tokens_serialization() {
        let tokens = OAuthTokens::new(
            "access".to_string(),
            Some("refresh".to_string()),
            3600,
            "Bearer".to_string(),
        );
        let json = serde_json::to_string(&tokens).unwrap();
        let deserialized: OAuthTokens = serde_json::from_str(&json).unwrap();
        assert_eq!(tokens.access_token, deserialized.access_token);
        assert_eq!(tokens.refresh_token, deserialized.refresh_token);
    }
}
