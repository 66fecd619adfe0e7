//! Cloud Provider Capability Interface
//!
//! The uniform contract every storage backend must satisfy. Two
//! authentication families exist:
//!
//! - **OAuth family** (Drive-like services): authorization URL, code
//!   exchange, token refresh.
//! - **Credential family** (server-protocol backends reached through a
//!   trusted relay): explicit connect/test with stored credentials.
//!
//! Operations of the family a backend does not belong to fail fast with
//! [`ProviderErrorKind::Unsupported`] via the trait's default methods.
//!
//! Every operation returns [`ProviderResult`]: a tagged result carrying a
//! value or a human-readable message plus a machine error kind. Nothing
//! here panics; callers branch on the kind without exception handling.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

/// Machine-readable error category for provider operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Bad or expired credentials; the owning connection should be demoted
    Auth,
    /// Remote object absent
    NotFound,
    /// Network failure, timeout, or 5xx — retryable
    Network,
    /// Provider throttled the request — retryable
    RateLimited,
    /// Provider not configured / missing secrets — not retryable
    Configuration,
    /// Operation not supported by this backend's auth family
    Unsupported,
    /// Malformed provider response
    Protocol,
}

impl ProviderErrorKind {
    /// Whether a failed operation of this kind may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimited)
    }
}

/// Error returned by every provider operation
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Auth, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::NotFound, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Configuration, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Protocol, message)
    }

    fn unsupported(operation: &str) -> Self {
        Self::new(
            ProviderErrorKind::Unsupported,
            format!("{} is not supported by this backend", operation),
        )
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Token set returned from an OAuth code exchange or refresh
#[derive(Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires
    pub expires_in: i64,
    pub token_type: String,
}

// Custom Debug implementation to avoid logging tokens
impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Static credentials for a credential-family backend
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct ProviderCredentials {
    /// Server endpoint URL
    pub endpoint_url: String,
    pub username: String,
    pub secret: String,
    /// Optional private key material for key-based servers
    pub private_key: Option<String>,
    /// Optional base path prefix inside the remote namespace
    pub base_path: Option<String>,
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("endpoint_url", &self.endpoint_url)
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_path", &self.base_path)
            .finish()
    }
}

/// Provider-reported metadata for one remote object
///
/// Used transiently for conflict comparison and existence checks; the
/// provider remains the source of truth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Provider-assigned object id
    pub id: String,
    /// Full remote path
    pub path: String,
    /// Leaf name
    pub name: String,
    /// Content checksum (SHA-256, lowercase hex) when the provider reports one
    pub checksum: Option<String>,
    pub size: Option<u64>,
    pub is_folder: bool,
    pub modified_at: Option<DateTime<Utc>>,
}

/// One page of a listing
#[derive(Debug, Clone)]
pub struct FileListPage {
    pub files: Vec<RemoteFile>,
    pub has_more: bool,
    pub cursor: Option<String>,
}

/// Uniform capability contract for one backend instance
///
/// Implementations wrap one configured connection's view of a backend.
/// Backends without native hierarchical paths must implement path-taking
/// operations by walking path segments and resolving/creating intermediate
/// folders; the O(depth) round-trip cost is accepted.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    // ------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------

    /// Whether this instance currently holds usable credentials
    async fn is_authenticated(&self) -> bool;

    /// Build the authorization URL the user must visit (OAuth family)
    async fn build_authorization_url(
        &self,
        redirect_uri: &str,
        state: &str,
    ) -> ProviderResult<String> {
        let _ = (redirect_uri, state);
        Err(ProviderError::unsupported("authorization URL"))
    }

    /// Exchange an authorization code for tokens (OAuth family)
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> ProviderResult<TokenGrant> {
        let _ = (code, redirect_uri);
        Err(ProviderError::unsupported("code exchange"))
    }

    /// Obtain a fresh token set from a refresh token (OAuth family)
    async fn refresh(&self, refresh_token: &str) -> ProviderResult<TokenGrant> {
        let _ = refresh_token;
        Err(ProviderError::unsupported("token refresh"))
    }

    /// Attach stored credentials to this instance (credential family)
    async fn connect(&self, credentials: &ProviderCredentials) -> ProviderResult<()> {
        let _ = credentials;
        Err(ProviderError::unsupported("credential connect"))
    }

    /// Verify the stored credentials against the live backend (credential family)
    async fn test_connection(&self) -> ProviderResult<()> {
        Err(ProviderError::unsupported("connection test"))
    }

    /// Drop any held credentials/session state
    async fn disconnect(&self) -> ProviderResult<()>;

    // ------------------------------------------------------------------
    // File operations
    // ------------------------------------------------------------------

    /// List the entries under `path`, paginated via `cursor`
    async fn list(&self, path: &str, cursor: Option<String>) -> ProviderResult<FileListPage>;

    /// Fetch metadata by provider object id
    async fn get(&self, id: &str) -> ProviderResult<RemoteFile>;

    /// Fetch metadata by full remote path
    ///
    /// Absence is a value here (`Ok(None)`), not an error: the engine uses
    /// this for existence checks and idempotent deletes.
    async fn get_by_path(&self, path: &str) -> ProviderResult<Option<RemoteFile>>;

    /// Read the content of an object
    async fn read(&self, id: &str) -> ProviderResult<Bytes>;

    /// Write content at `path`, creating intermediate folders as needed
    async fn write(&self, path: &str, content: Bytes, overwrite: bool)
        -> ProviderResult<RemoteFile>;

    /// Delete an object by id
    async fn delete(&self, id: &str) -> ProviderResult<()>;

    /// Move an object to a new path
    async fn move_item(&self, id: &str, new_path: &str) -> ProviderResult<RemoteFile>;

    /// Copy an object to a new path
    async fn copy_item(&self, id: &str, new_path: &str) -> ProviderResult<RemoteFile>;

    /// Create a folder (and any missing parents) at `path`
    async fn create_folder(&self, path: &str) -> ProviderResult<RemoteFile>;
}

/// Split a remote path into non-empty segments
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Join a parent path and a leaf name
pub fn join_path(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches('/');
    if parent.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Split a path into (parent, leaf name); the root's parent is ""
pub fn split_path(path: &str) -> (String, String) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => (trimmed[..idx].to_string(), trimmed[idx + 1..].to_string()),
        None => (String::new(), trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CredentialOnly;

    #[async_trait]
    impl CloudProvider for CredentialOnly {
        async fn is_authenticated(&self) -> bool {
            true
        }

        async fn disconnect(&self) -> ProviderResult<()> {
            Ok(())
        }

        async fn list(&self, _: &str, _: Option<String>) -> ProviderResult<FileListPage> {
            Ok(FileListPage {
                files: vec![],
                has_more: false,
                cursor: None,
            })
        }

        async fn get(&self, id: &str) -> ProviderResult<RemoteFile> {
            Err(ProviderError::not_found(format!("no object {}", id)))
        }

        async fn get_by_path(&self, _: &str) -> ProviderResult<Option<RemoteFile>> {
            Ok(None)
        }

        async fn read(&self, id: &str) -> ProviderResult<Bytes> {
            Err(ProviderError::not_found(format!("no object {}", id)))
        }

        async fn write(&self, _: &str, _: Bytes, _: bool) -> ProviderResult<RemoteFile> {
            Err(ProviderError::configuration("read-only test double"))
        }

        async fn delete(&self, _: &str) -> ProviderResult<()> {
            Ok(())
        }

        async fn move_item(&self, _: &str, _: &str) -> ProviderResult<RemoteFile> {
            Err(ProviderError::configuration("read-only test double"))
        }

        async fn copy_item(&self, _: &str, _: &str) -> ProviderResult<RemoteFile> {
            Err(ProviderError::configuration("read-only test double"))
        }

        async fn create_folder(&self, _: &str) -> ProviderResult<RemoteFile> {
            Err(ProviderError::configuration("read-only test double"))
        }
    }

    #[tokio::test]
    async fn test_oauth_operations_fail_fast_for_credential_family() {
        let provider = CredentialOnly;

        let err = provider
            .build_authorization_url("http://localhost/cb", "state")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Unsupported);

        let err = provider.refresh("token").await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Unsupported);
        assert!(err.message.contains("not supported"));
    }

    #[test]
    fn test_error_kind_retryability() {
        assert!(ProviderErrorKind::Network.is_retryable());
        assert!(ProviderErrorKind::RateLimited.is_retryable());
        assert!(!ProviderErrorKind::Auth.is_retryable());
        assert!(!ProviderErrorKind::Configuration.is_retryable());
    }

    #[test]
    fn test_token_grant_debug_redacts() {
        let grant = TokenGrant {
            access_token: "secret_access".to_string(),
            refresh_token: Some("secret_refresh".to_string()),
            expires_in: 3600,
            token_type: "Bearer".to_string(),
        };
        let debug = format!("{:?}", grant);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret_access"));
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(path_segments("/App/journal/r1.json"), vec!["App", "journal", "r1.json"]);
        assert_eq!(join_path("/App/journal", "r1.json"), "/App/journal/r1.json");
        assert_eq!(join_path("", "App"), "/App");
        assert_eq!(
            split_path("/App/journal/r1.json"),
            ("/App/journal".to_string(), "r1.json".to_string())
        );
    }
}
