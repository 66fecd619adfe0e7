//! OAuth 2.0 Authorization Flow Manager with PKCE Support
//!
//! Implements RFC 6749 (OAuth 2.0) and RFC 7636 (PKCE) for the
//! OAuth-family backends.
//!
//! # Overview
//!
//! The flow manager handles:
//! - Building authorization URLs with a PKCE challenge and a
//!   caller-supplied state token (see [`crate::state`])
//! - Exchanging authorization codes for tokens
//! - Refreshing access tokens
//!
//! # Security
//!
//! - PKCE S256 challenge on every authorization URL
//! - Cryptographically random code verifier
//! - Token material never logged
//!
//! # Example
//!
//! ```no_run
//! use core_auth::oauth::{OAuthFlowManager, OAuthConfig};
//! use core_auth::ProviderKind;
//! use std::sync::Arc;
//!
//! # async fn example() -> core_auth::Result<()> {
//! # use bridge_traits::http::HttpClient;
//! # let http_client: Arc<dyn HttpClient> = todo!();
//! let config = OAuthConfig {
//!     provider: ProviderKind::GoogleDrive,
//!     client_id: "your-client-id".to_string(),
//!     client_secret: Some("your-client-secret".to_string()),
//!     scopes: vec!["https://www.googleapis.com/auth/drive.file".to_string()],
//!     auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
//!     token_url: "https://oauth2.googleapis.com/token".to_string(),
//! };
//!
//! let flow_manager = OAuthFlowManager::new(config, http_client);
//! let (auth_url, verifier) =
//!     flow_manager.build_auth_url("http://localhost:8080/callback", "opaque-state")?;
//! // Redirect user to auth_url...
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{OAuthTokens, ProviderKind};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bytes::Bytes;
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Timeout applied to token endpoint requests
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry attempts for 5xx responses from the token endpoint
const TOKEN_REQUEST_RETRIES: u32 = 3;

/// OAuth 2.0 provider configuration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// The provider kind this configuration belongs to
    pub provider: ProviderKind,
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret (optional for public clients)
    pub client_secret: Option<String>,
    /// List of OAuth scopes to request
    pub scopes: Vec<String>,
    /// Authorization endpoint URL
    pub auth_url: String,
    /// Token endpoint URL
    pub token_url: String,
}

/// PKCE (Proof Key for Code Exchange) verifier.
///
/// Must be stored for the duration of the authorization flow and supplied
/// when exchanging the authorization code. Never transmitted to the
/// authorization server; only the derived challenge is.
#[derive(Debug, Clone)]
pub struct PkceVerifier {
    verifier: String,
}

impl PkceVerifier {
    /// Create a new verifier from 32 bytes of CSPRNG output
    /// (43-128 characters per RFC 7636 after base64url encoding).
    pub fn new() -> Self {
        let mut verifier_bytes = [0u8; 32];
        rand::thread_rng().fill(&mut verifier_bytes);
        Self {
            verifier: URL_SAFE_NO_PAD.encode(verifier_bytes),
        }
    }

    /// Get the code verifier string.
    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    /// Compute the code challenge: BASE64URL(SHA256(code_verifier))
    pub fn challenge(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Token endpoint response body
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
}

/// OAuth 2.0 flow manager.
pub struct OAuthFlowManager {
    config: OAuthConfig,
    http_client: Arc<dyn HttpClient>,
}

impl OAuthFlowManager {
    pub fn new(config: OAuthConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            http_client,
        }
    }

    /// Build the authorization URL with PKCE challenge.
    ///
    /// `state` is the caller's opaque state token (CSRF protection plus
    /// callback routing); it is passed through verbatim.
    ///
    /// # Returns
    ///
    /// A tuple of (authorization_url, pkce_verifier). The verifier must be
    /// retained for [`Self::exchange_code`].
    #[instrument(skip(self, state), fields(provider = %self.config.provider))]
    pub fn build_auth_url(&self, redirect_uri: &str, state: &str) -> Result<(String, PkceVerifier)> {
        let verifier = PkceVerifier::new();
        let challenge = verifier.challenge();

        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| AuthError::Other(format!("Invalid auth URL: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair("redirect_uri", redirect_uri);
            query.append_pair("response_type", "code");
            query.append_pair("scope", &self.config.scopes.join(" "));
            query.append_pair("state", state);
            query.append_pair("code_challenge", &challenge);
            query.append_pair("code_challenge_method", "S256");
            query.append_pair("access_type", "offline"); // Request refresh token
            query.append_pair("prompt", "consent");
        }

        debug!("Built authorization URL");
        Ok((url.to_string(), verifier))
    }

    /// Exchange an authorization code for a token set.
    #[instrument(skip(self, code, verifier), fields(provider = %self.config.provider))]
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        verifier: &PkceVerifier,
    ) -> Result<OAuthTokens> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", &self.config.client_id),
            ("code_verifier", verifier.verifier()),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret));
        }

        let response = self
            .post_token_endpoint(&params)
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;

        Ok(Self::into_tokens(response, None))
    }

    /// Obtain a fresh access token from a refresh token.
    ///
    /// Providers often omit the refresh token from the refresh response;
    /// the previous refresh token is carried forward in that case.
    #[instrument(skip(self, refresh_token), fields(provider = %self.config.provider))]
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<OAuthTokens> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.config.client_id),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret));
        }

        let response = self
            .post_token_endpoint(&params)
            .await
            .map_err(|e| AuthError::TokenRefreshFailed(e.to_string()))?;

        Ok(Self::into_tokens(response, Some(refresh_token.to_string())))
    }

    fn into_tokens(response: TokenResponse, previous_refresh: Option<String>) -> OAuthTokens {
        OAuthTokens::new(
            response.access_token,
            response.refresh_token.or(previous_refresh),
            response.expires_in.unwrap_or(3600),
            response.token_type.unwrap_or_else(|| "Bearer".to_string()),
        )
    }

    /// POST form parameters to the token endpoint, retrying 5xx responses
    /// with exponential backoff.
    async fn post_token_endpoint(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let body = serde_urlencoded::to_string(params)
            .map_err(|e| AuthError::Other(format!("Failed to encode form body: {}", e)))?;

        let mut attempt = 0;
        loop {
            let request = HttpRequest::new(HttpMethod::Post, self.config.token_url.clone())
                .header("Content-Type", "application/x-www-form-urlencoded")
                .header("Accept", "application/json")
                .body(Bytes::from(body.clone()))
                .timeout(TOKEN_REQUEST_TIMEOUT);

            let result = self.http_client.execute(request).await;

            match result {
                Ok(response) if response.is_success() => {
                    return serde_json::from_slice(&response.body).map_err(|e| {
                        AuthError::Other(format!("Malformed token response: {}", e))
                    });
                }
                Ok(response) if response.is_server_error() && attempt + 1 < TOKEN_REQUEST_RETRIES => {
                    attempt += 1;
                    let backoff_ms = 100u64 * 2u64.pow(attempt);
                    warn!(
                        status = response.status,
                        attempt, backoff_ms, "Token endpoint returned server error, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                Ok(response) => {
                    let detail = response.text().unwrap_or_default();
                    return Err(AuthError::Http(format!(
                        "token endpoint returned {}: {}",
                        response.status, detail
                    )));
                }
                Err(e) if attempt + 1 < TOKEN_REQUEST_RETRIES => {
                    attempt += 1;
                    let backoff_ms = 100u64 * 2u64.pow(attempt);
                    warn!(error = %e, attempt, backoff_ms, "Token endpoint request failed, retrying");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                Err(e) => return Err(AuthError::Http(e.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::HttpResponse;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        Http {}

        #[async_trait::async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn test_config() -> OAuthConfig {
        OAuthConfig {
            provider: ProviderKind::GoogleDrive,
            client_id: "client-id".to_string(),
            client_secret: Some("client-secret".to_string()),
            scopes: vec!["https://www.googleapis.com/auth/drive.file".to_string()],
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
        }
    }

    #[test]
    fn test_pkce_challenge_is_deterministic() {
        let verifier = PkceVerifier::new();
        assert_eq!(verifier.challenge(), verifier.challenge());
        assert_ne!(verifier.challenge(), verifier.verifier());
        // RFC 7636: 43-128 characters
        assert!(verifier.verifier().len() >= 43);
    }

    #[test]
    fn test_build_auth_url_contains_required_params() {
        let manager = OAuthFlowManager::new(test_config(), Arc::new(MockHttp::new()));
        let (url, _verifier) = manager
            .build_auth_url("http://localhost:8080/callback", "opaque-state")
            .unwrap();

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=client-id"));
        assert!(url.contains("state=opaque-state"));
        assert!(url.contains("code_challenge="));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("access_type=offline"));
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let mut http = MockHttp::new();
        http.expect_execute().times(1).returning(|req| {
            let body = String::from_utf8(req.body.unwrap().to_vec()).unwrap();
            assert!(body.contains("grant_type=authorization_code"));
            assert!(body.contains("code_verifier="));

            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: Bytes::from(
                    r#"{"access_token":"at","refresh_token":"rt","expires_in":3600,"token_type":"Bearer"}"#,
                ),
            })
        });

        let manager = OAuthFlowManager::new(test_config(), Arc::new(http));
        let verifier = PkceVerifier::new();
        let tokens = manager
            .exchange_code("auth-code", "http://localhost:8080/callback", &verifier)
            .await
            .unwrap();

        assert_eq!(tokens.access_token, "at");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt"));
        assert!(!tokens.is_expired());
    }

    #[tokio::test]
    async fn test_refresh_carries_previous_refresh_token() {
        let mut http = MockHttp::new();
        http.expect_execute().times(1).returning(|_| {
            // Refresh responses commonly omit refresh_token
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body: Bytes::from(r#"{"access_token":"new-at","expires_in":3600}"#),
            })
        });

        let manager = OAuthFlowManager::new(test_config(), Arc::new(http));
        let tokens = manager.refresh_access_token("old-rt").await.unwrap();

        assert_eq!(tokens.access_token, "new-at");
        assert_eq!(tokens.refresh_token.as_deref(), Some("old-rt"));
        assert_eq!(tokens.token_type, "Bearer");
    }

    #[tokio::test]
    async fn test_refresh_client_error_is_not_retried() {
        let mut http = MockHttp::new();
        http.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse {
                status: 400,
                headers: HashMap::new(),
                body: Bytes::from(r#"{"error":"invalid_grant"}"#),
            })
        });

        let manager = OAuthFlowManager::new(test_config(), Arc::new(http));
        let result = manager.refresh_access_token("revoked").await;

        assert!(matches!(result, Err(AuthError::TokenRefreshFailed(_))));
    }

    #[tokio::test]
    async fn test_token_endpoint_retries_server_errors() {
        let mut http = MockHttp::new();
        let mut calls = 0;
        http.expect_execute().times(3).returning(move |_| {
            calls += 1;
            if calls < 3 {
                Ok(HttpResponse {
                    status: 503,
                    headers: HashMap::new(),
                    body: Bytes::new(),
                })
            } else {
                Ok(HttpResponse {
                    status: 200,
                    headers: HashMap::new(),
                    body: Bytes::from(r#"{"access_token":"at","expires_in":60}"#),
                })
            }
        });

        let manager = OAuthFlowManager::new(test_config(), Arc::new(http));
        let verifier = PkceVerifier::new();
        let tokens = manager
            .exchange_code("code", "http://localhost/cb", &verifier)
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "at");
    }
}
