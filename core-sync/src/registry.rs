//! # Live Provider Registry
//!
//! Owns the map of live [`CloudProvider`] instances per connection and
//! keeps OAuth access tokens usable without user interaction.
//!
//! ## Overview
//!
//! `get_live_provider` is the single entry point the engine uses before
//! touching a backend:
//!
//! 1. A cached instance that still reports authenticated is reused.
//! 2. Otherwise the provider is rebuilt from the stored connection via
//!    the injected [`ProviderFactory`].
//! 3. An expired OAuth token with a refresh token triggers a refresh; the
//!    rotated token set is persisted before the instance is handed out.
//! 4. Refresh failure — or expiry without a refresh token — demotes the
//!    connection to disconnected with an explanatory error and yields
//!    "no provider available" instead of retrying silently.
//!
//! Credential-family connections are authenticated by the presence of
//! stored credentials plus their last successful connection test; they
//! have no expiry concept.
//!
//! The registry is owned by the engine instance (not a module singleton)
//! and is invalidated explicitly on disconnect/remove.

use bridge_traits::provider::{CloudProvider, ProviderError};
use core_auth::{AuthFamily, OAuthTokens};
use core_connections::{Connection, ConnectionId, ConnectionStore};
use core_runtime::events::{AuthEvent, ConnectionEvent, CoreEvent, EventBus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;

/// Buffer before token expiry that already counts as expired
const TOKEN_REFRESH_BUFFER_SECS: i64 = 300;

/// Constructs a provider instance for a stored connection.
///
/// Keyed by the connection's provider kind; returns an explicit error
/// (typically [`ProviderErrorKind::Configuration`]) rather than a null
/// value when the kind cannot be built.
///
/// [`ProviderErrorKind::Configuration`]: bridge_traits::provider::ProviderErrorKind::Configuration
pub trait ProviderFactory: Send + Sync {
    fn create(&self, connection: &Connection) -> std::result::Result<Arc<dyn CloudProvider>, ProviderError>;
}

/// Per-engine registry of live provider instances.
pub struct ProviderRegistry {
    store: Arc<dyn ConnectionStore>,
    factory: Arc<dyn ProviderFactory>,
    event_bus: EventBus,
    live: Mutex<HashMap<ConnectionId, Arc<dyn CloudProvider>>>,
}

impl ProviderRegistry {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        factory: Arc<dyn ProviderFactory>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            factory,
            event_bus,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Obtain a usable provider for a connection.
    ///
    /// Returns `Ok(None)` when no provider is available: unknown
    /// connection, demoted connection, failed refresh, or factory
    /// failure. Storage failures propagate as errors.
    #[instrument(skip(self), fields(connection_id = %connection_id))]
    pub async fn get_live_provider(
        &self,
        connection_id: ConnectionId,
    ) -> Result<Option<Arc<dyn CloudProvider>>> {
        // The map lock is held across the rebuild so concurrent callers
        // cannot race two refreshes for the same connection.
        let mut live = self.live.lock().await;

        if let Some(provider) = live.get(&connection_id) {
            if provider.is_authenticated().await {
                debug!("Reusing cached provider instance");
                return Ok(Some(provider.clone()));
            }
            live.remove(&connection_id);
        }

        let Some(connection) = self.store.get(connection_id).await? else {
            warn!("No stored connection for id");
            return Ok(None);
        };

        let connection = match self.refresh_if_needed(connection).await? {
            Some(connection) => connection,
            None => return Ok(None),
        };

        match self.factory.create(&connection) {
            Ok(provider) => {
                live.insert(connection_id, provider.clone());
                Ok(Some(provider))
            }
            Err(e) => {
                warn!(error = %e, "Provider construction failed");
                self.demote(connection, format!("Provider not available: {}", e))
                    .await?;
                Ok(None)
            }
        }
    }

    /// Drop the cached instance for a connection (disconnect/remove).
    pub async fn evict(&self, connection_id: ConnectionId) {
        self.live.lock().await.remove(&connection_id);
    }

    /// Demote a connection after an irrecoverable auth failure observed
    /// mid-operation, evicting any cached instance.
    pub async fn demote_connection(
        &self,
        connection_id: ConnectionId,
        reason: impl Into<String>,
    ) -> Result<()> {
        self.evict(connection_id).await;
        if let Some(connection) = self.store.get(connection_id).await? {
            self.demote(connection, reason).await?;
        }
        Ok(())
    }

    /// Ensure the connection's token set is usable, refreshing when
    /// possible. Returns `None` when the connection was demoted.
    async fn refresh_if_needed(&self, connection: Connection) -> Result<Option<Connection>> {
        if connection.provider.auth_family() == AuthFamily::Credentials {
            // Authenticated by stored credentials plus the last successful
            // connection test; no expiry concept.
            if !connection.is_connected {
                debug!("Credential connection is marked disconnected");
                return Ok(None);
            }
            return Ok(Some(connection));
        }

        let Some(tokens) = connection.auth.oauth_tokens() else {
            let provider = connection.provider.as_str().to_string();
            self.demote(connection, format!("No token set stored for {}", provider))
                .await?;
            return Ok(None);
        };

        if !tokens.is_expired_with_buffer(TOKEN_REFRESH_BUFFER_SECS) {
            return Ok(Some(connection));
        }

        let Some(refresh_token) = tokens.refresh_token.clone() else {
            // Expired with no refresh token: no further network calls.
            info!("Access token expired and no refresh token is stored");
            self.demote(
                connection,
                "Access token expired and no refresh token available",
            )
            .await?;
            return Ok(None);
        };

        self.emit(CoreEvent::Auth(AuthEvent::TokenRefreshing {
            connection_id: connection.id.to_string(),
        }));

        // The connector's refresh path only needs the token endpoint, so
        // building it from the stale connection is fine.
        let provider = match self.factory.create(&connection) {
            Ok(provider) => provider,
            Err(e) => {
                self.demote(connection, format!("Provider not available: {}", e))
                    .await?;
                return Ok(None);
            }
        };

        match provider.refresh(&refresh_token).await {
            Ok(grant) => {
                let tokens: OAuthTokens = grant.into();
                let expires_at = tokens.expires_at.timestamp();
                let connection_id = connection.id;
                let refreshed = connection
                    .with_refreshed_tokens(tokens)
                    .map_err(crate::error::SyncError::from)?;
                self.store.save(&refreshed).await?;

                self.emit(CoreEvent::Auth(AuthEvent::TokenRefreshed {
                    connection_id: connection_id.to_string(),
                    expires_at,
                }));
                info!("Token refreshed and persisted");
                Ok(Some(refreshed))
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                self.emit(CoreEvent::Auth(AuthEvent::AuthError {
                    connection_id: Some(connection.id.to_string()),
                    message: format!("Token refresh failed: {}", e),
                    recoverable: false,
                }));
                self.demote(connection, format!("Token refresh failed: {}", e))
                    .await?;
                Ok(None)
            }
        }
    }

    async fn demote(&self, mut connection: Connection, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        connection.demote(reason.clone());
        self.store.save(&connection).await?;
        self.emit(CoreEvent::Connection(ConnectionEvent::Demoted {
            connection_id: connection.id.to_string(),
            reason,
        }));
        Ok(())
    }

    fn emit(&self, event: CoreEvent) {
        // No subscribers is fine
        let _ = self.event_bus.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::provider::{
        FileListPage, ProviderErrorKind, ProviderResult, RemoteFile, TokenGrant,
    };
    use bridge_traits::SecureStore;
    use bytes::Bytes;
    use core_auth::ProviderKind;
    use core_connections::{SqliteConnectionStore, UserId};
    use sqlx::SqlitePool;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    struct MemorySecureStore {
        entries: StdMutex<StdHashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl SecureStore for MemorySecureStore {
        async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }

        async fn list_keys(&self) -> BridgeResult<Vec<String>> {
            Ok(vec![])
        }

        async fn clear_all(&self) -> BridgeResult<()> {
            Ok(())
        }
    }

    /// Provider double whose refresh outcome is scripted
    struct ScriptedProvider {
        authenticated: AtomicBool,
        refresh_ok: bool,
        refresh_calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl CloudProvider for ScriptedProvider {
        async fn is_authenticated(&self) -> bool {
            self.authenticated.load(Ordering::SeqCst)
        }

        async fn refresh(&self, _refresh_token: &str) -> ProviderResult<TokenGrant> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if self.refresh_ok {
                Ok(TokenGrant {
                    access_token: "rotated".to_string(),
                    refresh_token: Some("rotated-refresh".to_string()),
                    expires_in: 3600,
                    token_type: "Bearer".to_string(),
                })
            } else {
                Err(ProviderError::auth("refresh token revoked"))
            }
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

        async fn get(&self, _: &str) -> ProviderResult<RemoteFile> {
            Err(ProviderError::not_found("empty double"))
        }

        async fn get_by_path(&self, _: &str) -> ProviderResult<Option<RemoteFile>> {
            Ok(None)
        }

        async fn read(&self, _: &str) -> ProviderResult<Bytes> {
            Err(ProviderError::not_found("empty double"))
        }

        async fn write(&self, _: &str, _: Bytes, _: bool) -> ProviderResult<RemoteFile> {
            Err(ProviderError::configuration("empty double"))
        }

        async fn delete(&self, _: &str) -> ProviderResult<()> {
            Ok(())
        }

        async fn move_item(&self, _: &str, _: &str) -> ProviderResult<RemoteFile> {
            Err(ProviderError::configuration("empty double"))
        }

        async fn copy_item(&self, _: &str, _: &str) -> ProviderResult<RemoteFile> {
            Err(ProviderError::configuration("empty double"))
        }

        async fn create_folder(&self, _: &str) -> ProviderResult<RemoteFile> {
            Err(ProviderError::configuration("empty double"))
        }
    }

    struct ScriptedFactory {
        refresh_ok: bool,
        refresh_calls: Arc<AtomicU32>,
    }

    impl ProviderFactory for ScriptedFactory {
        fn create(
            &self,
            _connection: &Connection,
        ) -> std::result::Result<Arc<dyn CloudProvider>, ProviderError> {
            Ok(Arc::new(ScriptedProvider {
                authenticated: AtomicBool::new(true),
                refresh_ok: self.refresh_ok,
                refresh_calls: self.refresh_calls.clone(),
            }))
        }
    }

    struct FailingFactory;

    impl ProviderFactory for FailingFactory {
        fn create(
            &self,
            _connection: &Connection,
        ) -> std::result::Result<Arc<dyn CloudProvider>, ProviderError> {
            Err(ProviderError::new(
                ProviderErrorKind::Configuration,
                "client id missing",
            ))
        }
    }

    async fn connection_store() -> Arc<SqliteConnectionStore> {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        let store = SqliteConnectionStore::new(
            pool,
            Arc::new(MemorySecureStore {
                entries: StdMutex::new(StdHashMap::new()),
            }),
        );
        store.initialize().await.unwrap();
        Arc::new(store)
    }

    fn oauth_connection(expires_in: i64, with_refresh: bool) -> Connection {
        Connection::new_oauth(
            UserId::from("user-1"),
            ProviderKind::GoogleDrive,
            OAuthTokens::new(
                "access".to_string(),
                with_refresh.then(|| "refresh".to_string()),
                expires_in,
                "Bearer".to_string(),
            ),
            "/Apps/Daybook",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_provider_is_cached() {
        let store = connection_store().await;
        let connection = oauth_connection(3600, true);
        store.save(&connection).await.unwrap();

        let refresh_calls = Arc::new(AtomicU32::new(0));
        let registry = ProviderRegistry::new(
            store,
            Arc::new(ScriptedFactory {
                refresh_ok: true,
                refresh_calls: refresh_calls.clone(),
            }),
            EventBus::new(16),
        );

        let first = registry.get_live_provider(connection.id).await.unwrap();
        assert!(first.is_some());
        let second = registry.get_live_provider(connection.id).await.unwrap();
        assert!(second.is_some());
        // No refresh happened for a fresh token
        assert_eq!(refresh_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_token_with_refresh_rotates_and_persists() {
        let store = connection_store().await;
        let connection = oauth_connection(10, true); // inside the 300s buffer
        store.save(&connection).await.unwrap();

        let refresh_calls = Arc::new(AtomicU32::new(0));
        let registry = ProviderRegistry::new(
            store.clone(),
            Arc::new(ScriptedFactory {
                refresh_ok: true,
                refresh_calls: refresh_calls.clone(),
            }),
            EventBus::new(16),
        );

        let provider = registry.get_live_provider(connection.id).await.unwrap();
        assert!(provider.is_some());
        assert_eq!(refresh_calls.load(Ordering::SeqCst), 1);

        let stored = store.get(connection.id).await.unwrap().unwrap();
        let tokens = stored.auth.oauth_tokens().unwrap();
        assert_eq!(tokens.access_token, "rotated");
        assert!(!tokens.is_expired());
        assert!(stored.is_connected);
    }

    #[tokio::test]
    async fn test_refresh_failure_demotes_connection() {
        let store = connection_store().await;
        let connection = oauth_connection(10, true);
        store.save(&connection).await.unwrap();

        let registry = ProviderRegistry::new(
            store.clone(),
            Arc::new(ScriptedFactory {
                refresh_ok: false,
                refresh_calls: Arc::new(AtomicU32::new(0)),
            }),
            EventBus::new(16),
        );

        let provider = registry.get_live_provider(connection.id).await.unwrap();
        assert!(provider.is_none());

        let stored = store.get(connection.id).await.unwrap().unwrap();
        assert!(!stored.is_connected);
        assert!(stored.last_error.as_deref().unwrap().contains("refresh failed"));
    }

    #[tokio::test]
    async fn test_expired_token_without_refresh_demotes_immediately() {
        let store = connection_store().await;
        let connection = oauth_connection(10, false);
        store.save(&connection).await.unwrap();

        let refresh_calls = Arc::new(AtomicU32::new(0));
        let registry = ProviderRegistry::new(
            store.clone(),
            Arc::new(ScriptedFactory {
                refresh_ok: true,
                refresh_calls: refresh_calls.clone(),
            }),
            EventBus::new(16),
        );

        let provider = registry.get_live_provider(connection.id).await.unwrap();
        assert!(provider.is_none());
        // No network call was attempted
        assert_eq!(refresh_calls.load(Ordering::SeqCst), 0);

        let stored = store.get(connection.id).await.unwrap().unwrap();
        assert!(!stored.is_connected);
        assert!(stored
            .last_error
            .as_deref()
            .unwrap()
            .contains("no refresh token"));
    }

    #[tokio::test]
    async fn test_unknown_connection_yields_none() {
        let store = connection_store().await;
        let registry = ProviderRegistry::new(
            store,
            Arc::new(FailingFactory),
            EventBus::new(16),
        );

        let provider = registry
            .get_live_provider(ConnectionId::new())
            .await
            .unwrap();
        assert!(provider.is_none());
    }

    #[tokio::test]
    async fn test_factory_failure_demotes() {
        let store = connection_store().await;
        let connection = oauth_connection(3600, true);
        store.save(&connection).await.unwrap();

        let registry =
            ProviderRegistry::new(store.clone(), Arc::new(FailingFactory), EventBus::new(16));

        let provider = registry.get_live_provider(connection.id).await.unwrap();
        assert!(provider.is_none());

        let stored = store.get(connection.id).await.unwrap().unwrap();
        assert!(!stored.is_connected);
    }

    #[tokio::test]
    async fn test_evict_forces_rebuild() {
        let store = connection_store().await;
        let connection = oauth_connection(3600, true);
        store.save(&connection).await.unwrap();

        let registry = ProviderRegistry::new(
            store,
            Arc::new(ScriptedFactory {
                refresh_ok: true,
                refresh_calls: Arc::new(AtomicU32::new(0)),
            }),
            EventBus::new(16),
        );

        let first = registry
            .get_live_provider(connection.id)
            .await
            .unwrap()
            .unwrap();
        registry.evict(connection.id).await;
        let second = registry
            .get_live_provider(connection.id)
            .await
            .unwrap()
            .unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
    }
}
