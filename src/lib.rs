//! # Daybook Sync Core
//!
//! Façade crate wiring host bridges and the shipped providers into a
//! ready [`SyncEngine`]. Host applications depend on this crate, supply
//! their bridge implementations through [`CoreConfig`], and receive the
//! engine plus the connection store and event bus.
//!
//! ```ignore
//! use daybook_workspace::{build_sync_engine, ProviderSettings};
//! use core_runtime::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .database_path(data_dir.join("daybook.db"))
//!     .http_client(http)
//!     .secure_store(keychain)
//!     .build()?;
//!
//! let core = build_sync_engine(&config, ProviderSettings::from_env()).await?;
//! core.engine.clone().start_periodic_sync().await;
//! ```

use std::sync::Arc;

use bridge_traits::provider::{CloudProvider, ProviderError};
use core_auth::{OAuthConfig, ProviderKind};
use core_connections::{Connection, ConnectionError, SqliteConnectionStore};
use core_runtime::events::EventBus;
use core_runtime::CoreConfig;
use core_sync::{
    ProviderFactory, SqliteFileCacheRepository, SqliteSyncQueueRepository, SyncEngine,
    SyncEngineConfig, SyncError,
};
use provider_google_drive::GoogleDriveConnector;
use provider_webdav::WebdavConnector;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Cannot reach local storage: {0}")]
    Storage(String),

    #[error("Connection store error: {0}")]
    Connections(#[from] ConnectionError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Provider wiring settings for the standard factory.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// OAuth configuration for Google Drive
    pub google_oauth: OAuthConfig,
    /// Base URL of the trusted WebDAV relay
    pub relay_base_url: String,
}

impl ProviderSettings {
    /// Settings from the environment (`GOOGLE_CLIENT_ID`,
    /// `GOOGLE_CLIENT_SECRET`, `DAYBOOK_RELAY_URL`), with placeholder
    /// fallbacks for development builds.
    pub fn from_env() -> Self {
        Self {
            google_oauth: OAuthConfig {
                provider: ProviderKind::GoogleDrive,
                client_id: std::env::var("GOOGLE_CLIENT_ID")
                    .unwrap_or_else(|_| "placeholder_client_id".to_string()),
                client_secret: std::env::var("GOOGLE_CLIENT_SECRET").ok(),
                scopes: vec!["https://www.googleapis.com/auth/drive.file".to_string()],
                auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_url: "https://oauth2.googleapis.com/token".to_string(),
            },
            relay_base_url: std::env::var("DAYBOOK_RELAY_URL")
                .unwrap_or_else(|_| "https://relay.daybook.app".to_string()),
        }
    }
}

/// Factory building the shipped connectors, keyed by provider kind.
///
/// Returns explicit configuration errors instead of null values when a
/// connection is missing the auth payload its kind requires.
pub struct StandardProviderFactory {
    http_client: Arc<dyn bridge_traits::HttpClient>,
    settings: ProviderSettings,
}

impl StandardProviderFactory {
    pub fn new(
        http_client: Arc<dyn bridge_traits::HttpClient>,
        settings: ProviderSettings,
    ) -> Self {
        Self {
            http_client,
            settings,
        }
    }
}

impl ProviderFactory for StandardProviderFactory {
    fn create(
        &self,
        connection: &Connection,
    ) -> std::result::Result<Arc<dyn CloudProvider>, ProviderError> {
        match connection.provider {
            ProviderKind::GoogleDrive => {
                let tokens = connection.auth.oauth_tokens().ok_or_else(|| {
                    ProviderError::configuration("Google Drive connection has no token set")
                })?;
                Ok(Arc::new(GoogleDriveConnector::with_tokens(
                    self.http_client.clone(),
                    self.settings.google_oauth.clone(),
                    tokens.clone(),
                )))
            }
            ProviderKind::Webdav => {
                let credentials = connection.auth.credentials().ok_or_else(|| {
                    ProviderError::configuration("WebDAV connection has no credentials")
                })?;
                Ok(Arc::new(WebdavConnector::with_credentials(
                    self.http_client.clone(),
                    self.settings.relay_base_url.clone(),
                    credentials.clone(),
                )))
            }
        }
    }
}

/// Everything the host needs after bootstrap.
pub struct BuiltCore {
    pub engine: Arc<SyncEngine>,
    pub connections: Arc<SqliteConnectionStore>,
    pub event_bus: EventBus,
    pub pool: SqlitePool,
}

/// Open durable storage, wire the standard providers, and assemble the
/// engine with its network and lifecycle triggers attached.
pub async fn build_sync_engine(
    config: &CoreConfig,
    settings: ProviderSettings,
) -> Result<BuiltCore> {
    let options = SqliteConnectOptions::new()
        .filename(&config.database_path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .map_err(|e| CoreError::Storage(e.to_string()))?;

    let connections = Arc::new(SqliteConnectionStore::new(
        pool.clone(),
        config.secure_store.clone(),
    ));
    connections.initialize().await?;

    let queue_repository = Arc::new(SqliteSyncQueueRepository::new(pool.clone()));
    queue_repository.initialize().await?;
    let file_cache = Arc::new(SqliteFileCacheRepository::new(pool.clone()));
    file_cache.initialize().await?;

    let event_bus = EventBus::new(config.event_buffer_size);
    let factory = Arc::new(StandardProviderFactory::new(
        config.http_client.clone(),
        settings,
    ));

    let engine = Arc::new(SyncEngine::new(
        queue_repository,
        file_cache,
        connections.clone(),
        factory,
        config.network_monitor.clone(),
        event_bus.clone(),
        SyncEngineConfig {
            operation_timeout: config.operation_timeout,
            sync_interval: config.sync_interval,
            ..SyncEngineConfig::default()
        },
    ));

    engine.clone().watch_network().await?;
    if let Some(observer) = &config.lifecycle_observer {
        engine.clone().watch_lifecycle(observer.clone()).await?;
    }

    info!(database = %config.database_path.display(), "Sync core assembled");
    Ok(BuiltCore {
        engine,
        connections,
        event_bus,
        pool,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_auth::OAuthTokens;
    use core_connections::UserId;

    struct NoopHttp;

    #[async_trait::async_trait]
    impl bridge_traits::HttpClient for NoopHttp {
        async fn execute(
            &self,
            _request: bridge_traits::HttpRequest,
        ) -> bridge_traits::error::Result<bridge_traits::HttpResponse> {
            Err(bridge_traits::BridgeError::NotAvailable("noop".to_string()))
        }
    }

    fn factory() -> StandardProviderFactory {
        StandardProviderFactory::new(Arc::new(NoopHttp), ProviderSettings::from_env())
    }

    #[test]
    fn test_factory_builds_google_drive_connector() {
        let connection = Connection::new_oauth(
            UserId::from("user-1"),
            ProviderKind::GoogleDrive,
            OAuthTokens::new("at".to_string(), None, 3600, "Bearer".to_string()),
            "/Apps/Daybook",
        )
        .unwrap();

        assert!(factory().create(&connection).is_ok());
    }

    #[test]
    fn test_factory_builds_webdav_connector() {
        let connection = Connection::new_credentials(
            UserId::from("user-1"),
            ProviderKind::Webdav,
            bridge_traits::provider::ProviderCredentials {
                endpoint_url: "https://dav.example.com".to_string(),
                username: "user".to_string(),
                secret: "pass".to_string(),
                private_key: None,
                base_path: None,
            },
            "/Daybook",
        )
        .unwrap();

        assert!(factory().create(&connection).is_ok());
    }
}
