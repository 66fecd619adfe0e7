//! # Core Configuration Module
//!
//! Builder for the dependency bundle the sync core needs from its host.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! [`CoreConfig`] holding host bridges and settings. It enforces
//! fail-fast validation: every required bridge must be provided before
//! initialization, with actionable error messages when one is missing.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - all provider traffic
//! - `SecureStore` - token/credential persistence
//!
//! ## Optional Dependencies
//!
//! - `NetworkMonitor` - connectivity detection; without it the core
//!   assumes it is online
//! - `LifecycleObserver` - app foreground/background transitions for the
//!   flush-before-suspension trigger
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/daybook.db")
//!     .http_client(Arc::new(MyHttpClient))
//!     .secure_store(Arc::new(MySecureStore))
//!     .sync_interval(std::time::Duration::from_secs(300))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{HttpClient, LifecycleObserver, NetworkMonitor, SecureStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default interval between periodic drains (5 minutes)
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Default per-operation timeout for provider and storage calls
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Core configuration for the sync core.
///
/// Use [`CoreConfig::builder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// HTTP client for all provider traffic
    pub http_client: Arc<dyn HttpClient>,

    /// Secure storage for token sets and backend credentials
    pub secure_store: Arc<dyn SecureStore>,

    /// Optional connectivity monitor
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    /// Optional app lifecycle observer
    pub lifecycle_observer: Option<Arc<dyn LifecycleObserver>>,

    /// Interval between periodic drains
    pub sync_interval: Duration,

    /// Timeout applied to each provider/storage operation
    pub operation_timeout: Duration,

    /// Event bus buffer capacity
    pub event_buffer_size: usize,
}

impl CoreConfig {
    /// Start building a configuration.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    lifecycle_observer: Option<Arc<dyn LifecycleObserver>>,
    sync_interval: Option<Duration>,
    operation_timeout: Option<Duration>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    pub fn database_path(mut self, path: impl AsRef<Path>) -> Self {
        self.database_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn lifecycle_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.lifecycle_observer = Some(observer);
        self
    }

    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapabilityMissing`] naming the first missing
    /// required bridge, or [`Error::InvalidConfiguration`] for bad
    /// settings.
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self
            .database_path
            .ok_or_else(|| Error::InvalidConfiguration("database_path is required".to_string()))?;

        let http_client = self.http_client.ok_or_else(|| Error::CapabilityMissing {
            capability: "HttpClient".to_string(),
            message: "No HTTP client implementation provided. \
                      Inject the host HTTP adapter before building."
                .to_string(),
        })?;

        let secure_store = self.secure_store.ok_or_else(|| Error::CapabilityMissing {
            capability: "SecureStore".to_string(),
            message: "No secure storage implementation provided. \
                      Tokens and credentials cannot be persisted without one."
                .to_string(),
        })?;

        let sync_interval = self.sync_interval.unwrap_or(DEFAULT_SYNC_INTERVAL);
        if sync_interval.is_zero() {
            return Err(Error::InvalidConfiguration(
                "sync_interval must be non-zero".to_string(),
            ));
        }

        let operation_timeout = self.operation_timeout.unwrap_or(DEFAULT_OPERATION_TIMEOUT);
        if operation_timeout.is_zero() {
            return Err(Error::InvalidConfiguration(
                "operation_timeout must be non-zero".to_string(),
            ));
        }

        Ok(CoreConfig {
            database_path,
            http_client,
            secure_store,
            network_monitor: self.network_monitor,
            lifecycle_observer: self.lifecycle_observer,
            sync_interval,
            operation_timeout,
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        })
    }
}
