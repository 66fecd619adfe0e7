//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host
//! application, plus the cloud provider capability interface.
//!
//! ## Overview
//!
//! This crate defines the contract between the sync core and its
//! environment. Each trait represents a capability the core requires but
//! that is implemented differently per host (desktop, mobile).
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity detection and change stream
//!
//! ### Security & Storage
//! - [`SecureStore`](storage::SecureStore) - Credential persistence (Keychain/Keystore)
//!
//! ### Platform Integration
//! - [`LifecycleObserver`](lifecycle::LifecycleObserver) - App foreground/background transitions
//!
//! ### Backends
//! - [`CloudProvider`](provider::CloudProvider) - Uniform capability contract every
//!   storage backend (OAuth-family or credential-family) must satisfy
//!
//! ## Error Handling
//!
//! Host bridge traits use [`BridgeError`](error::BridgeError); provider
//! operations use the tagged [`ProviderError`](provider::ProviderError)
//! so callers can branch on a machine error kind without exception
//! handling.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync` bounds to support safe concurrent
//! usage across async tasks.

pub mod error;
pub mod http;
pub mod lifecycle;
pub mod network;
pub mod provider;
pub mod storage;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use lifecycle::{AppLifecycleEvent, LifecycleEventStream, LifecycleObserver};
pub use network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use provider::{
    CloudProvider, FileListPage, ProviderCredentials, ProviderError, ProviderErrorKind,
    ProviderResult, RemoteFile, TokenGrant,
};
pub use storage::SecureStore;
