//! # Sync Core
//!
//! Decides what must move between local storage and a remote backend,
//! persists that intent durably, executes transfers against the uniform
//! provider capability interface, detects and resolves conflicts, and
//! keeps tokens usable across the process lifetime.
//!
//! ## Components
//!
//! - **Durable Sync Queue** (`queue`): persisted transfer intents with
//!   retry accounting and the optional upload file cache
//! - **Conflict Policy** (`conflict`): checksum-divergence handling and
//!   conflict-copy path construction
//! - **Record Adapters** (`adapter`): the opaque-content callback pair
//!   each record type supplies
//! - **Provider Registry** (`registry`): live provider instances per
//!   connection with automatic token refresh and demotion
//! - **Sync Engine** (`engine`): the single-flight drain state machine,
//!   status aggregation, and drain triggers

pub mod adapter;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod queue;
pub mod registry;

pub use adapter::{AdapterError, AdapterResult, RecordAdapter, RecordContent};
pub use conflict::{conflict_copy_path, ConflictPolicy};
pub use engine::{sha256_hex, DrainOutcome, ItemOutcome, SyncEngine, SyncEngineConfig};
pub use error::{Result, SyncError};
pub use queue::{
    CachedContent, FileCacheRepository, QueueItemStatus, SqliteFileCacheRepository,
    SqliteSyncQueueRepository, SyncAction, SyncItemId, SyncQueue, SyncQueueItem,
    SyncQueueRepository, MAX_RETRY_ATTEMPTS,
};
pub use registry::{ProviderFactory, ProviderRegistry};
