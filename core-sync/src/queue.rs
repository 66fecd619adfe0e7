//! # Durable Sync Queue
//!
//! Persisted list of pending transfer intents so that restarts and
//! offline periods never lose work.
//!
//! ## Overview
//!
//! Each queue item records one intent: move one local record in one
//! direction against one connection. Items accumulate without
//! de-duplication — rapid repeat edits of the same record enqueue
//! distinct items and FIFO drain order decides which write lands last.
//!
//! ## Durability contract
//!
//! Once `enqueue` returns, the item survives a process crash; once
//! `remove` returns, the item never reappears. The queue performs
//! persistence only — status transitions belong to the engine.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use core_connections::ConnectionId;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, SyncError};

/// Retry ceiling: an item failing this many drain attempts is terminal
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Transfer direction of a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncAction {
    Upload,
    Download,
    Delete,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Delete => "delete",
        }
    }
}

impl std::str::FromStr for SyncAction {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upload" => Ok(Self::Upload),
            "download" => Ok(Self::Download),
            "delete" => Ok(Self::Delete),
            _ => Err(SyncError::InvalidAction(s.to_string())),
        }
    }
}

/// Queue item status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueItemStatus {
    /// Awaiting the next drain
    Pending,
    /// Deferred until connectivity returns
    Offline,
    /// Terminal: retry ceiling reached, excluded from automatic drains
    Error,
}

impl QueueItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Offline => "offline",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl std::str::FromStr for QueueItemStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "offline" => Ok(Self::Offline),
            "error" => Ok(Self::Error),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

/// Composite-derived queue item identifier.
///
/// Derived from connection id + record id + creation instant in
/// milliseconds, which keeps ids unique even for rapid repeat edits of
/// the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncItemId(String);

impl SyncItemId {
    pub fn derive(connection_id: ConnectionId, record_id: &str, created_at_ms: i64) -> Self {
        Self(format!("{}:{}:{}", connection_id, record_id, created_at_ms))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SyncItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One pending transfer intent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncQueueItem {
    pub id: SyncItemId,
    /// Local record this intent moves
    pub record_id: String,
    /// Record type selecting the adapter (journal, project, ...)
    pub record_type: String,
    pub connection_id: ConnectionId,
    pub action: SyncAction,
    /// Target path in the remote namespace
    pub remote_path: String,
    pub status: QueueItemStatus,
    /// Monotonically non-decreasing across drain attempts
    pub retry_count: u32,
    /// Unix millis of the last drain attempt
    pub last_attempt_at: Option<i64>,
    pub last_error: Option<String>,
    /// Unix millis at creation
    pub created_at: i64,
}

impl SyncQueueItem {
    /// Create a new intent; `online` decides `Pending` vs `Offline`.
    pub fn new(
        record_id: impl Into<String>,
        record_type: impl Into<String>,
        connection_id: ConnectionId,
        action: SyncAction,
        remote_path: impl Into<String>,
        online: bool,
    ) -> Self {
        let record_id = record_id.into();
        let created_at = Utc::now().timestamp_millis();
        Self {
            id: SyncItemId::derive(connection_id, &record_id, created_at),
            record_id,
            record_type: record_type.into(),
            connection_id,
            action,
            remote_path: remote_path.into(),
            status: if online {
                QueueItemStatus::Pending
            } else {
                QueueItemStatus::Offline
            },
            retry_count: 0,
            last_attempt_at: None,
            last_error: None,
            created_at,
        }
    }

    /// Whether another automatic attempt is allowed
    pub fn can_retry(&self) -> bool {
        self.retry_count < MAX_RETRY_ATTEMPTS
    }

    /// Record one failed drain attempt; flips to terminal `Error` at the
    /// retry ceiling.
    pub fn register_failure(&mut self, error: impl Into<String>) {
        self.retry_count += 1;
        self.last_error = Some(error.into());
        self.last_attempt_at = Some(Utc::now().timestamp_millis());
        if !self.can_retry() {
            self.status = QueueItemStatus::Error;
        }
    }

    /// Force the item terminal regardless of the retry count (used for
    /// configuration failures that retrying cannot fix).
    pub fn register_terminal_failure(&mut self, error: impl Into<String>) {
        self.retry_count = self.retry_count.max(MAX_RETRY_ATTEMPTS);
        self.last_error = Some(error.into());
        self.last_attempt_at = Some(Utc::now().timestamp_millis());
        self.status = QueueItemStatus::Error;
    }

    /// Manual retry: back to `Pending` with a clean slate.
    pub fn reset_for_retry(&mut self) {
        self.retry_count = 0;
        self.last_error = None;
        self.status = QueueItemStatus::Pending;
    }
}

// ============================================================================
// Repository
// ============================================================================

/// Repository trait for sync queue persistence
#[async_trait]
pub trait SyncQueueRepository: Send + Sync {
    /// Insert a queue item
    async fn insert(&self, item: &SyncQueueItem) -> Result<()>;

    /// Update a queue item
    async fn update(&self, item: &SyncQueueItem) -> Result<()>;

    /// Delete a queue item
    async fn remove(&self, id: &SyncItemId) -> Result<()>;

    /// Find a queue item by ID
    async fn find_by_id(&self, id: &SyncItemId) -> Result<Option<SyncQueueItem>>;

    /// Pending items in insertion order, optionally for one connection
    async fn list_pending(&self, connection_id: Option<ConnectionId>)
        -> Result<Vec<SyncQueueItem>>;

    /// All items regardless of status, in insertion order
    async fn list_all(&self) -> Result<Vec<SyncQueueItem>>;

    /// Count items with the given status
    async fn count_by_status(&self, status: QueueItemStatus) -> Result<u64>;

    /// Flip every `Offline` item back to `Pending`; returns how many
    async fn mark_offline_pending(&self) -> Result<u64>;
}

fn map_sqlx(e: sqlx::Error) -> SyncError {
    match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            SyncError::StorageUnavailable(e.to_string())
        }
        _ => SyncError::Database(e.to_string()),
    }
}

/// Database row representation of a queue item
#[derive(Debug, FromRow)]
struct SyncQueueRow {
    id: String,
    record_id: String,
    record_type: String,
    connection_id: String,
    action: String,
    remote_path: String,
    status: String,
    retry_count: i64,
    last_attempt_at: Option<i64>,
    last_error: Option<String>,
    created_at: i64,
}

impl TryFrom<SyncQueueRow> for SyncQueueItem {
    type Error = SyncError;

    fn try_from(row: SyncQueueRow) -> Result<Self> {
        Ok(SyncQueueItem {
            id: SyncItemId::from_string(row.id),
            record_id: row.record_id,
            record_type: row.record_type,
            connection_id: ConnectionId::from_string(&row.connection_id)
                .map_err(|e| SyncError::Database(e.to_string()))?,
            action: row.action.parse()?,
            remote_path: row.remote_path,
            status: row.status.parse()?,
            retry_count: row.retry_count as u32,
            last_attempt_at: row.last_attempt_at,
            last_error: row.last_error,
            created_at: row.created_at,
        })
    }
}

const QUEUE_COLUMNS: &str = "id, record_id, record_type, connection_id, action, remote_path, \
                             status, retry_count, last_attempt_at, last_error, created_at";

/// SQLite implementation of [`SyncQueueRepository`]
pub struct SqliteSyncQueueRepository {
    pool: SqlitePool,
}

impl SqliteSyncQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `sync_queue` table and its indexes if absent
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_queue (
                id TEXT PRIMARY KEY,
                record_id TEXT NOT NULL,
                record_type TEXT NOT NULL,
                connection_id TEXT NOT NULL,
                action TEXT NOT NULL,
                remote_path TEXT NOT NULL,
                status TEXT NOT NULL,
                retry_count INTEGER NOT NULL DEFAULT 0,
                last_attempt_at INTEGER,
                last_error TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_sync_queue_status
            ON sync_queue(status, created_at ASC)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_sync_queue_connection
            ON sync_queue(connection_id, status)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }
}

#[async_trait]
impl SyncQueueRepository for SqliteSyncQueueRepository {
    async fn insert(&self, item: &SyncQueueItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_queue (
                id, record_id, record_type, connection_id, action, remote_path,
                status, retry_count, last_attempt_at, last_error, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.id.as_str())
        .bind(&item.record_id)
        .bind(&item.record_type)
        .bind(item.connection_id.to_string())
        .bind(item.action.as_str())
        .bind(&item.remote_path)
        .bind(item.status.as_str())
        .bind(item.retry_count as i64)
        .bind(item.last_attempt_at)
        .bind(&item.last_error)
        .bind(item.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn update(&self, item: &SyncQueueItem) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_queue SET
                status = ?,
                retry_count = ?,
                last_attempt_at = ?,
                last_error = ?
            WHERE id = ?
            "#,
        )
        .bind(item.status.as_str())
        .bind(item.retry_count as i64)
        .bind(item.last_attempt_at)
        .bind(&item.last_error)
        .bind(item.id.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(SyncError::ItemNotFound {
                item_id: item.id.to_string(),
            });
        }

        Ok(())
    }

    async fn remove(&self, id: &SyncItemId) -> Result<()> {
        sqlx::query("DELETE FROM sync_queue WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &SyncItemId) -> Result<Option<SyncQueueItem>> {
        let row = sqlx::query_as::<_, SyncQueueRow>(&format!(
            "SELECT {} FROM sync_queue WHERE id = ?",
            QUEUE_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(SyncQueueItem::try_from).transpose()
    }

    async fn list_pending(
        &self,
        connection_id: Option<ConnectionId>,
    ) -> Result<Vec<SyncQueueItem>> {
        let rows = match connection_id {
            Some(connection_id) => {
                sqlx::query_as::<_, SyncQueueRow>(&format!(
                    "SELECT {} FROM sync_queue \
                     WHERE status = 'pending' AND connection_id = ? \
                     ORDER BY created_at ASC",
                    QUEUE_COLUMNS
                ))
                .bind(connection_id.to_string())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, SyncQueueRow>(&format!(
                    "SELECT {} FROM sync_queue \
                     WHERE status = 'pending' \
                     ORDER BY created_at ASC",
                    QUEUE_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(map_sqlx)?;

        rows.into_iter()
            .map(SyncQueueItem::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn list_all(&self) -> Result<Vec<SyncQueueItem>> {
        let rows = sqlx::query_as::<_, SyncQueueRow>(&format!(
            "SELECT {} FROM sync_queue ORDER BY created_at ASC",
            QUEUE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.into_iter()
            .map(SyncQueueItem::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn count_by_status(&self, status: QueueItemStatus) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_queue WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;

        Ok(count as u64)
    }

    async fn mark_offline_pending(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE sync_queue SET status = 'pending' WHERE status = 'offline'")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        Ok(result.rows_affected())
    }
}

// ============================================================================
// File cache
// ============================================================================

/// Content buffered for upload when the adapter cannot supply it at drain
/// time; removed after the upload succeeds.
#[derive(Debug, Clone)]
pub struct CachedContent {
    pub mime_type: String,
    pub content: Bytes,
}

/// Repository trait for the optional upload content buffer
#[async_trait]
pub trait FileCacheRepository: Send + Sync {
    async fn put(&self, record_id: &str, mime_type: &str, content: &[u8]) -> Result<()>;

    async fn get(&self, record_id: &str) -> Result<Option<CachedContent>>;

    async fn remove(&self, record_id: &str) -> Result<()>;
}

/// SQLite implementation of [`FileCacheRepository`]
pub struct SqliteFileCacheRepository {
    pool: SqlitePool,
}

impl SqliteFileCacheRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS file_cache (
                record_id TEXT PRIMARY KEY,
                mime_type TEXT NOT NULL,
                content BLOB NOT NULL,
                cached_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }
}

#[async_trait]
impl FileCacheRepository for SqliteFileCacheRepository {
    async fn put(&self, record_id: &str, mime_type: &str, content: &[u8]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO file_cache (record_id, mime_type, content, cached_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(record_id) DO UPDATE SET
                mime_type = excluded.mime_type,
                content = excluded.content,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(record_id)
        .bind(mime_type)
        .bind(content)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn get(&self, record_id: &str) -> Result<Option<CachedContent>> {
        let row: Option<(String, Vec<u8>)> =
            sqlx::query_as("SELECT mime_type, content FROM file_cache WHERE record_id = ?")
                .bind(record_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;

        Ok(row.map(|(mime_type, content)| CachedContent {
            mime_type,
            content: Bytes::from(content),
        }))
    }

    async fn remove(&self, record_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM file_cache WHERE record_id = ?")
            .bind(record_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        Ok(())
    }
}

// ============================================================================
// Queue wrapper
// ============================================================================

/// Thin wrapper adding logging around the repository; status transitions
/// stay with the engine.
pub struct SyncQueue {
    repository: Arc<dyn SyncQueueRepository>,
}

impl SyncQueue {
    pub fn new(repository: Arc<dyn SyncQueueRepository>) -> Self {
        Self { repository }
    }

    pub async fn enqueue(&self, item: SyncQueueItem) -> Result<SyncItemId> {
        info!(
            item_id = %item.id,
            record_id = %item.record_id,
            action = item.action.as_str(),
            status = item.status.as_str(),
            "Enqueuing sync intent"
        );
        self.repository.insert(&item).await?;
        Ok(item.id)
    }

    pub async fn list_pending(
        &self,
        connection_id: Option<ConnectionId>,
    ) -> Result<Vec<SyncQueueItem>> {
        self.repository.list_pending(connection_id).await
    }

    pub async fn list_all(&self) -> Result<Vec<SyncQueueItem>> {
        self.repository.list_all().await
    }

    pub async fn find_by_id(&self, id: &SyncItemId) -> Result<Option<SyncQueueItem>> {
        self.repository.find_by_id(id).await
    }

    pub async fn update(&self, item: &SyncQueueItem) -> Result<()> {
        self.repository.update(item).await
    }

    pub async fn remove(&self, id: &SyncItemId) -> Result<()> {
        debug!(item_id = %id, "Removing sync intent");
        self.repository.remove(id).await
    }

    pub async fn count_by_status(&self, status: QueueItemStatus) -> Result<u64> {
        self.repository.count_by_status(status).await
    }

    pub async fn mark_offline_pending(&self) -> Result<u64> {
        let flipped = self.repository.mark_offline_pending().await?;
        if flipped > 0 {
            info!(flipped, "Offline items marked pending after reconnect");
        }
        Ok(flipped)
    }
}
