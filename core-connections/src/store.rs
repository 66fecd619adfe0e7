//! # Connection Store
//!
//! Durable CRUD over [`Connection`] records, keyed by user.
//!
//! ## Overview
//!
//! Non-secret connection state lives in the `connections` SQLite table;
//! the auth payload (token set or credentials) is serialized into the
//! host [`SecureStore`] under `connection.<id>.auth`. Store operations
//! stitch the two halves back together.
//!
//! The single-default invariant is enforced on every save: when a
//! connection arrives flagged default, every other connection of the same
//! user has its flag cleared first (sequential statements; cross-record
//! atomicity is not required).

use async_trait::async_trait;
use bridge_traits::SecureStore;
use chrono::{DateTime, Utc};
use core_auth::ProviderKind;
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::{ConnectionError, Result};
use crate::model::{AuthPayload, Connection, ConnectionId, UserId};

/// Repository trait for connection persistence
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Insert or update a connection, enforcing the single-default
    /// invariant for its user.
    async fn save(&self, connection: &Connection) -> Result<()>;

    /// Find a connection by ID
    async fn get(&self, id: ConnectionId) -> Result<Option<Connection>>;

    /// All connections of a user, in insertion order
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Connection>>;

    /// The connection flagged default, else the first connection, else none
    async fn get_default(&self, user_id: &UserId) -> Result<Option<Connection>>;

    /// Delete a connection and its secret payload
    ///
    /// # Errors
    ///
    /// [`ConnectionError::NotFound`] when no such record exists.
    async fn remove(&self, id: ConnectionId) -> Result<()>;
}

/// SQLite + SecureStore implementation of [`ConnectionStore`]
pub struct SqliteConnectionStore {
    pool: SqlitePool,
    secure_store: Arc<dyn SecureStore>,
}

/// Database row representation of a connection (non-secret half)
#[derive(Debug, FromRow)]
struct ConnectionRow {
    id: String,
    user_id: String,
    provider: String,
    sync_root: String,
    is_default: bool,
    is_connected: bool,
    last_error: Option<String>,
    last_synced_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

fn secret_key(id: ConnectionId) -> String {
    format!("connection.{}.auth", id)
}

fn timestamp_to_datetime(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| ConnectionError::InvalidRecord(format!("Invalid timestamp: {}", secs)))
}

fn map_sqlx(e: sqlx::Error) -> ConnectionError {
    match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            ConnectionError::StorageUnavailable(e.to_string())
        }
        _ => ConnectionError::Database(e.to_string()),
    }
}

impl SqliteConnectionStore {
    pub fn new(pool: SqlitePool, secure_store: Arc<dyn SecureStore>) -> Self {
        Self { pool, secure_store }
    }

    /// Create the `connections` table and its user index if absent
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS connections (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                sync_root TEXT NOT NULL,
                is_default INTEGER NOT NULL DEFAULT 0,
                is_connected INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                last_synced_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_connections_user
            ON connections(user_id, created_at ASC)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn hydrate(&self, row: ConnectionRow) -> Result<Connection> {
        let id = ConnectionId::from_string(&row.id)?;

        let provider = ProviderKind::parse(&row.provider).ok_or_else(|| {
            ConnectionError::InvalidRecord(format!("Unknown provider: {}", row.provider))
        })?;

        let secret = self
            .secure_store
            .get_secret(&secret_key(id))
            .await
            .map_err(|e| ConnectionError::SecureStore(e.to_string()))?
            .ok_or_else(|| {
                ConnectionError::InvalidRecord(format!("Auth payload missing for connection {}", id))
            })?;

        let auth: AuthPayload = serde_json::from_slice(&secret).map_err(|e| {
            ConnectionError::InvalidRecord(format!("Malformed auth payload: {}", e))
        })?;

        Ok(Connection {
            id,
            user_id: UserId::new(row.user_id),
            provider,
            auth,
            sync_root: row.sync_root,
            is_default: row.is_default,
            is_connected: row.is_connected,
            last_error: row.last_error,
            last_synced_at: row
                .last_synced_at
                .map(timestamp_to_datetime)
                .transpose()?,
            created_at: timestamp_to_datetime(row.created_at)?,
            updated_at: timestamp_to_datetime(row.updated_at)?,
        })
    }
}

const SELECT_COLUMNS: &str = "id, user_id, provider, sync_root, is_default, is_connected, \
                              last_error, last_synced_at, created_at, updated_at";

#[async_trait]
impl ConnectionStore for SqliteConnectionStore {
    #[instrument(skip(self, connection), fields(connection_id = %connection.id))]
    async fn save(&self, connection: &Connection) -> Result<()> {
        if !connection.is_auth_consistent() {
            return Err(ConnectionError::AuthMismatch {
                provider: connection.provider.as_str().to_string(),
            });
        }

        // Secret half first: a row without its payload is unusable, the
        // reverse is merely an orphaned secret.
        let auth_json = serde_json::to_vec(&connection.auth).map_err(|e| {
            ConnectionError::InvalidRecord(format!("Auth payload not serializable: {}", e))
        })?;
        self.secure_store
            .set_secret(&secret_key(connection.id), &auth_json)
            .await
            .map_err(|e| ConnectionError::SecureStore(e.to_string()))?;

        if connection.is_default {
            sqlx::query("UPDATE connections SET is_default = 0 WHERE user_id = ? AND id <> ?")
                .bind(connection.user_id.as_str())
                .bind(connection.id.to_string())
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
            debug!("Cleared default flag on sibling connections");
        }

        sqlx::query(
            r#"
            INSERT INTO connections (
                id, user_id, provider, sync_root, is_default, is_connected,
                last_error, last_synced_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                sync_root = excluded.sync_root,
                is_default = excluded.is_default,
                is_connected = excluded.is_connected,
                last_error = excluded.last_error,
                last_synced_at = excluded.last_synced_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(connection.id.to_string())
        .bind(connection.user_id.as_str())
        .bind(connection.provider.as_str())
        .bind(&connection.sync_root)
        .bind(connection.is_default)
        .bind(connection.is_connected)
        .bind(&connection.last_error)
        .bind(connection.last_synced_at.map(|t| t.timestamp()))
        .bind(connection.created_at.timestamp())
        .bind(connection.updated_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn get(&self, id: ConnectionId) -> Result<Option<Connection>> {
        let row = sqlx::query_as::<_, ConnectionRow>(&format!(
            "SELECT {} FROM connections WHERE id = ?",
            SELECT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Connection>> {
        let rows = sqlx::query_as::<_, ConnectionRow>(&format!(
            "SELECT {} FROM connections WHERE user_id = ? ORDER BY created_at ASC",
            SELECT_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let mut connections = Vec::with_capacity(rows.len());
        for row in rows {
            connections.push(self.hydrate(row).await?);
        }
        Ok(connections)
    }

    async fn get_default(&self, user_id: &UserId) -> Result<Option<Connection>> {
        let row = sqlx::query_as::<_, ConnectionRow>(&format!(
            "SELECT {} FROM connections WHERE user_id = ? \
             ORDER BY is_default DESC, created_at ASC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(connection_id = %id))]
    async fn remove(&self, id: ConnectionId) -> Result<()> {
        let result = sqlx::query("DELETE FROM connections WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(ConnectionError::NotFound {
                connection_id: id.to_string(),
            });
        }

        self.secure_store
            .delete_secret(&secret_key(id))
            .await
            .map_err(|e| ConnectionError::SecureStore(e.to_string()))?;

        info!("Connection removed");
        Ok(())
    }
}
