use core_connections::ConnectionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Cannot reach local storage: {0}")]
    StorageUnavailable(String),

    #[error("Queue item {item_id} not found")]
    ItemNotFound { item_id: String },

    #[error("No adapter registered for record type {record_type}")]
    AdapterMissing { record_type: String },

    #[error("Invalid queue item status: {0}")]
    InvalidStatus(String),

    #[error("Invalid sync action: {0}")]
    InvalidAction(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Host bridge error: {0}")]
    Bridge(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<ConnectionError> for SyncError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::StorageUnavailable(msg) => SyncError::StorageUnavailable(msg),
            other => SyncError::Connection(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
