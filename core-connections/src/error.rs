use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Cannot reach local storage: {0}")]
    StorageUnavailable(String),

    #[error("Connection {connection_id} not found")]
    NotFound { connection_id: String },

    #[error("Auth payload does not match provider {provider}")]
    AuthMismatch { provider: String },

    #[error("Stored connection record is invalid: {0}")]
    InvalidRecord(String),

    #[error("Secure storage error: {0}")]
    SecureStore(String),

    #[error("Database error: {0}")]
    Database(String),
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
