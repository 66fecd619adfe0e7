//! # Connection Management
//!
//! Durable record of each user's configured backend connections.
//!
//! ## Overview
//!
//! - **Model** (`model`): [`Connection`] with its auth payload — an enum
//!   whose arms make "OAuth tokens or credentials, never both" structural
//! - **Store** (`store`): [`ConnectionStore`] trait and the SQLite +
//!   SecureStore implementation enforcing the single-default-per-user
//!   invariant on every save

pub mod error;
pub mod model;
pub mod store;

pub use error::{ConnectionError, Result};
pub use model::{AuthPayload, Connection, ConnectionId, UserId};
pub use store::{ConnectionStore, SqliteConnectionStore};
