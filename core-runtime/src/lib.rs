//! # Core Runtime
//!
//! Shared runtime infrastructure for the Daybook sync core:
//!
//! - **Event bus** (`events`): typed broadcast channel carrying auth,
//!   connection, and sync events — the observable status stream the UI
//!   layer subscribes to
//! - **Logging** (`logging`): `tracing-subscriber` bootstrap
//! - **Configuration** (`config`): fail-fast builder for host bridges and
//!   core settings

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder};
pub use error::{Error, Result};
pub use events::{
    AuthEvent, ConnectionEvent, CoreEvent, EventBus, EventStream, SyncEvent, SyncStatus,
};
pub use logging::{init_logging, LogFormat, LoggingConfig};
