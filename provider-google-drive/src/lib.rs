//! # Google Drive Provider
//!
//! [`CloudProvider`](bridge_traits::provider::CloudProvider) implementation
//! for Google Drive API v3: OAuth-family authentication (delegating to
//! `core-auth`'s flow manager) and the full file-operation surface with
//! segment-walking path resolution.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::GoogleDriveConnector;
pub use error::GoogleDriveError;
pub use types::{DriveFile, FilesListResponse};
