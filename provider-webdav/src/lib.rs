//! # WebDAV Provider
//!
//! Credential-family [`CloudProvider`](bridge_traits::provider::CloudProvider)
//! implementation for WebDAV servers, proxied through a trusted HTTPS
//! relay. OAuth-family operations fail fast as unsupported.

pub mod connector;
pub mod error;

pub use connector::WebdavConnector;
pub use error::WebdavError;
