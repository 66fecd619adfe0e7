//! Application Lifecycle Abstraction
//!
//! Surfaces host foreground/background transitions so the core can flush
//! pending work before the process may be suspended.

use async_trait::async_trait;

use crate::error::Result;

/// Application lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycleEvent {
    /// Application moved to the foreground
    Foreground,
    /// Application lost foreground focus (may be suspended soon)
    Background,
    /// Application is terminating
    Terminating,
}

/// Application lifecycle observer trait
///
/// Hosts push lifecycle transitions through this stream; the sync engine
/// uses the `Background` transition to trigger a final drain before
/// suspension.
#[async_trait]
pub trait LifecycleObserver: Send + Sync {
    /// Subscribe to lifecycle transitions
    async fn subscribe(&self) -> Result<Box<dyn LifecycleEventStream>>;
}

/// Stream of lifecycle events
#[async_trait]
pub trait LifecycleEventStream: Send {
    /// Get the next lifecycle event
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<AppLifecycleEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_event_equality() {
        assert_eq!(AppLifecycleEvent::Background, AppLifecycleEvent::Background);
        assert_ne!(AppLifecycleEvent::Foreground, AppLifecycleEvent::Background);
    }
}
