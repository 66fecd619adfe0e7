//! # Sync Engine
//!
//! Drains the durable queue against live providers, applies conflict
//! policy, and reports aggregate status to observers.
//!
//! ## State machine
//!
//! Per queue item: `pending → (in flight, not separately persisted) →
//! {removed on success | offline | error}`. Failures increment the retry
//! count; at the ceiling the item turns terminal `error` and is excluded
//! from automatic drains until manually reset with [`SyncEngine::retry_item`].
//!
//! ## Single-flight drain
//!
//! Only one drain runs at a time; a drain requested while one is in
//! progress is a no-op (the in-flight drain picks up newly queued items
//! on its *next* invocation). There is no mid-item cancellation: an
//! in-flight operation runs to completion before the next item is
//! considered. Stopping periodic sync only prevents future drains.
//!
//! ## Triggers
//!
//! Immediately after enqueue when online ([`SyncEngine::enqueue_and_sync`]),
//! a periodic tick, the offline→online transition, app foreground loss,
//! and explicit [`SyncEngine::sync_now`].
//!
//! ## Error propagation
//!
//! Provider-level failures are converted into queue-item state and never
//! thrown upward. Only [`SyncError::StorageUnavailable`] for the queue or
//! connection store propagates to `enqueue`/`drain` callers — without
//! durable state the engine cannot reason safely.

use bridge_traits::network::{NetworkMonitor, NetworkStatus};
use bridge_traits::provider::{CloudProvider, ProviderError, ProviderErrorKind};
use bridge_traits::AppLifecycleEvent;
use bytes::Bytes;
use chrono::Utc;
use core_connections::ConnectionStore;
use core_runtime::events::{CoreEvent, EventBus, Receiver, SyncEvent, SyncStatus};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::adapter::RecordAdapter;
use crate::conflict::{conflict_copy_path, ConflictPolicy};
use crate::error::{Result, SyncError};
use crate::queue::{
    FileCacheRepository, QueueItemStatus, SyncAction, SyncItemId, SyncQueue, SyncQueueItem,
    SyncQueueRepository,
};
use crate::registry::{ProviderFactory, ProviderRegistry};
use core_connections::ConnectionId;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    /// Policy applied when an upload meets a checksum conflict
    pub conflict_policy: ConflictPolicy,
    /// Timeout per provider operation; elapsing counts as a retryable failure
    pub operation_timeout: Duration,
    /// Interval between periodic drains
    pub sync_interval: Duration,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::CreateCopy,
            operation_timeout: Duration::from_secs(30),
            sync_interval: Duration::from_secs(300),
        }
    }
}

/// Result of one drain request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The drain ran to completion
    Completed { processed: u64, failed: u64 },
    /// Another drain was in flight; this request was a no-op
    AlreadyRunning,
    /// No connectivity; queued items were left untouched
    Offline,
}

/// Reported result of one completed queue item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Uploaded,
    Downloaded,
    Deleted,
    /// Conflict resolved by writing a timestamped sibling copy
    Conflict { copy_path: String },
    /// Conflict resolved by keeping the remote object (`prefer_remote`)
    RemoteKept,
}

impl ItemOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Downloaded => "downloaded",
            Self::Deleted => "deleted",
            Self::Conflict { .. } => "conflict",
            Self::RemoteKept => "remote_kept",
        }
    }
}

/// SHA-256 of `data` as lowercase hex — the content checksum used across
/// the engine and both shipped providers.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Classified failure of one item attempt; stays inside the engine.
struct ItemFailure {
    message: String,
    /// Retrying cannot fix this (configuration/unsupported): go terminal now
    terminal: bool,
    /// The connection should be demoted
    auth: bool,
    kind: Option<ProviderErrorKind>,
}

impl ItemFailure {
    fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            terminal: false,
            auth: false,
            kind: None,
        }
    }

    fn terminal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            terminal: true,
            auth: false,
            kind: None,
        }
    }

    fn from_provider(e: ProviderError) -> Self {
        Self {
            message: e.message.clone(),
            terminal: matches!(
                e.kind,
                ProviderErrorKind::Configuration | ProviderErrorKind::Unsupported
            ),
            auth: e.kind == ProviderErrorKind::Auth,
            kind: Some(e.kind),
        }
    }
}

/// The sync engine. Construct once per core instance and share via `Arc`.
pub struct SyncEngine {
    queue: SyncQueue,
    file_cache: Arc<dyn FileCacheRepository>,
    connections: Arc<dyn ConnectionStore>,
    registry: ProviderRegistry,
    adapters: RwLock<HashMap<String, Arc<dyn RecordAdapter>>>,
    network: Option<Arc<dyn NetworkMonitor>>,
    event_bus: EventBus,
    config: SyncEngineConfig,
    /// Single-flight guard for drains
    drain_lock: Mutex<()>,
    /// True while a drain is executing (feeds status aggregation)
    syncing: AtomicBool,
    periodic: Mutex<Option<CancellationToken>>,
    last_status: Mutex<Option<SyncStatus>>,
}

impl SyncEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue_repository: Arc<dyn SyncQueueRepository>,
        file_cache: Arc<dyn FileCacheRepository>,
        connections: Arc<dyn ConnectionStore>,
        factory: Arc<dyn ProviderFactory>,
        network: Option<Arc<dyn NetworkMonitor>>,
        event_bus: EventBus,
        config: SyncEngineConfig,
    ) -> Self {
        let registry = ProviderRegistry::new(connections.clone(), factory, event_bus.clone());
        Self {
            queue: SyncQueue::new(queue_repository),
            file_cache,
            connections,
            registry,
            adapters: RwLock::new(HashMap::new()),
            network,
            event_bus,
            config,
            drain_lock: Mutex::new(()),
            syncing: AtomicBool::new(false),
            periodic: Mutex::new(None),
            last_status: Mutex::new(None),
        }
    }

    /// Register the adapter serving one record type.
    pub fn register_adapter(&self, record_type: impl Into<String>, adapter: Arc<dyn RecordAdapter>) {
        self.adapters
            .write()
            .expect("adapter registry lock poisoned")
            .insert(record_type.into(), adapter);
    }

    /// Subscribe to the engine's event stream (status transitions, item
    /// outcomes). Dropping the receiver unsubscribes; multiple observers
    /// are independent.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    /// The registry managing live provider instances for this engine.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    async fn is_online(&self) -> bool {
        match &self.network {
            Some(monitor) => monitor.is_connected().await,
            None => true,
        }
    }

    // ------------------------------------------------------------------
    // Queueing
    // ------------------------------------------------------------------

    /// Persist a transfer intent. Status is `pending` when online,
    /// `offline` otherwise. Repeated intents for the same record
    /// accumulate; FIFO drain order decides which wins.
    ///
    /// # Errors
    ///
    /// [`SyncError::StorageUnavailable`] when the queue cannot be written.
    #[instrument(skip_all, fields(record_id = %record_id.as_ref(), action = action.as_str()))]
    pub async fn enqueue(
        &self,
        record_id: impl AsRef<str>,
        record_type: impl AsRef<str>,
        connection_id: ConnectionId,
        action: SyncAction,
        remote_path: impl Into<String>,
    ) -> Result<SyncItemId> {
        let online = self.is_online().await;
        let item = SyncQueueItem::new(
            record_id.as_ref(),
            record_type.as_ref(),
            connection_id,
            action,
            remote_path,
            online,
        );
        let id = self.queue.enqueue(item).await?;
        self.emit_status_change().await.ok();
        Ok(id)
    }

    /// [`Self::enqueue`] plus the immediately-after-enqueue drain trigger
    /// when online. The drain runs on a background task; the returned id
    /// is available right away.
    pub async fn enqueue_and_sync(
        self: Arc<Self>,
        record_id: impl AsRef<str>,
        record_type: impl AsRef<str>,
        connection_id: ConnectionId,
        action: SyncAction,
        remote_path: impl Into<String>,
    ) -> Result<SyncItemId> {
        let id = self
            .enqueue(record_id, record_type, connection_id, action, remote_path)
            .await?;
        if self.is_online().await {
            let engine = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = engine.drain().await {
                    warn!(error = %e, "Post-enqueue drain failed");
                }
            });
        }
        Ok(id)
    }

    /// Buffer upload content for a record whose adapter cannot supply it
    /// at drain time.
    pub async fn stash_content(
        &self,
        record_id: &str,
        mime_type: &str,
        content: &[u8],
    ) -> Result<()> {
        self.file_cache.put(record_id, mime_type, content).await
    }

    /// Manual retry of a terminal item: clears the retry count and error
    /// and re-marks it `pending`.
    pub async fn retry_item(&self, item_id: &SyncItemId) -> Result<()> {
        let mut item =
            self.queue
                .find_by_id(item_id)
                .await?
                .ok_or_else(|| SyncError::ItemNotFound {
                    item_id: item_id.to_string(),
                })?;
        item.reset_for_retry();
        self.queue.update(&item).await?;
        info!(item_id = %item_id, "Item reset for manual retry");
        self.emit_status_change().await.ok();
        Ok(())
    }

    /// Number of terminally failed items awaiting manual retry.
    pub async fn error_count(&self) -> Result<u64> {
        self.queue.count_by_status(QueueItemStatus::Error).await
    }

    /// All queue items, for surfacing in the UI.
    pub async fn list_items(&self) -> Result<Vec<SyncQueueItem>> {
        self.queue.list_all().await
    }

    /// Look up one queue item by id.
    pub async fn find_item(&self, item_id: &SyncItemId) -> Result<Option<SyncQueueItem>> {
        self.queue.find_by_id(item_id).await
    }

    // ------------------------------------------------------------------
    // Status aggregation
    // ------------------------------------------------------------------

    /// Aggregated status with fixed precedence:
    /// `offline > syncing > error > pending > synced`.
    pub async fn overall_status(&self) -> Result<SyncStatus> {
        if !self.is_online().await {
            return Ok(SyncStatus::Offline);
        }
        if self.syncing.load(Ordering::SeqCst) {
            return Ok(SyncStatus::Syncing);
        }
        if self.queue.count_by_status(QueueItemStatus::Error).await? > 0 {
            return Ok(SyncStatus::Error);
        }
        let waiting = self.queue.count_by_status(QueueItemStatus::Pending).await?
            + self.queue.count_by_status(QueueItemStatus::Offline).await?;
        if waiting > 0 {
            return Ok(SyncStatus::Pending);
        }
        Ok(SyncStatus::Synced)
    }

    /// Emit `StatusChanged` when the aggregate moved since the last
    /// emission.
    async fn emit_status_change(&self) -> Result<()> {
        let status = self.overall_status().await?;
        let mut last = self.last_status.lock().await;
        if *last != Some(status) {
            *last = Some(status);
            let _ = self
                .event_bus
                .emit(CoreEvent::Sync(SyncEvent::StatusChanged { status }));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Draining
    // ------------------------------------------------------------------

    /// Explicit user-initiated drain.
    pub async fn sync_now(&self) -> Result<DrainOutcome> {
        self.drain().await
    }

    /// One pass over all pending items. Single-flight: a request during
    /// an active drain returns [`DrainOutcome::AlreadyRunning`] without
    /// waiting. A drain while offline is a no-op leaving items untouched.
    pub async fn drain(&self) -> Result<DrainOutcome> {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            debug!("Drain already in progress, request is a no-op");
            return Ok(DrainOutcome::AlreadyRunning);
        };

        if !self.is_online().await {
            debug!("Offline, drain deferred");
            self.emit_status_change().await.ok();
            return Ok(DrainOutcome::Offline);
        }

        self.syncing.store(true, Ordering::SeqCst);
        let result = self.drain_inner().await;
        self.syncing.store(false, Ordering::SeqCst);
        if result.is_ok() {
            self.emit_status_change().await.ok();
        }
        result
    }

    async fn drain_inner(&self) -> Result<DrainOutcome> {
        self.emit_status_change().await?;

        let items = self.queue.list_pending(None).await?;
        let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::DrainStarted {
            pending: items.len() as u64,
        }));
        info!(pending = items.len(), "Drain started");

        let mut processed = 0u64;
        let mut failed = 0u64;
        for item in items {
            // Items run strictly one at a time, FIFO; a failing item or
            // connection never blocks the ones after it.
            if self.process_item(item).await? {
                processed += 1;
            } else {
                failed += 1;
            }
        }

        let _ = self
            .event_bus
            .emit(CoreEvent::Sync(SyncEvent::DrainFinished { processed, failed }));
        info!(processed, failed, "Drain finished");
        Ok(DrainOutcome::Completed { processed, failed })
    }

    /// Returns `Ok(true)` on success, `Ok(false)` when the item was
    /// failed and left for retry (or went terminal). Only storage
    /// failures become `Err`.
    #[instrument(skip(self, item), fields(item_id = %item.id, action = item.action.as_str()))]
    async fn process_item(&self, mut item: SyncQueueItem) -> Result<bool> {
        item.last_attempt_at = Some(Utc::now().timestamp_millis());

        let provider = match self.registry.get_live_provider(item.connection_id).await? {
            Some(provider) => provider,
            None => {
                self.fail_item(item, ItemFailure::retryable("Provider not available"))
                    .await?;
                return Ok(false);
            }
        };

        let outcome = match item.action {
            SyncAction::Upload => self.process_upload(provider.as_ref(), &item).await,
            SyncAction::Download => self.process_download(provider.as_ref(), &item).await,
            SyncAction::Delete => self.process_delete(provider.as_ref(), &item).await,
        };

        match outcome {
            Ok(outcome) => {
                self.complete_item(&item, outcome).await?;
                Ok(true)
            }
            Err(failure) => {
                if failure.auth {
                    self.registry
                        .demote_connection(item.connection_id, failure.message.clone())
                        .await?;
                }
                self.fail_item(item, failure).await?;
                Ok(false)
            }
        }
    }

    /// Run one provider operation under the configured timeout; elapsing
    /// is a retryable failure like any transient network error.
    async fn provider_call<T>(
        &self,
        fut: impl Future<Output = std::result::Result<T, ProviderError>>,
    ) -> std::result::Result<T, ItemFailure> {
        match tokio::time::timeout(self.config.operation_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ItemFailure::from_provider(e)),
            Err(_) => Err(ItemFailure::retryable(format!(
                "Operation timed out after {}s",
                self.config.operation_timeout.as_secs()
            ))),
        }
    }

    fn adapter_for(
        &self,
        record_type: &str,
    ) -> std::result::Result<Arc<dyn RecordAdapter>, ItemFailure> {
        self.adapters
            .read()
            .expect("adapter registry lock poisoned")
            .get(record_type)
            .cloned()
            .ok_or_else(|| {
                ItemFailure::terminal(format!(
                    "No adapter registered for record type {}",
                    record_type
                ))
            })
    }

    /// Local content for an upload: adapter first, file cache fallback.
    async fn load_content(
        &self,
        item: &SyncQueueItem,
    ) -> std::result::Result<Bytes, ItemFailure> {
        let adapter = self.adapter_for(&item.record_type)?;
        match adapter.load_local_content(&item.record_id).await {
            Ok(Some(content)) => return Ok(content.bytes),
            Ok(None) => {}
            Err(e) => return Err(ItemFailure::retryable(e.to_string())),
        }

        match self.file_cache.get(&item.record_id).await {
            Ok(Some(cached)) => Ok(cached.content),
            Ok(None) => Err(ItemFailure::retryable(format!(
                "Local content unavailable for record {}",
                item.record_id
            ))),
            Err(e) => Err(ItemFailure::retryable(e.to_string())),
        }
    }

    async fn process_upload(
        &self,
        provider: &dyn CloudProvider,
        item: &SyncQueueItem,
    ) -> std::result::Result<ItemOutcome, ItemFailure> {
        let content = self.load_content(item).await?;
        let checksum = sha256_hex(&content);

        let remote = self
            .provider_call(provider.get_by_path(&item.remote_path))
            .await?;

        if let Some(remote) = remote {
            let diverged = !remote.is_folder && remote.checksum.as_deref() != Some(checksum.as_str());
            if diverged {
                debug!(
                    remote_checksum = ?remote.checksum,
                    local_checksum = %checksum,
                    policy = self.config.conflict_policy.as_str(),
                    "Checksum conflict detected"
                );
                return match self.config.conflict_policy {
                    ConflictPolicy::CreateCopy => {
                        let copy_path = conflict_copy_path(&item.remote_path, Utc::now());
                        self.provider_call(provider.write(&copy_path, content, false))
                            .await?;
                        Ok(ItemOutcome::Conflict { copy_path })
                    }
                    ConflictPolicy::PreferRemote => Ok(ItemOutcome::RemoteKept),
                    // ask_user degrades to prefer_local at the engine level;
                    // any prompting happens upstream of the queue
                    ConflictPolicy::PreferLocal | ConflictPolicy::AskUser => {
                        self.provider_call(provider.write(&item.remote_path, content, true))
                            .await?;
                        Ok(ItemOutcome::Uploaded)
                    }
                };
            }
        }

        self.provider_call(provider.write(&item.remote_path, content, true))
            .await?;
        Ok(ItemOutcome::Uploaded)
    }

    async fn process_download(
        &self,
        provider: &dyn CloudProvider,
        item: &SyncQueueItem,
    ) -> std::result::Result<ItemOutcome, ItemFailure> {
        let remote = self
            .provider_call(provider.get_by_path(&item.remote_path))
            .await?
            .ok_or_else(|| {
                ItemFailure::retryable(format!("Remote object missing at {}", item.remote_path))
            })?;

        let content = self.provider_call(provider.read(&remote.id)).await?;

        let adapter = self.adapter_for(&item.record_type)?;
        adapter
            .save_local_content(&item.record_id, content)
            .await
            .map_err(|e| ItemFailure::retryable(e.to_string()))?;

        Ok(ItemOutcome::Downloaded)
    }

    async fn process_delete(
        &self,
        provider: &dyn CloudProvider,
        item: &SyncQueueItem,
    ) -> std::result::Result<ItemOutcome, ItemFailure> {
        let remote = self
            .provider_call(provider.get_by_path(&item.remote_path))
            .await?;

        match remote {
            // Already absent: deleting is idempotent
            None => Ok(ItemOutcome::Deleted),
            Some(remote) => match self.provider_call(provider.delete(&remote.id)).await {
                Ok(()) => Ok(ItemOutcome::Deleted),
                // Vanished between lookup and delete
                Err(failure) if failure.kind == Some(ProviderErrorKind::NotFound) => {
                    Ok(ItemOutcome::Deleted)
                }
                Err(failure) => Err(failure),
            },
        }
    }

    async fn complete_item(&self, item: &SyncQueueItem, outcome: ItemOutcome) -> Result<()> {
        self.queue.remove(&item.id).await?;

        if item.action == SyncAction::Upload {
            if let Err(e) = self.file_cache.remove(&item.record_id).await {
                warn!(error = %e, "Failed to evict file cache entry");
            }
        }

        if let Some(mut connection) = self.connections.get(item.connection_id).await? {
            connection.mark_synced();
            self.connections.save(&connection).await?;
        }

        info!(outcome = outcome.as_str(), "Sync intent completed");
        let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::ItemCompleted {
            item_id: item.id.to_string(),
            record_id: item.record_id.clone(),
            outcome: outcome.as_str().to_string(),
        }));
        Ok(())
    }

    async fn fail_item(&self, mut item: SyncQueueItem, failure: ItemFailure) -> Result<()> {
        if failure.terminal {
            item.register_terminal_failure(failure.message.as_str());
        } else {
            item.register_failure(failure.message.as_str());
        }
        self.queue.update(&item).await?;

        let terminal = item.status.is_terminal();
        warn!(
            retry_count = item.retry_count,
            terminal,
            error = %failure.message,
            "Sync intent failed"
        );
        let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::ItemFailed {
            item_id: item.id.to_string(),
            record_id: item.record_id.clone(),
            error: failure.message,
            terminal,
        }));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Triggers
    // ------------------------------------------------------------------

    /// Start the periodic drain task; replaces a previously started one.
    pub async fn start_periodic_sync(self: Arc<Self>) {
        let mut guard = self.periodic.lock().await;
        if let Some(token) = guard.take() {
            token.cancel();
        }
        let token = CancellationToken::new();
        *guard = Some(token.clone());
        drop(guard);

        let engine = Arc::clone(&self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(engine.config.sync_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the enqueue trigger
            // already covers "now"
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = engine.drain().await {
                            warn!(error = %e, "Periodic drain failed");
                        }
                    }
                }
            }
            debug!("Periodic sync stopped");
        });
    }

    /// Stop future periodic drains. Never aborts a drain in progress.
    pub async fn stop_periodic_sync(&self) {
        if let Some(token) = self.periodic.lock().await.take() {
            token.cancel();
        }
    }

    /// Watch the network monitor and re-drain on the offline→online
    /// transition, flipping deferred items back to pending first.
    pub async fn watch_network(self: Arc<Self>) -> Result<()> {
        let Some(monitor) = self.network.clone() else {
            return Ok(());
        };
        let mut was_connected = monitor.is_connected().await;
        let mut stream = monitor
            .subscribe_changes()
            .await
            .map_err(|e| SyncError::Bridge(e.to_string()))?;

        let engine = Arc::clone(&self);
        tokio::spawn(async move {
            while let Some(info) = stream.next().await {
                let connected = info.status == NetworkStatus::Connected;
                if connected && !was_connected {
                    info!("Connectivity restored");
                    if let Err(e) = engine.on_reconnect().await {
                        warn!(error = %e, "Reconnect drain failed");
                    }
                } else if !connected && was_connected {
                    engine.emit_status_change().await.ok();
                }
                was_connected = connected;
            }
        });
        Ok(())
    }

    /// Flip offline items and drain; also usable by hosts driving their
    /// own connectivity signal.
    pub async fn on_reconnect(&self) -> Result<DrainOutcome> {
        self.queue.mark_offline_pending().await?;
        self.drain().await
    }

    /// Watch app lifecycle and flush the queue when the app loses
    /// foreground focus (before a possible suspension).
    pub async fn watch_lifecycle(
        self: Arc<Self>,
        observer: Arc<dyn bridge_traits::LifecycleObserver>,
    ) -> Result<()> {
        let mut stream = observer
            .subscribe()
            .await
            .map_err(|e| SyncError::Bridge(e.to_string()))?;

        let engine = Arc::clone(&self);
        tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                if event == AppLifecycleEvent::Background {
                    debug!("App lost foreground focus, flushing queue");
                    if let Err(e) = engine.drain().await {
                        warn!(error = %e, "Background flush failed");
                    }
                }
            }
        });
        Ok(())
    }
}
