//! Transfer Coordinator - Main entry point
//!
//! The `TransferCoordinator` owns the HTTP downloader, the progress store and
//! the session registry. It validates and probes resources, spawns transfers
//! in the background, answers progress polls and emits events.
//!
//! Each session walks `Requested -> Probed -> Started -> Completed | Failed`.
//! A session may start at most one transfer at a time.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::http::HttpDownloader;
use crate::progress::ProgressStore;
use crate::protocol::{
    EngineStats, ProgressReport, ResourceDescriptor, TransferEvent, TransferId, TransferState,
    TransferStatus,
};
use crate::session::{SessionId, SessionPhase, SessionRegistry};

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Maximum number of events to buffer
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// How long shutdown waits for running transfers to record their final state
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle phase of a caller's most recent request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Requested,
    Probed,
    Started,
    Completed,
    Failed,
}

/// Returned once a transfer task has been spawned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedTransfer {
    pub id: TransferId,
    pub filename: String,
}

/// The transfer coordinator
pub struct TransferCoordinator {
    /// Weak self-reference for spawning background tasks from `&self` methods
    self_ref: Weak<Self>,

    /// Configuration
    config: EngineConfig,

    /// HTTP prober and downloader
    http: Arc<HttpDownloader>,

    /// Per-transfer state read by pollers
    store: Arc<ProgressStore>,

    /// Session token to transfer binding
    sessions: SessionRegistry,

    /// Cancellation handles of running transfers
    running: RwLock<HashMap<TransferId, CancellationToken>>,

    /// Serializes the busy checks and registration in `start`
    start_lock: Mutex<()>,

    /// Transfers whose session expired while they were still running
    orphans: Mutex<Vec<TransferId>>,

    /// Spawned transfer tasks
    tasks: TaskTracker,

    /// Event broadcaster
    event_tx: broadcast::Sender<TransferEvent>,

    /// Shutdown flag
    shutdown: CancellationToken,
}

impl TransferCoordinator {
    /// Obtain a strong `Arc<Self>` reference for spawning background tasks.
    fn arc(&self) -> Result<Arc<Self>> {
        self.self_ref.upgrade().ok_or(EngineError::Shutdown)
    }

    /// Create a new coordinator with the given configuration.
    ///
    /// Must be called from within a Tokio runtime; the session sweeper runs
    /// as a background task.
    pub async fn new(config: EngineConfig) -> Result<Arc<Self>> {
        config.validate()?;

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let http = Arc::new(HttpDownloader::new(&config)?);
        let store = ProgressStore::with_events(event_tx.clone());
        let sessions = SessionRegistry::new(config.session_ttl_duration());

        let coordinator = Arc::new_cyclic(|weak| Self {
            self_ref: weak.clone(),
            config,
            http,
            store,
            sessions,
            running: RwLock::new(HashMap::new()),
            start_lock: Mutex::new(()),
            orphans: Mutex::new(Vec::new()),
            tasks: TaskTracker::new(),
            event_tx,
            shutdown: CancellationToken::new(),
        });

        Self::start_sweeper_task(&coordinator);

        tracing::info!(
            "Transfer coordinator ready (download dir {:?})",
            coordinator.config.download_dir
        );

        Ok(coordinator)
    }

    /// Start background task that expires idle sessions and collects the
    /// finished transfers they owned.
    fn start_sweeper_task(coordinator: &Arc<Self>) {
        let weak = Arc::downgrade(coordinator);
        let shutdown = coordinator.shutdown.clone();
        let period = coordinator.config.sweep_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match weak.upgrade() {
                            Some(coordinator) => {
                                coordinator.sweep(Instant::now());
                            }
                            None => break,
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        });
    }

    /// Resolve the caller's session token, creating a session if needed.
    ///
    /// Returns the session and whether it was newly created.
    pub fn resolve_session(&self, presented: Option<SessionId>) -> (SessionId, bool) {
        self.sessions.resolve(presented)
    }

    /// Look up a presented session token without creating a session
    pub fn known_session(&self, presented: Option<SessionId>) -> Option<SessionId> {
        self.sessions.touch(presented)
    }

    /// Validate a URL and fetch its declared size without downloading it.
    ///
    /// On success the session moves to `Probed`, unless its transfer is
    /// still running; on failure it stays where it was.
    pub async fn probe(&self, session: SessionId, url: &str) -> Result<ResourceDescriptor> {
        if self.shutdown.is_cancelled() {
            return Err(EngineError::Shutdown);
        }

        match self.http.probe(url).await {
            Ok(descriptor) => {
                let request = crate::protocol::TransferRequest {
                    source_url: descriptor.source_url.clone(),
                    declared_extension: descriptor.extension.clone(),
                };
                // A running transfer keeps the session in `Started`
                match self.sessions.current_transfer(session) {
                    Some(id) if !self.store.get(id).is_terminal() => {
                        tracing::debug!(
                            "Session {} probed while transfer {} is running",
                            session,
                            id
                        );
                    }
                    _ => self.sessions.mark_probed(session, request),
                }

                tracing::info!(
                    "Session {} probed {} ({} bytes)",
                    session,
                    descriptor.source_url,
                    descriptor
                        .size_bytes
                        .map_or_else(|| "unknown".to_string(), |n| n.to_string())
                );

                let _ = self.event_tx.send(TransferEvent::Probed {
                    url: descriptor.source_url.clone(),
                    size: descriptor.size_bytes,
                });

                Ok(descriptor)
            }
            Err(e) => {
                tracing::warn!("Session {} probe of {:?} failed: {}", session, url, e);
                Err(e)
            }
        }
    }

    /// Start transferring `url` in the background.
    ///
    /// The URL is validated again here (syntax, filename, allow-list); a
    /// previous probe is not trusted. Returns as soon as the transfer task
    /// has been spawned.
    pub async fn start(&self, session: SessionId, url: &str) -> Result<StartedTransfer> {
        if self.shutdown.is_cancelled() {
            return Err(EngineError::Shutdown);
        }

        let resource = self.http.validate(url)?;
        let filename = resource.filename.clone();
        let engine = self.arc()?;

        let (id, writer) = {
            let _guard = self.start_lock.lock();

            if let Some(current) = self.sessions.current_transfer(session) {
                if !self.store.get(current).is_terminal() {
                    return Err(EngineError::TransferInProgress(current));
                }
            }

            if self.store.is_destination_active(&filename) {
                return Err(EngineError::DestinationBusy(filename));
            }

            let id = TransferId::new();
            let writer = self.store.register(id, resource.url.as_str(), &filename);
            self.sessions.bind_transfer(session, id);
            (id, writer)
        };

        let cancel_token = self.shutdown.child_token();
        self.running.write().insert(id, cancel_token.clone());

        let http = Arc::clone(&self.http);
        let save_dir: PathBuf = self.config.download_dir.clone();
        let task_filename = filename.clone();

        self.tasks.spawn(async move {
            let result = http
                .download(&resource.url, &save_dir, &task_filename, cancel_token, &writer)
                .await;

            match result {
                Ok(bytes) => {
                    writer.complete(bytes);
                    tracing::info!("Transfer {} complete: {} ({} bytes)", id, task_filename, bytes);
                }
                Err(e) => {
                    tracing::warn!("Transfer {} failed: {}", id, e);
                    writer.fail(e.to_string());
                }
            }

            engine.running.write().remove(&id);
        });

        tracing::info!("Session {} started transfer {} for {}", session, id, url.trim());
        let _ = self.event_tx.send(TransferEvent::Started {
            id,
            filename: filename.clone(),
        });

        Ok(StartedTransfer { id, filename })
    }

    /// Progress of the session's current transfer.
    ///
    /// Before a transfer is started this is 0% / pending, never an error.
    pub fn progress(&self, session: SessionId) -> ProgressReport {
        match self.sessions.current_transfer(session) {
            Some(id) => self.store.get(id).into(),
            None => ProgressReport::idle(),
        }
    }

    /// Progress of a specific transfer; unknown ids read as pending
    pub fn progress_of(&self, id: TransferId) -> ProgressReport {
        self.store.get(id).into()
    }

    /// Full state of a transfer, if it is still tracked
    pub fn state(&self, id: TransferId) -> Option<TransferState> {
        self.store.try_get(id)
    }

    /// Transfers that have not reached a terminal state
    pub fn active_transfers(&self) -> Vec<TransferState> {
        self.store.active()
    }

    /// Every transfer the session started, oldest first
    pub fn session_transfers(&self, session: SessionId) -> Vec<TransferId> {
        self.sessions.transfers(session)
    }

    /// Where the session is in its lifecycle
    pub fn phase(&self, session: SessionId) -> LifecyclePhase {
        match self.sessions.phase(session) {
            SessionPhase::Requested => LifecyclePhase::Requested,
            SessionPhase::Probed(_) => LifecyclePhase::Probed,
            SessionPhase::Started(id) => match self.store.get(id).status {
                TransferStatus::Complete => LifecyclePhase::Completed,
                TransferStatus::Failed => LifecyclePhase::Failed,
                TransferStatus::Pending | TransferStatus::InProgress => LifecyclePhase::Started,
            },
        }
    }

    /// Subscribe to transfer events
    pub fn subscribe(&self) -> broadcast::Receiver<TransferEvent> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Process-wide counters
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            streaming: self.http.pool().active_transfers(),
            tracked_transfers: self.store.len(),
            sessions: self.sessions.len(),
            total_downloaded: self.http.pool().total_downloaded(),
        }
    }

    /// Expire idle sessions and drop the finished transfers they owned.
    ///
    /// Transfers still running when their session expired are retried on
    /// later sweeps. Returns how many states were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let expired = self.sessions.expire(now);
        let mut orphans = self.orphans.lock();
        orphans.extend(expired);

        let before = self.store.len();
        let kept = self.store.prune_finished(&orphans);
        *orphans = kept;
        let removed = before.saturating_sub(self.store.len());

        if removed > 0 {
            tracing::debug!(
                "Sweep removed {} transfer states ({} still running)",
                removed,
                orphans.len()
            );
        }
        removed
    }

    /// Graceful shutdown.
    ///
    /// Running transfers are cancelled and recorded as failed.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();

        let pending = self.running.read().len();
        if pending > 0 {
            tracing::info!("Cancelling {} running transfers", pending);
        }

        self.tasks.close();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.tasks.wait())
            .await
            .is_err()
        {
            tracing::warn!("Timed out waiting for transfers to stop");
        }

        Ok(())
    }
}

impl Drop for TransferCoordinator {
    fn drop(&mut self) {
        // Signal shutdown on drop
        self.shutdown.cancel();
    }
}
