//! Progress Store
//!
//! A shared table of [`TransferState`]s keyed by [`TransferId`]. Pollers read
//! any entry at any time; each entry is written only through the
//! [`ProgressWriter`] handed out when the transfer was registered, so writes
//! to one transfer are totally ordered and nobody else can mutate it.

use crate::protocol::{TransferEvent, TransferId, TransferState, TransferStatus};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Highest percentage reported before the transfer is actually complete
const MAX_IN_FLIGHT_PERCENT: u8 = 99;

/// Shared, concurrency-safe map of transfer states
pub struct ProgressStore {
    entries: RwLock<HashMap<TransferId, TransferState>>,
    events: Option<broadcast::Sender<TransferEvent>>,
}

impl ProgressStore {
    /// Create an empty store
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            events: None,
        })
    }

    /// Create a store whose writers publish progress events
    pub fn with_events(events: broadcast::Sender<TransferEvent>) -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            events: Some(events),
        })
    }

    /// Current state of a transfer.
    ///
    /// Unknown ids report the default pending state so that a poller racing
    /// the transfer's own startup never sees an error.
    pub fn get(&self, id: TransferId) -> TransferState {
        self.try_get(id)
            .unwrap_or_else(|| TransferState::pending(id))
    }

    /// Current state of a transfer, or `None` if it was never registered
    /// (or has been collected)
    pub fn try_get(&self, id: TransferId) -> Option<TransferState> {
        self.entries.read().get(&id).cloned()
    }

    /// Register a new transfer and return the only handle allowed to write it
    pub fn register(
        self: &Arc<Self>,
        id: TransferId,
        source_url: impl Into<String>,
        filename: impl Into<String>,
    ) -> ProgressWriter {
        let mut state = TransferState::pending(id);
        state.source_url = Some(source_url.into());
        state.filename = Some(filename.into());
        state.created_at = Some(Utc::now());
        self.set(id, state);

        ProgressWriter {
            store: Arc::clone(self),
            id,
        }
    }

    /// Replace the state of a transfer
    pub(crate) fn set(&self, id: TransferId, state: TransferState) {
        self.entries.write().insert(id, state);
    }

    /// Apply an in-place update to an existing entry
    fn update<F>(&self, id: TransferId, f: F) -> Option<TransferState>
    where
        F: FnOnce(&mut TransferState),
    {
        let mut entries = self.entries.write();
        let state = entries.get_mut(&id)?;
        f(state);
        Some(state.clone())
    }

    /// Forget a transfer
    pub fn remove(&self, id: TransferId) -> Option<TransferState> {
        self.entries.write().remove(&id)
    }

    /// Remove the given transfers that already finished.
    ///
    /// Returns the ids that are still running and were kept.
    pub fn prune_finished(&self, ids: &[TransferId]) -> Vec<TransferId> {
        let mut entries = self.entries.write();
        let mut kept = Vec::new();
        for id in ids {
            match entries.get(id) {
                Some(state) if !state.is_terminal() => kept.push(*id),
                Some(_) => {
                    entries.remove(id);
                }
                None => {}
            }
        }
        kept
    }

    /// All transfers that have not reached a terminal state
    pub fn active(&self) -> Vec<TransferState> {
        self.entries
            .read()
            .values()
            .filter(|s| !s.is_terminal())
            .cloned()
            .collect()
    }

    /// Whether a non-terminal transfer writes to `filename`
    pub fn is_destination_active(&self, filename: &str) -> bool {
        self.entries
            .read()
            .values()
            .any(|s| !s.is_terminal() && s.filename.as_deref() == Some(filename))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn publish(&self, event: TransferEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event);
        }
    }
}

/// Exclusive write handle for one transfer's state.
///
/// Not `Clone`: the task driving a transfer owns it for the transfer's
/// lifetime. Once a terminal state is written, further writes are ignored.
pub struct ProgressWriter {
    store: Arc<ProgressStore>,
    id: TransferId,
}

impl ProgressWriter {
    pub fn id(&self) -> TransferId {
        self.id
    }

    /// Mark the body as streaming, recording its declared length if known
    pub fn begin(&self, total_bytes: Option<u64>) {
        self.store.update(self.id, |s| {
            if s.is_terminal() {
                return;
            }
            s.status = TransferStatus::InProgress;
            s.total_bytes = total_bytes;
        });
    }

    /// Record the running byte count.
    ///
    /// With a known total the percentage is `floor(received * 100 / total)`,
    /// never decreases and is capped below 100 until [`complete`](Self::complete).
    /// With an unknown total it keeps its last value.
    pub fn advance(&self, bytes_received: u64) {
        let mut changed = None;
        self.store.update(self.id, |s| {
            if s.is_terminal() {
                return;
            }
            s.bytes_received = bytes_received;
            if let Some(total) = s.total_bytes {
                let pct = percent_of(bytes_received, total);
                if pct > s.percent_complete {
                    s.percent_complete = pct;
                    changed = Some(pct);
                }
            }
        });

        if let Some(percent) = changed {
            self.store.publish(TransferEvent::Progress {
                id: self.id,
                percent,
            });
        }
    }

    /// Mark the transfer complete (100%)
    pub fn complete(&self, bytes_received: u64) {
        self.finish(|s| {
            s.status = TransferStatus::Complete;
            s.percent_complete = 100;
            s.bytes_received = bytes_received;
            s.error_detail = None;
        });
    }

    /// Mark the transfer failed with a description of the cause
    pub fn fail(&self, detail: impl Into<String>) {
        let detail = detail.into();
        self.finish(|s| {
            s.status = TransferStatus::Failed;
            s.error_detail = Some(detail);
        });
    }

    fn finish<F>(&self, f: F)
    where
        F: FnOnce(&mut TransferState),
    {
        let mut finished = None;
        self.store.update(self.id, |s| {
            if s.is_terminal() {
                return;
            }
            f(s);
            s.finished_at = Some(Utc::now());
            finished = Some(s.clone());
        });

        if let Some(event) = finished.as_ref().and_then(TransferEvent::terminal) {
            self.store.publish(event);
        }
    }
}

/// Whole percent of `received` over `total`, capped below 100
fn percent_of(received: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (received as u128 * 100 / total as u128).min(MAX_IN_FLIGHT_PERCENT as u128);
    pct as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_id_reads_as_pending() {
        let store = ProgressStore::new();
        let id = TransferId::new();
        let state = store.get(id);
        assert_eq!(state.id, id);
        assert_eq!(state.percent_complete, 0);
        assert_eq!(state.status, TransferStatus::Pending);
        assert!(store.try_get(id).is_none());
    }

    #[test]
    fn percent_is_floored_and_monotonic() {
        let store = ProgressStore::new();
        let id = TransferId::new();
        let writer = store.register(id, "https://example.com/a.zip", "a.zip");
        writer.begin(Some(1000));

        writer.advance(129);
        assert_eq!(store.get(id).percent_complete, 12);

        // A smaller count must not move the percentage backwards
        writer.advance(50);
        assert_eq!(store.get(id).percent_complete, 12);

        writer.advance(999);
        assert_eq!(store.get(id).percent_complete, 99);
        assert_eq!(store.get(id).status, TransferStatus::InProgress);
    }

    #[test]
    fn hundred_percent_only_on_complete() {
        let store = ProgressStore::new();
        let id = TransferId::new();
        let writer = store.register(id, "https://example.com/a.zip", "a.zip");
        writer.begin(Some(10));
        writer.advance(10);
        assert_eq!(store.get(id).percent_complete, 99);

        writer.complete(10);
        let state = store.get(id);
        assert_eq!(state.percent_complete, 100);
        assert_eq!(state.status, TransferStatus::Complete);
        assert!(state.finished_at.is_some());
    }

    #[test]
    fn unknown_total_keeps_last_percent() {
        let store = ProgressStore::new();
        let id = TransferId::new();
        let writer = store.register(id, "https://example.com/a.zip", "a.zip");
        writer.begin(None);
        writer.advance(4096);

        let state = store.get(id);
        assert_eq!(state.percent_complete, 0);
        assert_eq!(state.bytes_received, 4096);
    }

    #[test]
    fn terminal_state_is_sticky() {
        let store = ProgressStore::new();
        let id = TransferId::new();
        let writer = store.register(id, "https://example.com/a.zip", "a.zip");
        writer.begin(Some(100));
        writer.fail("Network error (timeout): operation timed out");
        writer.complete(100);
        writer.advance(100);

        let state = store.get(id);
        assert_eq!(state.status, TransferStatus::Failed);
        assert_eq!(state.percent_complete, 0);
        assert!(state.error_detail.unwrap().contains("timeout"));
    }

    #[test]
    fn prune_keeps_running_transfers() {
        let store = ProgressStore::new();
        let done = TransferId::new();
        let running = TransferId::new();
        store.register(done, "u", "done.zip").complete(1);
        let _w = store.register(running, "u", "running.zip");

        let kept = store.prune_finished(&[done, running, TransferId::new()]);
        assert_eq!(kept, vec![running]);
        assert!(store.try_get(done).is_none());
        assert!(store.try_get(running).is_some());
        assert!(store.is_destination_active("running.zip"));
        assert!(!store.is_destination_active("done.zip"));
    }

    #[test]
    fn writers_publish_events() {
        let (tx, mut rx) = broadcast::channel(16);
        let store = ProgressStore::with_events(tx);
        let id = TransferId::new();
        let writer = store.register(id, "u", "a.zip");
        writer.begin(Some(4));
        writer.advance(2);
        writer.complete(4);

        assert!(matches!(rx.try_recv(), Ok(TransferEvent::Progress { percent: 50, .. })));
        assert!(matches!(rx.try_recv(), Ok(TransferEvent::Completed { bytes: 4, .. })));
    }

    #[test]
    fn percent_helper_handles_edges() {
        assert_eq!(percent_of(0, 0), 0);
        assert_eq!(percent_of(5, 0), 0);
        assert_eq!(percent_of(u64::MAX, u64::MAX), 99);
        assert_eq!(percent_of(1, 3), 33);
    }
}
