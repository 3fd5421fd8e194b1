//! Caller sessions
//!
//! Polling requests do not name a transfer; they resolve it through the
//! caller's session. The registry maps a session token to the phase the
//! caller reached and the transfer it started.

use crate::protocol::{TransferId, TransferRequest};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Opaque session token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Where a session is in the probe/start lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Nothing accepted yet, or the last probe failed
    Requested,
    /// A resource passed probing and awaits confirmation
    Probed(TransferRequest),
    /// A transfer was started
    Started(TransferId),
}

#[derive(Debug)]
struct SessionEntry {
    phase: SessionPhase,
    transfers: Vec<TransferId>,
    last_seen: Instant,
}

impl SessionEntry {
    fn new(now: Instant) -> Self {
        Self {
            phase: SessionPhase::Requested,
            transfers: Vec::new(),
            last_seen: now,
        }
    }
}

/// Map from session token to that caller's lifecycle state
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Resolve a presented token, creating a fresh session when it is missing
    /// or unknown. Returns the session and whether it was newly created.
    pub fn resolve(&self, presented: Option<SessionId>) -> (SessionId, bool) {
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        if let Some(id) = presented {
            if let Some(entry) = sessions.get_mut(&id) {
                entry.last_seen = now;
                return (id, false);
            }
        }
        let id = SessionId::new();
        sessions.insert(id, SessionEntry::new(now));
        (id, true)
    }

    /// Refresh a presented token without creating anything.
    ///
    /// Returns the session if it is known.
    pub fn touch(&self, presented: Option<SessionId>) -> Option<SessionId> {
        let id = presented?;
        let mut sessions = self.sessions.write();
        let entry = sessions.get_mut(&id)?;
        entry.last_seen = Instant::now();
        Some(id)
    }

    /// Current phase; unknown sessions are in `Requested`
    pub fn phase(&self, session: SessionId) -> SessionPhase {
        self.sessions
            .read()
            .get(&session)
            .map(|e| e.phase.clone())
            .unwrap_or(SessionPhase::Requested)
    }

    /// Transfer most recently started by this session
    pub fn current_transfer(&self, session: SessionId) -> Option<TransferId> {
        match self.phase(session) {
            SessionPhase::Started(id) => Some(id),
            _ => self
                .sessions
                .read()
                .get(&session)
                .and_then(|e| e.transfers.last().copied()),
        }
    }

    /// Record a successful probe
    pub fn mark_probed(&self, session: SessionId, request: TransferRequest) {
        self.with_entry(session, |e| e.phase = SessionPhase::Probed(request));
    }

    /// Bind a started transfer to the session
    pub fn bind_transfer(&self, session: SessionId, id: TransferId) {
        self.with_entry(session, |e| {
            e.phase = SessionPhase::Started(id);
            e.transfers.push(id);
        });
    }

    /// Every transfer this session started
    pub fn transfers(&self, session: SessionId) -> Vec<TransferId> {
        self.sessions
            .read()
            .get(&session)
            .map(|e| e.transfers.clone())
            .unwrap_or_default()
    }

    /// Drop sessions idle for longer than the TTL.
    ///
    /// Returns the transfers those sessions owned.
    pub fn expire(&self, now: Instant) -> Vec<TransferId> {
        let mut sessions = self.sessions.write();
        let mut orphaned = Vec::new();
        sessions.retain(|_, entry| {
            let alive = now.saturating_duration_since(entry.last_seen) < self.ttl;
            if !alive {
                orphaned.append(&mut entry.transfers);
            }
            alive
        });
        orphaned
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    fn with_entry<F>(&self, session: SessionId, f: F)
    where
        F: FnOnce(&mut SessionEntry),
    {
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let entry = sessions
            .entry(session)
            .or_insert_with(|| SessionEntry::new(now));
        entry.last_seen = now;
        f(entry);
    }
}
