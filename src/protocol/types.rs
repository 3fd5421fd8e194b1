//! Core protocol types
//!
//! Fundamental types used throughout the protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(Uuid);

impl TransferId {
    /// Create a new random transfer ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for TransferId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle status of a transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferStatus {
    /// Registered (or unknown) but no bytes requested yet
    #[default]
    Pending,
    /// Body is streaming to disk
    InProgress,
    /// All bytes written and synced
    Complete,
    /// Transport or write failure; see `error_detail`
    Failed,
}

impl TransferStatus {
    /// Check if the transfer reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress and outcome of a single transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferState {
    /// Transfer this state belongs to
    pub id: TransferId,
    /// Whole percent, 0..=100. Only reaches 100 once `status` is `Complete`
    pub percent_complete: u8,
    /// Current status
    pub status: TransferStatus,
    /// Failure description (set only when `status` is `Failed`)
    pub error_detail: Option<String>,
    /// Destination file name
    pub filename: Option<String>,
    /// URL the transfer was started from
    pub source_url: Option<String>,
    /// Bytes written so far
    pub bytes_received: u64,
    /// Declared body length, if the server reported one
    pub total_bytes: Option<u64>,
    /// When the transfer was registered
    pub created_at: Option<DateTime<Utc>>,
    /// When the transfer reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
}

impl TransferState {
    /// Default state reported for a transfer nobody has started (yet)
    pub fn pending(id: TransferId) -> Self {
        Self {
            id,
            percent_complete: 0,
            status: TransferStatus::Pending,
            error_detail: None,
            filename: None,
            source_url: None,
            bytes_received: 0,
            total_bytes: None,
            created_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_id_round_trips_through_display() {
        let id = TransferId::new();
        let parsed: TransferId = id.to_string().parse().expect("valid id");
        assert_eq!(id, parsed);
    }

    #[test]
    fn transfer_id_rejects_garbage() {
        assert!("not-a-transfer".parse::<TransferId>().is_err());
        assert!("".parse::<TransferId>().is_err());
    }

    #[test]
    fn status_serializes_kebab_case() {
        let json = serde_json::to_string(&TransferStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
        assert_eq!(TransferStatus::InProgress.to_string(), "in-progress");
    }

    #[test]
    fn pending_state_is_not_terminal() {
        let state = TransferState::pending(TransferId::new());
        assert_eq!(state.percent_complete, 0);
        assert_eq!(state.status, TransferStatus::Pending);
        assert!(!state.is_terminal());
    }
}
