//! Status reports
//!
//! What pollers and operators see.

use super::types::{TransferId, TransferState, TransferStatus};
use serde::{Deserialize, Serialize};

/// Answer to a progress poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    /// Whole percent, 0..=100
    #[serde(rename = "progress")]
    pub percent: u8,
    pub status: TransferStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<TransferId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl ProgressReport {
    /// Report for a caller that has not started a transfer
    pub fn idle() -> Self {
        Self {
            percent: 0,
            status: TransferStatus::Pending,
            error: None,
            transfer_id: None,
            file: None,
        }
    }

    /// Whether pollers can stop asking
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl From<TransferState> for ProgressReport {
    fn from(state: TransferState) -> Self {
        Self {
            percent: state.percent_complete,
            status: state.status,
            error: state.error_detail,
            transfer_id: Some(state.id),
            file: state.filename,
        }
    }
}

/// Process-wide counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Transfers currently streaming a body
    pub streaming: u64,
    /// Transfer states held in the progress store
    pub tracked_transfers: usize,
    /// Known caller sessions
    pub sessions: usize,
    /// Bytes written by all transfers since start
    pub total_downloaded: u64,
}
