//! Transfer events
//!
//! Events emitted by the coordinator.

use super::types::{TransferId, TransferState};
use serde::{Deserialize, Serialize};

/// Events emitted by the transfer coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransferEvent {
    /// A resource passed probing
    Probed { url: String, size: Option<u64> },
    /// Transfer task was spawned
    Started { id: TransferId, filename: String },
    /// Whole-percent progress changed
    Progress { id: TransferId, percent: u8 },
    /// Transfer completed successfully
    Completed { id: TransferId, bytes: u64 },
    /// Transfer failed
    Failed { id: TransferId, error: String },
}

impl TransferEvent {
    /// Transfer this event refers to, if any
    pub fn transfer_id(&self) -> Option<TransferId> {
        match self {
            Self::Probed { .. } => None,
            Self::Started { id, .. }
            | Self::Progress { id, .. }
            | Self::Completed { id, .. }
            | Self::Failed { id, .. } => Some(*id),
        }
    }

    /// Build the terminal event matching a finished state
    pub(crate) fn terminal(state: &TransferState) -> Option<Self> {
        match state.status {
            super::TransferStatus::Complete => Some(Self::Completed {
                id: state.id,
                bytes: state.bytes_received,
            }),
            super::TransferStatus::Failed => Some(Self::Failed {
                id: state.id,
                error: state.error_detail.clone().unwrap_or_default(),
            }),
            _ => None,
        }
    }
}
