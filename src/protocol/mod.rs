//! Protocol types for remote-dl
//!
//! This module contains all types that cross the engine boundary:
//! - Probe results
//! - Transfer identifiers and state
//! - Events emitted by the coordinator
//! - Progress reports and engine counters
//!
//! These types are designed for serialization and are what the HTTP surface
//! renders as JSON.

mod descriptor;
mod events;
mod status;
mod types;

pub use descriptor::{size_repr, ResourceDescriptor, TransferRequest};
pub use events::TransferEvent;
pub use status::{EngineStats, ProgressReport};
pub use types::{TransferId, TransferState, TransferStatus};
