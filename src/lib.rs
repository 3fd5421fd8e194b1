//! # remote-dl
//!
//! Fetch a remote file onto the server's disk and watch it arrive.
//!
//! ## Features
//!
//! - **Probe**: validate a URL against an extension allow-list and read its
//!   declared size without downloading the body
//! - **Background transfers**: bodies are streamed to disk in chunks while the
//!   caller's request returns immediately
//! - **Progress polling**: whole-percent progress that never goes backwards
//!   and reaches 100 only on completion
//! - **Sessions**: callers poll "their" transfer through a cookie token
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use remote_dl::{EngineConfig, TransferCoordinator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = TransferCoordinator::new(EngineConfig::default()).await?;
//!     let (session, _) = engine.resolve_session(None);
//!
//!     let descriptor = engine.probe(session, "https://example.com/data.json").await?;
//!     println!("{} is {:?} bytes", descriptor.filename, descriptor.size_bytes);
//!
//!     engine.start(session, "https://example.com/data.json").await?;
//!     let mut events = engine.subscribe();
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//!
//!     Ok(())
//! }
//! ```

// Modules
pub mod config;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod progress;
pub mod protocol;
#[cfg(feature = "server")]
pub mod server;
pub mod session;

// Re-exports for convenience
pub use config::{EngineConfig, HttpConfig, ServerConfig, DEFAULT_ALLOWED_EXTENSIONS};
pub use coordinator::{LifecyclePhase, StartedTransfer, TransferCoordinator};
pub use error::{EngineError, ErrorCode, NetworkErrorKind, Result, StorageErrorKind};
pub use progress::{ProgressStore, ProgressWriter};
pub use protocol::{
    EngineStats, ProgressReport, ResourceDescriptor, TransferEvent, TransferId,
    TransferRequest, TransferState, TransferStatus,
};
pub use session::{SessionId, SessionPhase, SessionRegistry};

// HTTP module exports
pub use http::{ConnectionPool, HttpDownloader, ValidatedResource};
