//! Typed error hierarchy for remote-dl
//!
//! Validation errors (`InvalidUrl`, `UnsupportedType`) are raised before any
//! transfer exists. Network and storage errors raised while streaming are
//! recorded into the transfer's state rather than returned to the caller that
//! started it.

use crate::protocol::TransferId;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the transfer engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// The URL is not a usable absolute http(s) URL
    #[error("Invalid URL")]
    InvalidUrl { reason: String },

    /// The resource's extension is not on the allow-list
    #[error("Unsupported file type")]
    UnsupportedType { extension: String },

    /// Metadata request failed before any transfer was started
    #[error("Probe failed: {message}")]
    ProbeFailed {
        kind: NetworkErrorKind,
        message: String,
    },

    /// Network-related errors while transferring (connection, timeout, status)
    #[error("Network error ({kind}): {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },

    /// Storage/filesystem errors while writing the destination
    #[error("Storage error at {path:?}: {message}")]
    Storage {
        kind: StorageErrorKind,
        path: PathBuf,
        message: String,
    },

    /// Invalid configuration or argument
    #[error("Invalid input for '{field}': {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },

    /// Transfer not found
    #[error("Transfer not found: {0}")]
    NotFound(String),

    /// The session already has a running transfer
    #[error("A transfer is already in progress for this session: {0}")]
    TransferInProgress(TransferId),

    /// Another running transfer writes to the same destination file
    #[error("Destination is already being written by another transfer: {0}")]
    DestinationBusy(String),

    /// Engine is shutting down
    #[error("Engine is shutting down")]
    Shutdown,

    /// Internal error (bug)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Network error subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// DNS resolution failed
    DnsResolution,
    /// Connection refused
    ConnectionRefused,
    /// Connection reset
    ConnectionReset,
    /// Connect or read timeout
    Timeout,
    /// Server returned error status
    HttpStatus(u16),
    /// Too many redirects
    TooManyRedirects,
    /// Body ended before the declared length (or ran past it)
    LengthMismatch,
    /// Transfer was cancelled during shutdown
    Cancelled,
    /// Other network error
    Other,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DnsResolution => write!(f, "dns"),
            Self::ConnectionRefused => write!(f, "connection refused"),
            Self::ConnectionReset => write!(f, "connection reset"),
            Self::Timeout => write!(f, "timeout"),
            Self::HttpStatus(code) => write!(f, "http status {}", code),
            Self::TooManyRedirects => write!(f, "too many redirects"),
            Self::LengthMismatch => write!(f, "length mismatch"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Storage error subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// File/directory not found
    NotFound,
    /// Permission denied
    PermissionDenied,
    /// Path is outside the download directory
    PathTraversal,
    /// I/O error
    Io,
}

/// Stable classification used by the HTTP surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidUrl,
    UnsupportedType,
    ProbeFailed,
    TransferFailed,
    NotFound,
    TransferInProgress,
    DestinationBusy,
    InvalidInput,
    Shutdown,
    Internal,
}

impl EngineError {
    /// Classify the error for API responses
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUrl { .. } => ErrorCode::InvalidUrl,
            Self::UnsupportedType { .. } => ErrorCode::UnsupportedType,
            Self::ProbeFailed { .. } => ErrorCode::ProbeFailed,
            Self::Network { .. } | Self::Storage { .. } => ErrorCode::TransferFailed,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::TransferInProgress(_) => ErrorCode::TransferInProgress,
            Self::DestinationBusy(_) => ErrorCode::DestinationBusy,
            Self::InvalidInput { .. } => ErrorCode::InvalidInput,
            Self::Shutdown => ErrorCode::Shutdown,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Create an invalid URL error
    pub fn invalid_url(reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            reason: reason.into(),
        }
    }

    /// Create a network error
    pub fn network(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self::Network {
            kind,
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(
        kind: StorageErrorKind,
        path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        Self::Storage {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }

    /// Re-tag a transport error raised during probing
    pub fn into_probe_failure(self) -> Self {
        match self {
            Self::Network { kind, message } => Self::ProbeFailed { kind, message },
            Self::ProbeFailed { .. } => self,
            other => Self::ProbeFailed {
                kind: NetworkErrorKind::Other,
                message: other.to_string(),
            },
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        let kind = match err.kind() {
            ErrorKind::NotFound => StorageErrorKind::NotFound,
            ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
            _ => StorageErrorKind::Io,
        };
        Self::Storage {
            kind,
            path: PathBuf::new(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        let kind = classify_reqwest(&err);
        Self::network(kind, err.to_string())
    }
}

impl From<url::ParseError> for EngineError {
    fn from(err: url::ParseError) -> Self {
        Self::invalid_url(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        Self::invalid_input("config", err.to_string())
    }
}

/// Map a reqwest error onto a network error kind.
///
/// Timeouts raised by the read-timeout layer sometimes only show up in the
/// source chain as an `io::ErrorKind::TimedOut`, so the chain is walked too.
fn classify_reqwest(err: &reqwest::Error) -> NetworkErrorKind {
    if err.is_timeout() || source_chain_has_timeout(err) {
        NetworkErrorKind::Timeout
    } else if err.is_redirect() {
        NetworkErrorKind::TooManyRedirects
    } else if let Some(status) = err.status() {
        NetworkErrorKind::HttpStatus(status.as_u16())
    } else if err.is_connect() {
        let text = format!("{:?}", err).to_lowercase();
        if text.contains("dns") || text.contains("resolve") {
            NetworkErrorKind::DnsResolution
        } else {
            NetworkErrorKind::ConnectionRefused
        }
    } else if err.is_body() || err.is_decode() {
        NetworkErrorKind::ConnectionReset
    } else {
        NetworkErrorKind::Other
    }
}

fn source_chain_has_timeout(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = inner.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_match_api_contract() {
        assert_eq!(EngineError::invalid_url("nope").to_string(), "Invalid URL");
        assert_eq!(
            EngineError::UnsupportedType {
                extension: "exe".into()
            }
            .to_string(),
            "Unsupported file type"
        );
    }

    #[test]
    fn timeout_detail_is_classified() {
        let err = EngineError::network(NetworkErrorKind::Timeout, "operation timed out");
        assert!(err.to_string().contains("timeout"));
        assert_eq!(err.code(), ErrorCode::TransferFailed);
    }

    #[test]
    fn network_error_becomes_probe_failure() {
        let err = EngineError::network(NetworkErrorKind::ConnectionRefused, "refused")
            .into_probe_failure();
        assert!(matches!(
            err,
            EngineError::ProbeFailed {
                kind: NetworkErrorKind::ConnectionRefused,
                ..
            }
        ));
        assert_eq!(err.code(), ErrorCode::ProbeFailed);
    }

    #[test]
    fn io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: EngineError = io.into();
        assert!(matches!(
            err,
            EngineError::Storage {
                kind: StorageErrorKind::PermissionDenied,
                ..
            }
        ));
    }
}
