//! Probe results
//!
//! Types describing a remote resource before it is transferred.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// What the prober learned about a remote resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Final path segment of the URL, percent-decoded
    pub filename: String,
    /// Lowercased allow-listed extension (`tar.gz` kept as one suffix)
    pub extension: String,
    /// Declared size; `None` when the server did not report one
    #[serde(with = "size_repr")]
    pub size_bytes: Option<u64>,
    /// URL as submitted by the caller
    pub source_url: String,
    /// Declared `Content-Type`, if any
    pub content_type: Option<String>,
}

/// Request accepted from a client before it is probed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub source_url: String,
    pub declared_extension: String,
}

/// Sizes are rendered as a number, or as `"Unknown"` when the server did not
/// report one.
pub mod size_repr {
    use super::*;

    pub const UNKNOWN: &str = "Unknown";

    pub fn serialize<S: Serializer>(size: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match size {
            Some(n) => serializer.serialize_u64(*n),
            None => serializer.serialize_str(UNKNOWN),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Known(u64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Known(n) => Ok(Some(n)),
            Repr::Text(s) => Ok(s.parse().ok()),
        }
    }
}
