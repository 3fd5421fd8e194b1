//! Engine configuration
//!
//! This module contains all configuration options for the transfer engine
//! and the HTTP surface. Configuration can be built in code or loaded from
//! a TOML file; every field has a default.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Extensions accepted by default. `tar.gz` is matched as a compound suffix.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["zip", "xml", "json", "jsonl", "tar.gz"];

/// Main configuration for the transfer engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory to save transfers into (created on first use)
    pub download_dir: PathBuf,

    /// Permission bits for a created download directory (Unix only)
    pub dir_mode: u32,

    /// Permission bits for created destination files (Unix only)
    pub file_mode: u32,

    /// Extensions accepted by the prober, compared case-insensitively
    pub allowed_extensions: Vec<String>,

    /// User agent sent with probe and transfer requests
    pub user_agent: String,

    /// Idle time after which a caller session is forgotten
    pub session_ttl_secs: u64,

    /// How often expired sessions and finished transfers are swept
    pub sweep_interval_secs: u64,

    /// HTTP client configuration
    pub http: HttpConfig,

    /// HTTP surface configuration
    pub server: ServerConfig,
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Connection timeout in seconds
    pub connect_timeout: u64,

    /// Read timeout in seconds (applies to each read, not the whole body)
    pub read_timeout: u64,

    /// Maximum redirects to follow
    pub max_redirects: usize,

    /// Whether to accept invalid TLS certificates (dangerous!)
    pub accept_invalid_certs: bool,

    /// Proxy URL (e.g., "http://proxy:8080" or "socks5://proxy:1080")
    pub proxy_url: Option<String>,
}

/// HTTP surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the server listens on
    pub bind_addr: SocketAddr,

    /// Name of the cookie carrying the caller's session token
    pub session_cookie: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            dir_mode: 0o750,
            file_mode: 0o640,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            user_agent: format!("remote-dl/{}", env!("CARGO_PKG_VERSION")),
            session_ttl_secs: 3600,
            sweep_interval_secs: 60,
            http: HttpConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: 30,
            read_timeout: 60,
            max_redirects: 10,
            accept_invalid_certs: false,
            proxy_url: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            session_cookie: "remote_dl_session".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::invalid_input("config", format!("Cannot read {:?}: {}", path, e))
        })?;
        Self::from_toml(&text)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the download directory
    pub fn download_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.download_dir = path.into();
        self
    }

    /// Replace the extension allow-list
    pub fn allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }

    /// Set connect and read timeouts (seconds)
    pub fn timeouts(mut self, connect: u64, read: u64) -> Self {
        self.http.connect_timeout = connect;
        self.http.read_timeout = read;
        self
    }

    /// Set the session idle TTL (seconds)
    pub fn session_ttl(mut self, secs: u64) -> Self {
        self.session_ttl_secs = secs;
        self
    }

    /// Set the listen address
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.server.bind_addr = addr;
        self
    }

    pub fn session_ttl_duration(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // A missing directory is fine: it is created on first use
        if self.download_dir.exists() && !self.download_dir.is_dir() {
            return Err(EngineError::invalid_input(
                "download_dir",
                format!("Path is not a directory: {:?}", self.download_dir),
            ));
        }

        if self.allowed_extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(EngineError::invalid_input(
                "allowed_extensions",
                "At least one extension is required",
            ));
        }

        if self.dir_mode & 0o002 != 0 {
            return Err(EngineError::invalid_input(
                "dir_mode",
                "Download directory must not be world-writable",
            ));
        }

        if self.http.connect_timeout == 0 || self.http.read_timeout == 0 {
            return Err(EngineError::invalid_input(
                "http.timeouts",
                "Must be at least 1 second",
            ));
        }

        if self.session_ttl_secs == 0 {
            return Err(EngineError::invalid_input(
                "session_ttl_secs",
                "Must be at least 1",
            ));
        }

        if self.sweep_interval_secs == 0 {
            return Err(EngineError::invalid_input(
                "sweep_interval_secs",
                "Must be at least 1",
            ));
        }

        if self.server.session_cookie.is_empty()
            || !self
                .server
                .session_cookie
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(EngineError::invalid_input(
                "server.session_cookie",
                "Cookie name must be non-empty and use [A-Za-z0-9_-]",
            ));
        }

        Ok(())
    }
}
