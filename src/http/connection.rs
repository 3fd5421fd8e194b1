//! Connection Pool Management
//!
//! Builds the shared reqwest client (timeouts, redirects, proxy) and keeps
//! process-wide transfer counters.

use crate::config::HttpConfig;
use crate::error::{EngineError, Result};
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// HTTP client plus traffic counters
pub struct ConnectionPool {
    /// HTTP client (reqwest handles its own connection pool)
    client: Client,
    /// Total bytes written by all transfers
    total_downloaded: AtomicU64,
    /// Transfers currently streaming
    active_transfers: AtomicU64,
}

impl ConnectionPool {
    /// Create a new connection pool
    pub fn new(config: &HttpConfig, user_agent: &str) -> Result<Self> {
        // No gzip/brotli: bytes are stored exactly as served so lengths match
        // the declared Content-Length.
        let mut builder = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .read_timeout(Duration::from_secs(config.read_timeout))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(90));

        if let Some(ref proxy_url) = config.proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| EngineError::invalid_input("http.proxy_url", e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| EngineError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            total_downloaded: AtomicU64::new(0),
            active_transfers: AtomicU64::new(0),
        })
    }

    /// Get the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Record downloaded bytes
    pub fn record_download(&self, bytes: u64) {
        self.total_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Get total downloaded bytes
    pub fn total_downloaded(&self) -> u64 {
        self.total_downloaded.load(Ordering::Relaxed)
    }

    /// Mark a transfer as streaming until the guard is dropped
    pub fn transfer_guard(&self) -> TransferGuard<'_> {
        self.active_transfers.fetch_add(1, Ordering::Relaxed);
        TransferGuard { pool: self }
    }

    /// Get the number of transfers currently streaming
    pub fn active_transfers(&self) -> u64 {
        self.active_transfers.load(Ordering::Relaxed)
    }
}

/// Decrements the active transfer count on drop
pub struct TransferGuard<'a> {
    pool: &'a ConnectionPool,
}

impl Drop for TransferGuard<'_> {
    fn drop(&mut self) {
        self.pool.active_transfers.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_tracks_active_transfers() {
        let pool = ConnectionPool::new(&HttpConfig::default(), "test").unwrap();
        assert_eq!(pool.active_transfers(), 0);
        {
            let _a = pool.transfer_guard();
            let _b = pool.transfer_guard();
            assert_eq!(pool.active_transfers(), 2);
        }
        assert_eq!(pool.active_transfers(), 0);
    }

    #[test]
    fn counts_downloaded_bytes() {
        let pool = ConnectionPool::new(&HttpConfig::default(), "test").unwrap();
        pool.record_download(10);
        pool.record_download(5);
        assert_eq!(pool.total_downloaded(), 15);
    }

    #[test]
    fn rejects_bad_proxy() {
        let config = HttpConfig {
            proxy_url: Some("http://[::1".into()),
            ..Default::default()
        };
        assert!(ConnectionPool::new(&config, "test").is_err());
    }
}
