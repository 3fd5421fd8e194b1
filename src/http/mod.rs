//! HTTP Transfer Engine
//!
//! This module handles the HTTP/HTTPS side of a transfer:
//! - Resource probing (URL checks, allow-list, metadata-only request)
//! - Streaming a response body to disk in bounded chunks
//! - Progress reporting through a [`ProgressWriter`]
//! - Redirect following and connect/read timeouts via the shared client

pub mod connection;
pub mod probe;

pub use connection::{ConnectionPool, TransferGuard};
pub use probe::{
    extension_of, fetch_metadata, filename_from_url, parse_absolute_url, validate_resource,
    RemoteMetadata, ValidatedResource,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, NetworkErrorKind, Result, StorageErrorKind};
use crate::progress::ProgressWriter;
use crate::protocol::ResourceDescriptor;

use futures::StreamExt;
use reqwest::Response;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

/// HTTP Downloader
pub struct HttpDownloader {
    pool: Arc<ConnectionPool>,
    config: HttpDownloaderConfig,
}

/// Per-downloader settings derived from [`EngineConfig`]
#[derive(Debug, Clone)]
pub struct HttpDownloaderConfig {
    pub allowed_extensions: Vec<String>,
    pub dir_mode: u32,
    pub file_mode: u32,
}

impl HttpDownloader {
    /// Create a new HTTP downloader
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let pool = ConnectionPool::new(&config.http, &config.user_agent)?;

        Ok(Self {
            pool: Arc::new(pool),
            config: HttpDownloaderConfig {
                allowed_extensions: config.allowed_extensions.clone(),
                dir_mode: config.dir_mode,
                file_mode: config.file_mode,
            },
        })
    }

    /// Shared connection pool and counters
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Validate a URL against syntax and the extension allow-list
    pub fn validate(&self, url: &str) -> Result<ValidatedResource> {
        validate_resource(url, &self.config.allowed_extensions)
    }

    /// Validate a URL and resolve its declared size without downloading it
    pub async fn probe(&self, url: &str) -> Result<ResourceDescriptor> {
        let resource = self.validate(url)?;
        let metadata = fetch_metadata(self.pool.client(), &resource.url).await?;

        tracing::debug!(
            "Probed {}: size={:?} type={:?}",
            resource.url,
            metadata.content_length,
            metadata.content_type
        );

        Ok(ResourceDescriptor {
            filename: resource.filename,
            extension: resource.extension,
            size_bytes: metadata.content_length,
            source_url: url.trim().to_string(),
            content_type: metadata.content_type,
        })
    }

    /// Stream `url` into `save_dir/filename`.
    ///
    /// Progress goes to `progress`; the caller records the terminal state.
    /// Returns the number of bytes written. On failure, whatever was already
    /// written stays on disk.
    pub async fn download(
        &self,
        url: &Url,
        save_dir: &Path,
        filename: &str,
        cancel_token: CancellationToken,
        progress: &ProgressWriter,
    ) -> Result<u64> {
        let save_path = destination_path(save_dir, filename)?;
        ensure_dir(save_dir, self.config.dir_mode).await?;

        let _guard = self.pool.transfer_guard();

        let response = tokio::select! {
            response = self.pool.client().get(url.clone()).send() => response?,
            _ = cancel_token.cancelled() => return Err(cancelled()),
        };

        // Check response status
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::network(
                NetworkErrorKind::HttpStatus(status.as_u16()),
                format!("HTTP error: {}", status),
            ));
        }

        if response.url() != url {
            tracing::debug!("{} redirected to {}", url, response.url());
        }

        let total_size = response.content_length();
        progress.begin(total_size);

        let file = create_file(&save_path, self.config.file_mode).await?;

        tracing::info!(
            "Transfer {} streaming {} -> {:?} ({} bytes declared)",
            progress.id(),
            url,
            save_path,
            total_size.map_or_else(|| "unknown".to_string(), |n| n.to_string())
        );

        self.stream_to_file(response, file, &save_path, total_size, cancel_token, progress)
            .await
    }

    /// Stream response body to file with progress tracking
    async fn stream_to_file(
        &self,
        response: Response,
        mut file: File,
        path: &Path,
        total_size: Option<u64>,
        cancel_token: CancellationToken,
        progress: &ProgressWriter,
    ) -> Result<u64> {
        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;

        while let Some(chunk_result) = tokio::select! {
            chunk = stream.next() => chunk,
            _ = cancel_token.cancelled() => {
                file.flush().await.ok();
                return Err(cancelled());
            }
        } {
            let chunk: bytes::Bytes = chunk_result?;
            let chunk_len = chunk.len() as u64;

            file.write_all(&chunk).await.map_err(|e| {
                EngineError::storage(
                    StorageErrorKind::Io,
                    path,
                    format!("Failed to write: {}", e),
                )
            })?;

            self.pool.record_download(chunk_len);
            received += chunk_len;
            progress.advance(received);
        }

        file.flush().await.map_err(|e| {
            EngineError::storage(StorageErrorKind::Io, path, format!("Failed to flush: {}", e))
        })?;

        file.sync_all().await.map_err(|e| {
            EngineError::storage(StorageErrorKind::Io, path, format!("Failed to sync: {}", e))
        })?;

        // Validate received size matches expected (if known)
        if let Some(expected) = total_size {
            if received != expected {
                return Err(EngineError::network(
                    NetworkErrorKind::LengthMismatch,
                    format!(
                        "Incomplete download: received {} bytes, expected {} bytes",
                        received, expected
                    ),
                ));
            }
        }

        Ok(received)
    }
}

fn cancelled() -> EngineError {
    EngineError::network(NetworkErrorKind::Cancelled, "Transfer cancelled by shutdown")
}

/// Join `filename` onto `save_dir`, refusing anything but a plain file name
pub fn destination_path(save_dir: &Path, filename: &str) -> Result<PathBuf> {
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(save_dir.join(filename)),
        _ => Err(EngineError::storage(
            StorageErrorKind::PathTraversal,
            Path::new(filename),
            "Invalid filename: must be a single path component",
        )),
    }
}

/// Create the download directory if needed (idempotent)
async fn ensure_dir(dir: &Path, mode: u32) -> Result<()> {
    if let Ok(meta) = tokio::fs::metadata(dir).await {
        if meta.is_dir() {
            return Ok(());
        }
    }

    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;

    builder.create(dir).await.map_err(|e| {
        EngineError::storage(
            StorageErrorKind::Io,
            dir,
            format!("Failed to create directory: {}", e),
        )
    })?;

    tracing::info!("Created download directory {:?}", dir);
    Ok(())
}

/// Create (or truncate) the destination file
async fn create_file(path: &Path, mode: u32) -> Result<File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;

    options.open(path).await.map_err(|e| {
        EngineError::storage(
            StorageErrorKind::Io,
            path,
            format!("Failed to create file: {}", e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_accepts_plain_names() {
        let dir = Path::new("/srv/downloads");
        assert_eq!(
            destination_path(dir, "data.json").unwrap(),
            PathBuf::from("/srv/downloads/data.json")
        );
    }

    #[test]
    fn destination_rejects_traversal() {
        let dir = Path::new("/srv/downloads");
        for name in ["../x.zip", "/etc/x.zip", "a/b.zip", "..", "", "."] {
            assert!(
                destination_path(dir, name).is_err(),
                "{:?} should be rejected",
                name
            );
        }
    }

    #[tokio::test]
    async fn ensure_dir_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("downloads");
        ensure_dir(&dir, 0o750).await.unwrap();
        ensure_dir(&dir, 0o750).await.unwrap();
        assert!(dir.is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dir).unwrap().permissions().mode();
            assert_eq!(mode & 0o002, 0, "directory must not be world-writable");
        }
    }
}
