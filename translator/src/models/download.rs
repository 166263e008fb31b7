//! Resumable HTTP download of a single artifact.
//!
//! Bytes are streamed into `<destination>.part`. A later call with
//! `allow_resume` continues from the partial file's length with a
//! `Range: bytes=N-` request. The partial file is only renamed onto the
//! destination once the body has been fully written, so readers of the
//! destination never observe a half-written file.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use log::{debug, info, warn};
use reqwest::header::RANGE;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::error::ModelError;

/// Extension appended to the destination while a download is in flight.
pub const PARTIAL_EXTENSION: &str = "part";

const WRITE_BUFFER_BYTES: usize = 64 * 1024;
const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Path of the in-progress file for `destination`.
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_EXTENSION);
    destination.with_file_name(name)
}

/// Snapshot of a running download.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    /// Bytes in the partial file, including any resumed prefix.
    pub downloaded_bytes: u64,
    /// Full artifact size, if the server sent `Content-Length`.
    pub total_bytes: Option<u64>,
}

impl DownloadProgress {
    /// Completed fraction in `[0, 1]`, or `None` when the size is unknown.
    pub fn fraction(&self) -> Option<f64> {
        match self.total_bytes {
            Some(total) if total > 0 => {
                Some((self.downloaded_bytes as f64 / total as f64).clamp(0.0, 1.0))
            }
            _ => None,
        }
    }
}

/// Streams remote artifacts to disk.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
    progress_interval: Duration,
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Minimum time between two progress callbacks (the final one is always sent).
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Download `url` to `destination`.
    ///
    /// On failure the partial file is kept so a later call with
    /// `allow_resume` can continue. Returns the final size in bytes.
    pub async fn download<F>(
        &self,
        url: &str,
        destination: &Path,
        allow_resume: bool,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<u64, ModelError>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let partial = partial_path(destination);
        if let Some(parent) = partial.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut resume_from = if allow_resume {
            match tokio::fs::metadata(&partial).await {
                Ok(meta) => meta.len(),
                Err(_) => 0,
            }
        } else {
            0
        };

        let mut request = self.client.get(url);
        if resume_from > 0 {
            info!("Resuming {:?} from {} bytes", partial, resume_from);
            request = request.header(RANGE, format!("bytes={}-", resume_from));
        } else {
            info!("Downloading {} to {:?}", url, destination);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!("HTTP status {} for {}", status, url);

        if status == StatusCode::RANGE_NOT_SATISFIABLE && resume_from > 0 {
            warn!(
                "Server rejected resume offset {} for {:?}; discarding partial file",
                resume_from, partial
            );
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(ModelError::NetworkFailure(format!(
                "Download failed with status: {}",
                status
            )));
        }

        if !(200..=206).contains(&status.as_u16()) {
            return Err(ModelError::NetworkFailure(format!(
                "Download failed with status: {}",
                status
            )));
        }

        if resume_from > 0 && status != StatusCode::PARTIAL_CONTENT {
            warn!(
                "Server ignored range request for {}; restarting from zero",
                url
            );
            resume_from = 0;
        }

        let total_bytes = response.content_length().map(|len| resume_from + len);

        // Open file for appending (if resuming) or create new
        let file = if resume_from > 0 {
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(&partial)
                .await?
        } else {
            tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&partial)
                .await?
        };

        let mut writer = tokio::io::BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);
        let mut stream = response.bytes_stream();
        let mut written = resume_from;
        let mut last_emit: Option<Instant> = None;

        let streamed: Result<(), ModelError> = async {
            loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => return Err(ModelError::Cancelled),
                    next = stream.next() => match next {
                        Some(chunk) => chunk?,
                        None => return Ok(()),
                    },
                };

                writer.write_all(&chunk).await?;
                written += chunk.len() as u64;

                let due = last_emit
                    .map(|at| at.elapsed() >= self.progress_interval)
                    .unwrap_or(true);
                if due {
                    on_progress(DownloadProgress {
                        downloaded_bytes: written,
                        total_bytes,
                    });
                    last_emit = Some(Instant::now());
                }
            }
        }
        .await;

        // Keep every byte received so far, even on failure, so resume is exact.
        writer.flush().await?;
        let file = writer.into_inner();
        file.sync_all().await?;
        drop(file);

        if let Err(err) = streamed {
            warn!(
                "Download of {} interrupted at {} bytes: {}",
                url, written, err
            );
            return Err(err);
        }

        if let Some(total) = total_bytes {
            if written != total {
                return Err(ModelError::NetworkFailure(format!(
                    "Connection closed after {} of {} bytes",
                    written, total
                )));
            }
        }

        on_progress(DownloadProgress {
            downloaded_bytes: written,
            total_bytes,
        });

        if tokio::fs::try_exists(destination).await? {
            tokio::fs::remove_file(destination).await?;
        }
        tokio::fs::rename(&partial, destination).await?;

        info!("Download complete: {:?} ({} bytes)", destination, written);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_path_appends_extension() {
        let path = partial_path(Path::new("/data/models/Qwen3-8B-Q4_K_M.gguf"));
        assert_eq!(
            path,
            PathBuf::from("/data/models/Qwen3-8B-Q4_K_M.gguf.part")
        );
    }

    #[test]
    fn fraction_requires_known_total() {
        let unknown = DownloadProgress {
            downloaded_bytes: 10,
            total_bytes: None,
        };
        assert_eq!(unknown.fraction(), None);

        let empty = DownloadProgress {
            downloaded_bytes: 0,
            total_bytes: Some(0),
        };
        assert_eq!(empty.fraction(), None);

        let half = DownloadProgress {
            downloaded_bytes: 50,
            total_bytes: Some(100),
        };
        assert_eq!(half.fraction(), Some(0.5));
    }

    #[tokio::test]
    async fn unreachable_host_keeps_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("model.gguf");
        std::fs::write(partial_path(&destination), b"prefix").unwrap();

        // Port 9 (discard) on localhost is closed in test environments.
        let result = Downloader::new()
            .download(
                "http://127.0.0.1:9/model.gguf",
                &destination,
                true,
                &CancellationToken::new(),
                |_| {},
            )
            .await;

        assert!(matches!(result, Err(ModelError::NetworkFailure(_))));
        assert_eq!(std::fs::read(partial_path(&destination)).unwrap(), b"prefix");
        assert!(!destination.exists());
    }
}
