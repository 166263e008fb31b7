use std::path::{Path, PathBuf};

use log::{info, warn};
use tokio_util::sync::CancellationToken;

use super::checksum;
use super::download::{partial_path, DownloadProgress, Downloader};
use super::error::ModelError;

/// Maps model filenames to files in the models directory and makes sure
/// they are present and valid before anyone loads them.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    models_dir: PathBuf,
    downloader: Downloader,
}

impl ArtifactStore {
    pub fn new(models_dir: PathBuf) -> Self {
        Self::with_downloader(models_dir, Downloader::new())
    }

    pub fn with_downloader(models_dir: PathBuf, downloader: Downloader) -> Self {
        Self {
            models_dir,
            downloader,
        }
    }

    /// Get the models directory path
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Final on-disk location for `filename`.
    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.models_dir.join(filename)
    }

    pub fn partial_path_for(&self, filename: &str) -> PathBuf {
        partial_path(&self.path_for(filename))
    }

    /// Size of a partial download left behind for resume, 0 if none.
    pub fn partial_bytes(&self, filename: &str) -> u64 {
        std::fs::metadata(self.partial_path_for(filename))
            .map(|m| m.len())
            .unwrap_or(0)
    }

    pub fn is_downloaded(&self, filename: &str) -> bool {
        self.path_for(filename).is_file()
    }

    /// Remove the artifact and any partial download.
    pub async fn delete(&self, filename: &str) -> Result<(), ModelError> {
        let mut deleted_something = false;
        for path in [self.path_for(filename), self.partial_path_for(filename)] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    info!("Deleted {:?}", path);
                    deleted_something = true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if !deleted_something {
            warn!("Model file '{}' was not found", filename);
        }
        Ok(())
    }

    /// Make sure `filename` exists locally and matches `expected_sha256`.
    ///
    /// A valid existing file is returned without touching the network. A file
    /// that fails verification is deleted and downloaded again. A freshly
    /// downloaded file that fails verification is deleted before the error is
    /// returned, so the returned path is always verified (or verification is
    /// switched off by configuration).
    pub async fn ensure_file<F>(
        &self,
        remote_url: &str,
        filename: &str,
        expected_sha256: &str,
        allow_resume: bool,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<PathBuf, ModelError>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        self.ensure_file_observed(
            remote_url,
            filename,
            expected_sha256,
            allow_resume,
            cancel,
            |event| {
                if let StoreEvent::Progress(progress) = event {
                    on_progress(progress);
                }
            },
        )
        .await
    }

    /// Same as [`ensure_file`](Self::ensure_file), reporting every step.
    pub async fn ensure_file_observed<F>(
        &self,
        remote_url: &str,
        filename: &str,
        expected_sha256: &str,
        allow_resume: bool,
        cancel: &CancellationToken,
        mut on_event: F,
    ) -> Result<PathBuf, ModelError>
    where
        F: FnMut(StoreEvent) + Send,
    {
        let destination = self.path_for(filename);
        let skip_checksum = checksum::should_skip(expected_sha256);

        if tokio::fs::try_exists(&destination).await? {
            if skip_checksum {
                warn_checksum_skipped(filename);
                on_event(StoreEvent::ChecksumSkipped);
                return Ok(destination);
            }
            match checksum::verify_file(&destination, expected_sha256).await {
                Ok(()) => {
                    info!("Model '{}' already downloaded and verified", filename);
                    return Ok(destination);
                }
                Err(ModelError::InvalidChecksum { actual, .. }) => {
                    warn!(
                        "Checksum mismatch for existing '{}' (got {}). Redownloading.",
                        filename, actual
                    );
                    tokio::fs::remove_file(&destination).await?;
                }
                Err(e) => return Err(e),
            }
        }

        let resume_from = if allow_resume {
            self.partial_bytes(filename)
        } else {
            0
        };
        on_event(StoreEvent::Started { resume_from });

        self.downloader
            .download(remote_url, &destination, allow_resume, cancel, |progress| {
                on_event(StoreEvent::Progress(progress))
            })
            .await?;

        if skip_checksum {
            warn_checksum_skipped(filename);
            on_event(StoreEvent::ChecksumSkipped);
        } else {
            info!("Verifying checksum of '{}'", filename);
            on_event(StoreEvent::Verifying);
            if let Err(e) = checksum::verify_file(&destination, expected_sha256).await {
                discard_unverified(&destination).await;
                return Err(e);
            }
        }

        on_event(StoreEvent::Complete);
        Ok(destination)
    }
}

/// Steps of a download reported by [`ArtifactStore::ensure_file_observed`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoreEvent {
    /// A request is about to be sent, continuing after `resume_from` bytes
    Started { resume_from: u64 },
    Progress(DownloadProgress),
    /// No digest configured; the file is used unverified
    ChecksumSkipped,
    /// Download finished, checking the digest
    Verifying,
    /// The downloaded file is in place
    Complete,
}

/// Remove a file that failed verification. Returns whether it is gone.
async fn discard_unverified(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(
                "Could not remove unverified file {:?}: {}. It will be checked again before use.",
                path, e
            );
            false
        }
    }
}

fn warn_checksum_skipped(filename: &str) {
    warn!(
        "Checksum skipped for '{}'. Set sha256 in the model config for production.",
        filename
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn existing_file_without_digest_is_returned_offline() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        std::fs::write(store.path_for("model.gguf"), b"weights").unwrap();

        // An unroutable URL proves no request is made.
        let path = store
            .ensure_file(
                "http://127.0.0.1:9/never",
                "model.gguf",
                "",
                true,
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap();

        assert_eq!(path, store.path_for("model.gguf"));
    }

    #[tokio::test]
    async fn skipped_verification_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        std::fs::write(store.path_for("model.gguf"), b"weights").unwrap();

        for placeholder in ["", "   ", "PUT_THE_EXACT_SHA256_HERE"] {
            let mut events = Vec::new();
            store
                .ensure_file_observed(
                    "http://127.0.0.1:9/never",
                    "model.gguf",
                    placeholder,
                    true,
                    &CancellationToken::new(),
                    |event| events.push(event),
                )
                .await
                .unwrap();
            assert_eq!(events, vec![StoreEvent::ChecksumSkipped], "{:?}", placeholder);
        }
    }

    #[tokio::test]
    async fn unverified_file_that_cannot_be_removed_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone.gguf");
        let stuck = dir.path().join("stuck.gguf");
        std::fs::write(&gone, b"tampered").unwrap();
        std::fs::create_dir(&stuck).unwrap();

        assert!(discard_unverified(&gone).await);
        assert!(!gone.exists());
        assert!(discard_unverified(&gone).await);
        assert!(!discard_unverified(&stuck).await);
        assert!(stuck.exists());
    }

    #[tokio::test]
    async fn existing_file_with_matching_digest_is_returned_offline() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        std::fs::write(store.path_for("model.gguf"), b"weights").unwrap();
        let digest = checksum::digest(b"weights").to_uppercase();

        let path = store
            .ensure_file(
                "http://127.0.0.1:9/never",
                "model.gguf",
                &digest,
                true,
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap();

        assert!(path.exists());
    }

    #[tokio::test]
    async fn stale_file_is_removed_before_redownload() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        std::fs::write(store.path_for("model.gguf"), b"tampered").unwrap();
        let digest = checksum::digest(b"weights");

        let result = store
            .ensure_file(
                "http://127.0.0.1:9/never",
                "model.gguf",
                &digest,
                true,
                &CancellationToken::new(),
                |_| {},
            )
            .await;

        assert!(matches!(result, Err(ModelError::NetworkFailure(_))));
        assert!(!store.is_downloaded("model.gguf"));
    }

    #[tokio::test]
    async fn fast_path_reports_no_download_steps() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        std::fs::write(store.path_for("model.gguf"), b"weights").unwrap();

        let mut events = Vec::new();
        store
            .ensure_file_observed(
                "http://127.0.0.1:9/never",
                "model.gguf",
                &checksum::digest(b"weights"),
                true,
                &CancellationToken::new(),
                |event| events.push(event),
            )
            .await
            .unwrap();

        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn failed_download_reports_resume_offset() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        std::fs::write(store.partial_path_for("model.gguf"), b"12345").unwrap();

        let mut events = Vec::new();
        let result = store
            .ensure_file_observed(
                "http://127.0.0.1:9/never",
                "model.gguf",
                "",
                true,
                &CancellationToken::new(),
                |event| events.push(event),
            )
            .await;

        assert!(result.is_err());
        assert_eq!(events, vec![StoreEvent::Started { resume_from: 5 }]);
        assert_eq!(store.partial_bytes("model.gguf"), 5);
    }

    #[tokio::test]
    async fn delete_removes_final_and_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().to_path_buf());
        std::fs::write(store.path_for("model.gguf"), b"weights").unwrap();
        std::fs::write(store.partial_path_for("model.gguf"), b"wei").unwrap();
        assert_eq!(store.partial_bytes("model.gguf"), 3);

        store.delete("model.gguf").await.unwrap();

        assert!(!store.is_downloaded("model.gguf"));
        assert_eq!(store.partial_bytes("model.gguf"), 0);
        // Deleting again is not an error.
        store.delete("model.gguf").await.unwrap();
    }
}
