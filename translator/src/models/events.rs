//! Events emitted by the model manager.
//!
//! A single tagged stream covers download and loading transitions, so a UI
//! can drive one progress view from it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ModelEvent {
    /// A download request was sent
    #[serde(rename = "downloadStarted", rename_all = "camelCase")]
    DownloadStarted { filename: String, resume_from: u64 },
    /// Download is in progress
    #[serde(rename = "downloadProgress", rename_all = "camelCase")]
    DownloadProgress {
        filename: String,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
        fraction: Option<f64>,
    },
    /// No digest is configured, so the artifact is used unverified
    #[serde(rename = "checksumSkipped")]
    ChecksumSkipped { filename: String },
    /// Download complete, verifying checksum
    #[serde(rename = "verifying")]
    Verifying { filename: String },
    /// The artifact is on disk and usable
    #[serde(rename = "downloadComplete")]
    DownloadComplete { filename: String },
    #[serde(rename = "loadingStarted")]
    LoadingStarted { filename: String },
    #[serde(rename = "loadingComplete")]
    LoadingComplete { filename: String },
    /// The prepare attempt failed
    #[serde(rename = "error")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_serializes_camel_case_with_tag() {
        let event = ModelEvent::DownloadProgress {
            filename: "model.gguf".into(),
            downloaded_bytes: 50,
            total_bytes: Some(100),
            fraction: Some(0.5),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["state"], "downloadProgress");
        assert_eq!(json["downloadedBytes"], 50);
        assert_eq!(json["totalBytes"], 100);
        assert_eq!(json["fraction"], 0.5);
    }

    #[test]
    fn skipped_checksum_has_its_own_tag() {
        let event = ModelEvent::ChecksumSkipped {
            filename: "model.gguf".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["state"], "checksumSkipped");
        assert_eq!(json["filename"], "model.gguf");
    }

    #[test]
    fn started_event_round_trips() {
        let event = ModelEvent::DownloadStarted {
            filename: "model.gguf".into(),
            resume_from: 1024,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"resumeFrom\":1024"));
        let back: ModelEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
