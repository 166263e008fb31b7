use std::sync::Arc;

/// Errors produced by the model lifecycle.
///
/// Cloneable so that every caller coalesced onto one prepare attempt
/// receives the same failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("Model manager is not configured")]
    NotConfigured,
    #[error("Invalid model configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Model runtime is unavailable: {0}")]
    RuntimeUnavailable(String),
    #[error("Model is not loaded")]
    ModelNotLoaded,
    #[error("Downloaded model failed checksum verification: expected {expected}, got {actual}")]
    InvalidChecksum { expected: String, actual: String },
    #[error("Network error while downloading model: {0}")]
    NetworkFailure(String),
    #[error("File I/O error: {0}")]
    FileIo(Arc<std::io::Error>),
    #[error("Download cancelled")]
    Cancelled,
    #[error("Configuration changed while the model was being prepared")]
    ConfigurationChanged,
    #[error("Generation failed: {0}")]
    GenerationFailed(String),
    #[error("No target language set")]
    LanguageNotSet,
    #[error("Unsupported target language: {0}")]
    UnsupportedLanguage(String),
}

impl From<std::io::Error> for ModelError {
    fn from(err: std::io::Error) -> Self {
        ModelError::FileIo(Arc::new(err))
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        ModelError::NetworkFailure(err.to_string())
    }
}

impl ModelError {
    /// Returns a user-friendly error message suitable for display in the UI
    pub fn user_message(&self) -> String {
        match self {
            ModelError::NotConfigured => {
                "Translation model is not set up yet. Please try again.".to_string()
            }
            ModelError::InvalidConfiguration(msg) => {
                format!("Translation model settings are invalid: {}", msg)
            }
            ModelError::RuntimeUnavailable(_) => {
                "Could not start the translation model on this device.".to_string()
            }
            ModelError::ModelNotLoaded => {
                "Translation model is still loading. Please wait.".to_string()
            }
            ModelError::InvalidChecksum { .. } => {
                "Downloaded model was corrupted. Please retry the download.".to_string()
            }
            ModelError::NetworkFailure(_) => {
                "Network error while downloading the model. Check your connection and retry."
                    .to_string()
            }
            ModelError::FileIo(_) => {
                "Could not read or write the model file. Check available storage.".to_string()
            }
            ModelError::Cancelled => "Model download was cancelled.".to_string(),
            ModelError::ConfigurationChanged => {
                "Model settings changed during setup. Please try again.".to_string()
            }
            ModelError::GenerationFailed(_) => "Translation failed. Please try again.".to_string(),
            ModelError::LanguageNotSet => "Please set your language".to_string(),
            ModelError::UnsupportedLanguage(name) => {
                format!("'{}' is not a supported language.", name)
            }
        }
    }

    /// Whether repeating the same call can succeed without other changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ModelError::RuntimeUnavailable(_)
                | ModelError::InvalidChecksum { .. }
                | ModelError::NetworkFailure(_)
                | ModelError::FileIo(_)
                | ModelError::Cancelled
                | ModelError::ConfigurationChanged
                | ModelError::GenerationFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert_and_stay_cloneable() {
        let err: ModelError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        let copy = err.clone();
        assert!(matches!(copy, ModelError::FileIo(_)));
        assert!(copy.to_string().contains("denied"));
    }

    #[test]
    fn user_messages_are_short_and_non_empty() {
        let errors = vec![
            ModelError::NotConfigured,
            ModelError::InvalidConfiguration("bad url".into()),
            ModelError::RuntimeUnavailable("engine".into()),
            ModelError::ModelNotLoaded,
            ModelError::InvalidChecksum {
                expected: "aa".into(),
                actual: "bb".into(),
            },
            ModelError::NetworkFailure("503".into()),
            ModelError::Cancelled,
            ModelError::ConfigurationChanged,
            ModelError::GenerationFailed("oom".into()),
            ModelError::LanguageNotSet,
            ModelError::UnsupportedLanguage("Klingon".into()),
        ];

        for err in errors {
            let message = err.user_message();
            assert!(!message.is_empty(), "{:?} has empty message", err);
            assert!(message.len() < 120, "{:?} message too long", err);
        }
    }

    #[test]
    fn usage_errors_are_not_retryable() {
        assert!(!ModelError::NotConfigured.is_retryable());
        assert!(!ModelError::ModelNotLoaded.is_retryable());
        assert!(!ModelError::LanguageNotSet.is_retryable());
        assert!(ModelError::NetworkFailure("reset".into()).is_retryable());
    }
}
