use derive_more::{Display, From};

use crate::config::ConfigError;
use crate::models::ModelError;

#[derive(Debug, Display, From)]
pub enum Error {
    #[from]
    Model(ModelError),

    #[from]
    Config(ConfigError),

    #[from]
    #[display("failed to read {}: {}", _0.display(), _1)]
    Input(std::path::PathBuf, std::io::Error),

    #[from]
    #[display("invalid JSON: {_0}")]
    Json(serde_json::Error),
}

impl Error {
    /// Message for the end user. Model errors use their short UI text.
    pub fn user_message(&self) -> String {
        match self {
            Error::Model(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}
