use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::models::catalog::ModelCatalogEntry;
use crate::models::codec::{
    DEFAULT_SYSTEM_PROMPT, DEFAULT_USER_TEMPLATE, SOURCE_TEXT_PLACEHOLDER,
    TARGET_LANG_PLACEHOLDER,
};
use crate::models::{GenerationParams, ModelError, RuntimeFactory};

const APP_DIR: &str = "uniterra";

/// Default location of downloaded models: `<data dir>/uniterra/models`.
pub fn default_models_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(APP_DIR).join("models"))
}

/// Default location of persisted settings: `<data dir>/uniterra/settings.json`.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(APP_DIR).join("settings.json"))
}

/// Type-safe configuration key that associates a key name with its value type
#[derive(Debug, Clone, Copy)]
pub struct ConfigKey<T> {
    name: &'static str,
    _phantom: PhantomData<T>,
}

impl<T> ConfigKey<T> {
    const fn new(name: &'static str) -> Self {
        Self {
            name,
            _phantom: PhantomData,
        }
    }

    pub fn key_name(&self) -> &'static str {
        self.name
    }
}

// ===== Model Configuration =====

fn default_context_length() -> u32 {
    256
}

fn default_temperature() -> f32 {
    GenerationParams::default().temperature
}

fn default_top_p() -> f32 {
    GenerationParams::default().top_p
}

fn default_top_k() -> i32 {
    GenerationParams::default().top_k
}

fn default_repeat_penalty() -> f32 {
    GenerationParams::default().repeat_penalty
}

fn default_max_tokens() -> u32 {
    GenerationParams::default().max_tokens
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_user_template() -> String {
    DEFAULT_USER_TEMPLATE.to_string()
}

/// Everything the model manager needs to fetch, load and prompt one model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub remote_url: String,
    /// Filename inside the models directory
    pub filename: String,
    /// Expected SHA-256 (hex). Empty or a placeholder disables verification.
    #[serde(default)]
    pub sha256: String,
    #[serde(default = "default_context_length")]
    pub context_length: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_top_k")]
    pub top_k: i32,
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Must contain `{TARGET_LANG}` and `{SOURCE_TEXT}`
    #[serde(default = "default_user_template")]
    pub user_template: String,
    #[serde(skip)]
    pub runtime_factory: RuntimeFactory,
}

impl ModelConfig {
    pub fn new(remote_url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            remote_url: remote_url.into(),
            filename: filename.into(),
            sha256: String::new(),
            context_length: default_context_length(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            repeat_penalty: default_repeat_penalty(),
            max_tokens: default_max_tokens(),
            system_prompt: default_system_prompt(),
            user_template: default_user_template(),
            runtime_factory: RuntimeFactory::default(),
        }
    }

    pub fn from_catalog(entry: &ModelCatalogEntry) -> Self {
        Self {
            sha256: entry.sha256.clone(),
            context_length: entry.context_length,
            ..Self::new(entry.url.clone(), entry.filename.clone())
        }
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = sha256.into();
        self
    }

    pub fn with_runtime_factory(mut self, factory: RuntimeFactory) -> Self {
        self.runtime_factory = factory;
        self
    }

    /// Sampling parameters for one generate call.
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            repeat_penalty: self.repeat_penalty,
            max_tokens: self.max_tokens,
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        let invalid = |msg: String| Err(ModelError::InvalidConfiguration(msg));

        match reqwest::Url::parse(&self.remote_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => return invalid(format!("unsupported URL scheme '{}'", url.scheme())),
            Err(e) => return invalid(format!("invalid remote URL '{}': {}", self.remote_url, e)),
        }

        if self.filename.trim().is_empty() {
            return invalid("filename is empty".into());
        }
        if self.filename.contains(['/', '\\']) || self.filename == ".." || self.filename == "." {
            return invalid(format!("filename '{}' must not be a path", self.filename));
        }

        for placeholder in [TARGET_LANG_PLACEHOLDER, SOURCE_TEXT_PLACEHOLDER] {
            if !self.user_template.contains(placeholder) {
                return invalid(format!("user template is missing {}", placeholder));
            }
        }

        if self.context_length == 0 {
            return invalid("context length must be greater than zero".into());
        }
        if self.max_tokens == 0 {
            return invalid("max tokens must be greater than zero".into());
        }
        Ok(())
    }
}

impl ConfigKey<ModelConfig> {
    pub const MODEL: Self = Self::new("modelConfig");
}

// ===== Translation Preferences =====

/// Per-user translation preferences (stored locally)
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranslationPreferences {
    /// Language name from the supported list (e.g., "French")
    pub target_language: Option<String>,
}

impl ConfigKey<TranslationPreferences> {
    pub const TRANSLATION: Self = Self::new("translationPreferences");
}

// ===== Type-Safe Config Store =====

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access settings file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode setting: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub trait ConfigStore {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T>;
    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), ConfigError>;
    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), ConfigError>;
}

/// Config store backed by one JSON object on disk.
///
/// Every write rewrites the whole file through a temporary sibling and a rename.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store; an
    /// unreadable one is logged and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let values = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                log::warn!("Ignoring corrupt settings file {:?}: {}", path, e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn values(&self) -> MutexGuard<'_, BTreeMap<String, serde_json::Value>> {
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn save(&self, values: &BTreeMap<String, serde_json::Value>) -> Result<(), ConfigError> {
        let io_err = |source: std::io::Error| ConfigError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let bytes = serde_json::to_vec_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl ConfigStore for JsonFileStore {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T> {
        self.values()
            .get(key.key_name())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), ConfigError> {
        let val = serde_json::to_value(value)?;
        let mut values = self.values();
        values.insert(key.key_name().to_string(), val);
        self.save(&values)
    }

    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), ConfigError> {
        let mut values = self.values();
        if values.remove(key.key_name()).is_some() {
            self.save(&values)?;
        }
        Ok(())
    }
}
