pub mod catalog;
pub mod checksum;
pub mod codec;
mod download;
mod error;
pub mod events;
mod llama;
mod manager;
mod runtime;
mod scripted;
mod state;
mod status;
mod store;

pub use catalog::{find_model, get_model_catalog, is_model_in_catalog, ModelCatalogEntry};
pub use codec::{Prompt, Translation};
pub use download::{partial_path, DownloadProgress, Downloader, PARTIAL_EXTENSION};
pub use error::ModelError;
pub use events::ModelEvent;
pub use llama::LlamaRuntime;
pub use manager::ModelManager;
pub use runtime::{GenerationParams, InferenceRuntime, RuntimeFactory, TokenCallback};
pub use scripted::ScriptedRuntime;
pub use state::{transition, LifecycleEvent, LifecycleState, TransitionRejection};
pub use status::LifecycleStatus;
pub use store::{ArtifactStore, StoreEvent};
