//! On-device chat translation.
//!
//! [`models::ModelManager`] downloads, verifies and loads a local LLM and
//! serves translations against it. [`Translator`] is the entry point for chat
//! rooms: it resolves the reader's language and picks the text to translate.

pub mod chat;
pub mod config;
pub mod error;
pub mod log;
pub mod models;
pub mod translator;

pub use error::Error;
pub use models::{ModelError, ModelManager, Translation};
pub use translator::Translator;
