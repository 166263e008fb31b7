//! Single-turn chat generation on top of llama.cpp.
//!
//! This crate owns the native model handle and nothing else: it loads a GGUF
//! file with a fixed context window, runs one prompt per call and releases the
//! model when the [`LlamaRunner`] is dropped. Higher level concerns (where the
//! file comes from, when it is loaded, how output is cleaned up) belong to the
//! caller.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::atomic::AtomicBool;
//! use uniterra_llama::{format_chat_prompt, LlamaRunner, Sampling};
//!
//! fn main() -> Result<(), uniterra_llama::RunnerError> {
//!     let runner = LlamaRunner::new(Path::new("Qwen3-8B-Q4_K_M.gguf"), 456)?;
//!     let prompt = format_chat_prompt("You are a translator.", "Translate to French:\nHello");
//!     let cancel = AtomicBool::new(false);
//!     let text = runner.generate_response(&prompt, &Sampling::default(), &cancel, &mut |_| {})?;
//!     println!("{text}");
//!     Ok(())
//! }
//! ```

mod prompt;

#[cfg(feature = "native")]
mod native;

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use thiserror::Error;

pub use prompt::{format_chat_prompt, CHAT_CONTROL_TOKENS};

/// Errors raised by the native runner.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunnerError {
    /// The crate was built without the `native` feature.
    #[error("llama.cpp engine is not compiled into this build")]
    EngineUnavailable,

    /// The model file does not exist.
    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),

    /// llama.cpp rejected the model file.
    #[error("Failed to load model: {0}")]
    LoadFailed(String),

    /// A context could not be created for the prompt.
    #[error("Failed to create inference session: {0}")]
    SessionFailed(String),

    /// Sampling failed part way through.
    #[error("Generation failed: {0}")]
    GenerationFailed(String),
}

/// Sampling parameters for one generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    /// Nucleus sampling threshold.
    pub top_p: f32,
    pub top_k: i32,
    pub repeat_penalty: f32,
    /// Upper bound on generated tokens.
    pub max_tokens: usize,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 0.95,
            top_k: 64,
            repeat_penalty: 1.05,
            max_tokens: 256,
        }
    }
}

/// A loaded model, ready to generate.
///
/// Loading is blocking and allocates roughly the size of the model file, so
/// callers should construct runners off any latency sensitive thread. The
/// native handle is freed on drop.
pub struct LlamaRunner {
    model_path: PathBuf,
    context_size: u32,
    #[cfg(feature = "native")]
    model: native::NativeModel,
}

impl LlamaRunner {
    /// Load a model file with the given context window (in tokens).
    pub fn new(model_path: &Path, context_size: u32) -> Result<Self, RunnerError> {
        if !model_path.exists() {
            return Err(RunnerError::ModelNotFound(model_path.to_path_buf()));
        }

        log::info!(
            "Loading llama model from {:?} (context {} tokens)",
            model_path,
            context_size
        );

        Self::load(model_path, context_size)
    }

    #[cfg(feature = "native")]
    fn load(model_path: &Path, context_size: u32) -> Result<Self, RunnerError> {
        let model = native::NativeModel::load(model_path)?;
        Ok(Self {
            model_path: model_path.to_path_buf(),
            context_size,
            model,
        })
    }

    #[cfg(not(feature = "native"))]
    fn load(_model_path: &Path, _context_size: u32) -> Result<Self, RunnerError> {
        Err(RunnerError::EngineUnavailable)
    }

    /// Run one completion for an already formatted prompt.
    ///
    /// `on_piece` receives every decoded piece as it is produced. Generation
    /// stops early once `cancel` is set; the text produced so far is returned.
    #[cfg(feature = "native")]
    pub fn generate_response(
        &self,
        prompt: &str,
        sampling: &Sampling,
        cancel: &AtomicBool,
        on_piece: &mut dyn FnMut(&str),
    ) -> Result<String, RunnerError> {
        self.model
            .complete(prompt, self.context_size, sampling, cancel, on_piece)
    }

    #[cfg(not(feature = "native"))]
    pub fn generate_response(
        &self,
        _prompt: &str,
        _sampling: &Sampling,
        _cancel: &AtomicBool,
        _on_piece: &mut dyn FnMut(&str),
    ) -> Result<String, RunnerError> {
        Err(RunnerError::EngineUnavailable)
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn context_size(&self) -> u32 {
        self.context_size
    }
}

impl Drop for LlamaRunner {
    fn drop(&mut self) {
        log::debug!("Releasing llama model {:?}", self.model_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_file_is_reported_before_engine_check() {
        let result = LlamaRunner::new(Path::new("/definitely/missing/model.gguf"), 256);
        assert!(matches!(result, Err(RunnerError::ModelNotFound(_))));
    }

    #[cfg(not(feature = "native"))]
    #[test]
    fn existing_file_without_engine_is_unavailable() {
        let dir = std::env::temp_dir().join("uniterra-llama-engine-check");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("tiny.gguf");
        std::fs::write(&file, b"GGUF").unwrap();

        let result = LlamaRunner::new(&file, 256);
        assert!(matches!(result, Err(RunnerError::EngineUnavailable)));
    }

    #[test]
    fn default_sampling_matches_translation_defaults() {
        let sampling = Sampling::default();
        assert_eq!(sampling.top_k, 64);
        assert_eq!(sampling.max_tokens, 256);
        assert!((sampling.temperature - 0.2).abs() < f32::EPSILON);
    }
}
