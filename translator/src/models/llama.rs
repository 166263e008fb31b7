use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use uniterra_llama::{format_chat_prompt, LlamaRunner, RunnerError, Sampling};

use super::error::ModelError;
use super::runtime::{GenerationParams, InferenceRuntime, TokenCallback};

/// llama.cpp runtime. Owns at most one loaded model; dropping the runtime
/// releases it.
pub struct LlamaRuntime {
    runner: Mutex<Option<LlamaRunner>>,
    cancel_requested: Arc<AtomicBool>,
}

impl LlamaRuntime {
    pub fn new() -> Self {
        Self {
            runner: Mutex::new(None),
            cancel_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    fn runner(&self) -> MutexGuard<'_, Option<LlamaRunner>> {
        self.runner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for LlamaRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl From<RunnerError> for ModelError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::ModelNotFound(path) => ModelError::RuntimeUnavailable(format!(
                "model file not found: {}",
                path.display()
            )),
            RunnerError::GenerationFailed(msg) => ModelError::GenerationFailed(msg),
            other => ModelError::RuntimeUnavailable(other.to_string()),
        }
    }
}

impl InferenceRuntime for LlamaRuntime {
    fn load_model(&self, path: &Path, context_size: u32) -> Result<(), ModelError> {
        // Release the previous model before allocating the next one.
        let mut runner = self.runner();
        if runner.take().is_some() {
            debug!("Released previously loaded llama model");
        }

        let loaded = LlamaRunner::new(path, context_size)?;
        info!("llama model loaded from {:?}", path);
        *runner = Some(loaded);
        Ok(())
    }

    fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: &GenerationParams,
        on_token: Option<TokenCallback>,
    ) -> Result<String, ModelError> {
        let runner = self.runner();
        let runner = runner.as_ref().ok_or(ModelError::ModelNotLoaded)?;

        let prompt = format_chat_prompt(system_prompt, user_prompt);
        let sampling = Sampling {
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
            repeat_penalty: params.repeat_penalty,
            max_tokens: params.max_tokens as usize,
        };

        self.cancel_requested.store(false, Ordering::SeqCst);
        let mut on_token = on_token;
        let mut forward = |piece: &str| {
            if let Some(callback) = on_token.as_mut() {
                callback(piece);
            }
        };

        let output =
            runner.generate_response(&prompt, &sampling, &self.cancel_requested, &mut forward)?;

        if self.cancel_requested.swap(false, Ordering::SeqCst) {
            warn!("Generation was cancelled; returning partial output");
        }
        Ok(output)
    }

    fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_before_load_is_rejected() {
        let runtime = LlamaRuntime::new();
        let result = runtime.generate("system", "user", &GenerationParams::default(), None);
        assert!(matches!(result, Err(ModelError::ModelNotLoaded)));
    }

    #[test]
    fn loading_a_missing_file_is_a_runtime_failure() {
        let runtime = LlamaRuntime::new();
        let result = runtime.load_model(Path::new("/definitely/missing.gguf"), 256);
        assert!(matches!(result, Err(ModelError::RuntimeUnavailable(_))));
    }

    #[test]
    fn cancel_without_generation_is_harmless() {
        let runtime = LlamaRuntime::new();
        runtime.cancel();
        runtime.cancel();
        let result = runtime.generate("system", "user", &GenerationParams::default(), None);
        assert!(matches!(result, Err(ModelError::ModelNotLoaded)));
    }
}
