//! The inference capability the lifecycle manager drives.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize};

use super::error::ModelError;
use super::llama::LlamaRuntime;

/// Receives generated text. Depending on the runtime this is called once per
/// piece or once with the full output.
pub type TokenCallback = Box<dyn FnMut(&str) + Send>;

/// Sampling parameters for one generate call, built fresh from the config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: i32,
    pub repeat_penalty: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
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

/// A local inference engine.
///
/// All methods are blocking. The manager calls `load_model` and `generate`
/// from blocking worker threads, never from an async executor thread.
pub trait InferenceRuntime: Send + Sync {
    /// Load the model file. A second call replaces the loaded model and must
    /// release the previous one first.
    fn load_model(&self, path: &Path, context_size: u32) -> Result<(), ModelError>;

    /// Generate a reply. Fails with `ModelNotLoaded` before a successful load.
    fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: &GenerationParams,
        on_token: Option<TokenCallback>,
    ) -> Result<String, ModelError>;

    /// Best-effort request to stop an in-flight `generate`.
    fn cancel(&self);
}

type BuildRuntime = dyn Fn() -> Result<Box<dyn InferenceRuntime>, ModelError> + Send + Sync;

static LLAMA_FACTORY: LazyLock<RuntimeFactory> =
    LazyLock::new(|| RuntimeFactory::new(|| Ok(Box::new(LlamaRuntime::new()))));

/// Builds the runtime adapter, so backends can be swapped without touching callers.
///
/// Two factories are equal only when they share the same builder.
#[derive(Clone)]
pub struct RuntimeFactory(Arc<BuildRuntime>);

impl RuntimeFactory {
    pub fn new<F>(build: F) -> Self
    where
        F: Fn() -> Result<Box<dyn InferenceRuntime>, ModelError> + Send + Sync + 'static,
    {
        Self(Arc::new(build))
    }

    /// The llama.cpp backed runtime.
    pub fn llama() -> Self {
        LLAMA_FACTORY.clone()
    }

    pub fn create(&self) -> Result<Arc<dyn InferenceRuntime>, ModelError> {
        (self.0)().map(Arc::from)
    }
}

impl Default for RuntimeFactory {
    fn default() -> Self {
        Self::llama()
    }
}

impl PartialEq for RuntimeFactory {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl fmt::Debug for RuntimeFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::llama() {
            f.write_str("RuntimeFactory(llama)")
        } else {
            f.write_str("RuntimeFactory(custom)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::scripted::ScriptedRuntime;

    #[test]
    fn default_factory_is_shared() {
        assert_eq!(RuntimeFactory::default(), RuntimeFactory::llama());
        assert_eq!(format!("{:?}", RuntimeFactory::default()), "RuntimeFactory(llama)");
    }

    #[test]
    fn custom_factories_compare_by_identity() {
        let a = RuntimeFactory::new(|| Ok(Box::new(ScriptedRuntime::new())));
        let b = RuntimeFactory::new(|| Ok(Box::new(ScriptedRuntime::new())));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_ne!(a, RuntimeFactory::llama());
    }

    #[test]
    fn factory_errors_propagate() {
        let failing =
            RuntimeFactory::new(|| Err(ModelError::RuntimeUnavailable("no engine".into())));
        assert!(matches!(
            failing.create(),
            Err(ModelError::RuntimeUnavailable(_))
        ));
    }
}
