//! In-memory runtime with scripted outputs.
//!
//! Lets the lifecycle be exercised end to end without a multi-gigabyte model:
//! loads and generations are counted, outputs are returned from a queue and
//! loads can be slowed down or made to fail. A generation cancelled during
//! its delay returns no text.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::error::ModelError;
use super::runtime::{GenerationParams, InferenceRuntime, RuntimeFactory, TokenCallback};

#[derive(Default)]
struct Script {
    outputs: VecDeque<String>,
    fallback: String,
    fail_loads: usize,
    load_delay: Duration,
    generate_delay: Duration,
    loaded_path: Option<PathBuf>,
    last_prompts: Option<(String, String)>,
    last_params: Option<GenerationParams>,
}

/// Scripted stand-in for a real inference engine.
///
/// Clones share state, so a test can keep one handle for assertions and hand
/// another to the manager through [`ScriptedRuntime::factory`].
#[derive(Clone, Default)]
pub struct ScriptedRuntime {
    script: Arc<Mutex<Script>>,
    loads: Arc<AtomicUsize>,
    generations: Arc<AtomicUsize>,
    cancels: Arc<AtomicUsize>,
    cancel_requested: Arc<AtomicBool>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        let runtime = Self::default();
        runtime.script().fallback = "Bonjour".to_string();
        runtime
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a raw output for the next generate call.
    pub fn push_output(&self, output: impl Into<String>) -> &Self {
        self.script().outputs.push_back(output.into());
        self
    }

    /// Output returned once the queue is empty.
    pub fn set_fallback(&self, output: impl Into<String>) -> &Self {
        self.script().fallback = output.into();
        self
    }

    /// Make the next `count` loads fail with `RuntimeUnavailable`.
    pub fn fail_next_loads(&self, count: usize) -> &Self {
        self.script().fail_loads = count;
        self
    }

    pub fn set_load_delay(&self, delay: Duration) -> &Self {
        self.script().load_delay = delay;
        self
    }

    pub fn set_generate_delay(&self, delay: Duration) -> &Self {
        self.script().generate_delay = delay;
        self
    }

    /// Factory handing out handles to this runtime's shared state.
    pub fn factory(&self) -> RuntimeFactory {
        let runtime = self.clone();
        RuntimeFactory::new(move || Ok(Box::new(runtime.clone())))
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn generate_count(&self) -> usize {
        self.generations.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    pub fn loaded_path(&self) -> Option<PathBuf> {
        self.script().loaded_path.clone()
    }

    /// System and user prompt of the most recent generate call.
    pub fn last_prompts(&self) -> Option<(String, String)> {
        self.script().last_prompts.clone()
    }

    pub fn last_params(&self) -> Option<GenerationParams> {
        self.script().last_params
    }
}

impl InferenceRuntime for ScriptedRuntime {
    fn load_model(&self, path: &Path, _context_size: u32) -> Result<(), ModelError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let delay = {
            let mut script = self.script();
            script.loaded_path = None;
            if script.fail_loads > 0 {
                script.fail_loads -= 1;
                return Err(ModelError::RuntimeUnavailable(
                    "scripted load failure".to_string(),
                ));
            }
            script.load_delay
        };

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        self.script().loaded_path = Some(path.to_path_buf());
        Ok(())
    }

    fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: &GenerationParams,
        on_token: Option<TokenCallback>,
    ) -> Result<String, ModelError> {
        self.cancel_requested.store(false, Ordering::SeqCst);
        let (output, delay) = {
            let mut script = self.script();
            if script.loaded_path.is_none() {
                return Err(ModelError::ModelNotLoaded);
            }
            script.last_prompts = Some((system_prompt.to_string(), user_prompt.to_string()));
            script.last_params = Some(*params);
            let output = match script.outputs.pop_front() {
                Some(output) => output,
                None => script.fallback.clone(),
            };
            (output, script.generate_delay)
        };
        self.generations.fetch_add(1, Ordering::SeqCst);

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        // Cancelled before the first token
        if self.cancel_requested.swap(false, Ordering::SeqCst) {
            return Ok(String::new());
        }

        if let Some(mut callback) = on_token {
            callback(&output);
        }
        Ok(output)
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.cancel_requested.store(true, Ordering::SeqCst);
    }
}
