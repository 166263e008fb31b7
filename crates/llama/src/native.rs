//! llama.cpp bindings (enabled by the `native` feature).

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use llama_cpp::standard_sampler::{SamplerStage, StandardSampler};
use llama_cpp::{LlamaModel, LlamaParams, SessionParams};
use log::{debug, warn};

use crate::{RunnerError, Sampling};

/// Tokens considered by the repetition penalty.
const REPEAT_LAST_N: i32 = 64;

pub(crate) struct NativeModel {
    model: LlamaModel,
}

impl NativeModel {
    pub(crate) fn load(path: &Path) -> Result<Self, RunnerError> {
        let model = LlamaModel::load_from_file(path, LlamaParams::default())
            .map_err(|err| RunnerError::LoadFailed(format!("{err:?}")))?;
        Ok(Self { model })
    }

    /// One fresh session per completion so no context leaks between requests.
    pub(crate) fn complete(
        &self,
        prompt: &str,
        context_size: u32,
        sampling: &Sampling,
        cancel: &AtomicBool,
        on_piece: &mut dyn FnMut(&str),
    ) -> Result<String, RunnerError> {
        let mut params = SessionParams::default();
        params.n_ctx = context_size;

        let mut session = self
            .model
            .create_session(params)
            .map_err(|err| RunnerError::SessionFailed(format!("{err:?}")))?;

        session
            .advance_context(prompt)
            .map_err(|err| RunnerError::SessionFailed(format!("{err}")))?;

        let sampler = StandardSampler::new_softmax(
            vec![
                SamplerStage::RepetitionPenalty {
                    repetition_penalty: sampling.repeat_penalty,
                    frequency_penalty: 0.0,
                    presence_penalty: 0.0,
                    last_n: REPEAT_LAST_N,
                },
                SamplerStage::TopK(sampling.top_k),
                SamplerStage::TopP(sampling.top_p),
                SamplerStage::Temperature(sampling.temperature),
            ],
            1,
        );

        let mut stream = session
            .start_completing_with(sampler, sampling.max_tokens)
            .map_err(|err| RunnerError::GenerationFailed(format!("{err:?}")))?
            .into_strings();

        let mut output = String::new();
        for piece in stream.by_ref() {
            if cancel.load(Ordering::Relaxed) {
                warn!("Generation cancelled after {} bytes", output.len());
                break;
            }
            if piece.is_empty() {
                continue;
            }
            on_piece(&piece);
            output.push_str(&piece);
        }
        drop(stream);

        debug!("Generated {} bytes", output.len());
        Ok(output)
    }
}
