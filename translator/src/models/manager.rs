//! Model lifecycle: configure, prepare (download + verify + load) exactly
//! once, then translate against the loaded runtime.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use log::{debug, error, info, warn};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use super::codec::{self, Translation};
use super::error::ModelError;
use super::events::ModelEvent;
use super::runtime::{InferenceRuntime, TokenCallback};
use super::state::{transition, LifecycleEvent, LifecycleState};
use super::status::LifecycleStatus;
use super::store::{ArtifactStore, StoreEvent};
use crate::config::ModelConfig;

const EVENT_CAPACITY: usize = 64;

type PrepareFuture = Shared<BoxFuture<'static, Result<(), ModelError>>>;

/// The prepare attempt every concurrent caller joins.
struct InFlight {
    future: PrepareFuture,
    progress: watch::Receiver<Option<f64>>,
    cancel: CancellationToken,
    /// Configuration generation the attempt was started for
    generation: u64,
}

enum Joined {
    Current(PrepareFuture, watch::Receiver<Option<f64>>),
    /// Attempt for a replaced configuration; wait for it to release the file
    Stale(PrepareFuture),
}

struct ManagerState {
    config: Option<ModelConfig>,
    /// Present only while Ready
    runtime: Option<Arc<dyn InferenceRuntime>>,
    state: LifecycleState,
    /// Bumped by every configuration change so stale attempts can tell
    generation: u64,
    in_flight: Option<InFlight>,
    download_progress: Option<f64>,
}

impl ManagerState {
    fn apply(&mut self, event: LifecycleEvent) {
        match transition(self.state, event) {
            Ok(next) => {
                if next != self.state {
                    debug!("Model lifecycle {} -> {} ({})", self.state, next, event);
                }
                self.state = next;
            }
            Err(e) => warn!("Lifecycle transition failed: {}", e),
        }
    }

    fn status(&self) -> LifecycleStatus {
        LifecycleStatus {
            loaded: self.state == LifecycleState::Ready,
            preparing: self.in_flight.is_some(),
            download_progress: self.download_progress,
            state: self.state,
        }
    }
}

struct Inner {
    store: ArtifactStore,
    state: Mutex<ManagerState>,
    status: watch::Sender<LifecycleStatus>,
    events: broadcast::Sender<ModelEvent>,
}

/// Owns the model configuration and the loaded runtime.
///
/// Cheap to clone; clones share the same lifecycle. Construct one per
/// application and hand clones to whoever needs to translate.
#[derive(Clone)]
pub struct ModelManager {
    inner: Arc<Inner>,
}

impl ModelManager {
    pub fn new(models_dir: PathBuf) -> Self {
        Self::with_store(ArtifactStore::new(models_dir))
    }

    pub fn with_store(store: ArtifactStore) -> Self {
        info!("Models directory: {:?}", store.models_dir());
        let state = ManagerState {
            config: None,
            runtime: None,
            state: LifecycleState::Unconfigured,
            generation: 0,
            in_flight: None,
            download_progress: None,
        };
        let (status, _) = watch::channel(state.status());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                store,
                state: Mutex::new(state),
                status,
                events,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, state: &ManagerState) {
        self.inner.status.send_replace(state.status());
    }

    fn emit(&self, event: ModelEvent) {
        // No receivers is fine
        let _ = self.inner.events.send(event);
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.inner.store
    }

    pub fn status(&self) -> LifecycleStatus {
        self.state().status()
    }

    pub fn watch_status(&self) -> watch::Receiver<LifecycleStatus> {
        self.inner.status.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.state().state == LifecycleState::Ready
    }

    pub fn config(&self) -> Option<ModelConfig> {
        self.state().config.clone()
    }

    /// Local path of the configured model file.
    pub fn model_path(&self) -> Option<PathBuf> {
        self.state()
            .config
            .as_ref()
            .map(|config| self.inner.store.path_for(&config.filename))
    }

    /// Apply a new configuration.
    ///
    /// An identical configuration is a no-op, so a Ready model stays loaded.
    /// A different one drops the runtime; an in-flight prepare then finishes
    /// with `ConfigurationChanged`.
    pub fn configure(&self, config: ModelConfig) -> Result<(), ModelError> {
        config.validate()?;

        let mut state = self.state();
        if state.config.as_ref() == Some(&config) {
            debug!("Model config for '{}' unchanged", config.filename);
            return Ok(());
        }

        info!("Configured model '{}'", config.filename);
        state.config = Some(config);
        state.generation += 1;
        if state.runtime.take().is_some() {
            info!("Released runtime for previous model");
        }
        state.apply(LifecycleEvent::Configure);
        self.publish(&state);
        Ok(())
    }

    /// Make sure the configured model is downloaded, verified and loaded.
    ///
    /// Returns immediately when Ready. Concurrent callers share one attempt
    /// and all receive its result. A caller arriving after `configure`
    /// replaced the configuration waits for the old attempt to end and then
    /// prepares the new model. `on_progress` receives non-decreasing
    /// download fractions.
    pub async fn prepare_model<F>(&self, mut on_progress: F) -> Result<(), ModelError>
    where
        F: FnMut(f64) + Send,
    {
        let (mut future, mut progress) = loop {
            let joined = {
                let mut state = self.state();
                if state.state == LifecycleState::Ready {
                    return Ok(());
                }
                let generation = state.generation;
                let existing = state.in_flight.as_ref().map(|in_flight| {
                    (
                        in_flight.generation == generation,
                        in_flight.future.clone(),
                        in_flight.progress.clone(),
                    )
                });
                match existing {
                    Some((true, future, progress)) => {
                        debug!("Joining in-flight model preparation");
                        Joined::Current(future, progress)
                    }
                    Some((false, future, _)) => Joined::Stale(future),
                    None => {
                        let (future, progress) = self.start_prepare(&mut state)?;
                        Joined::Current(future, progress)
                    }
                }
            };

            match joined {
                Joined::Current(future, progress) => break (future, progress),
                Joined::Stale(stale) => {
                    debug!("Waiting for preparation of the previous model config to end");
                    // Its outcome belongs to the old configuration
                    let _ = stale.await;
                }
            }
        };

        let mut last: Option<f64> = None;
        let mut forward = |value: Option<f64>| {
            if let Some(fraction) = value {
                if last.map_or(true, |prev| fraction >= prev) {
                    last = Some(fraction);
                    on_progress(fraction);
                }
            }
        };

        loop {
            tokio::select! {
                result = &mut future => {
                    forward(*progress.borrow());
                    return result;
                }
                changed = progress.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let value = *progress.borrow_and_update();
                    forward(value);
                }
            }
        }

        future.await
    }

    fn start_prepare(
        &self,
        state: &mut ManagerState,
    ) -> Result<(PrepareFuture, watch::Receiver<Option<f64>>), ModelError> {
        let config = state.config.clone().ok_or(ModelError::NotConfigured)?;
        state.apply(LifecycleEvent::BeginPrepare);
        state.download_progress = None;

        let generation = state.generation;
        let cancel = CancellationToken::new();
        let (progress_tx, progress_rx) = watch::channel(None);

        info!("Preparing model '{}'", config.filename);
        let task = tokio::spawn(self.clone().run_prepare(
            config,
            generation,
            cancel.clone(),
            progress_tx,
        ));
        let future = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(ModelError::RuntimeUnavailable(format!(
                    "Model preparation task failed: {}",
                    e
                ))),
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(InFlight {
            future: future.clone(),
            progress: progress_rx.clone(),
            cancel,
            generation,
        });
        self.publish(state);

        Ok((future, progress_rx))
    }

    async fn run_prepare(
        self,
        config: ModelConfig,
        generation: u64,
        cancel: CancellationToken,
        progress: watch::Sender<Option<f64>>,
    ) -> Result<(), ModelError> {
        let loaded = self
            .acquire_and_load(&config, generation, &cancel, &progress)
            .await;
        self.finish_prepare(generation, loaded)
    }

    async fn acquire_and_load(
        &self,
        config: &ModelConfig,
        generation: u64,
        cancel: &CancellationToken,
        progress: &watch::Sender<Option<f64>>,
    ) -> Result<Arc<dyn InferenceRuntime>, ModelError> {
        let filename = config.filename.as_str();

        let path = self
            .inner
            .store
            .ensure_file_observed(
                &config.remote_url,
                filename,
                &config.sha256,
                true,
                cancel,
                |event| self.on_store_event(filename, event, progress),
            )
            .await?;

        let stale = self.state().generation != generation;
        if stale {
            info!("Model config changed while preparing '{}'", filename);
            return Err(ModelError::ConfigurationChanged);
        }

        let runtime = config.runtime_factory.create()?;
        self.clear_download_progress();
        self.emit(ModelEvent::LoadingStarted {
            filename: filename.to_string(),
        });
        info!("Loading model '{}' from {:?}", filename, path);
        load_blocking(runtime.clone(), path, config.context_length).await?;
        self.emit(ModelEvent::LoadingComplete {
            filename: filename.to_string(),
        });

        Ok(runtime)
    }

    fn on_store_event(
        &self,
        filename: &str,
        event: StoreEvent,
        progress: &watch::Sender<Option<f64>>,
    ) {
        let filename = filename.to_string();
        match event {
            StoreEvent::Started { resume_from } => {
                self.emit(ModelEvent::DownloadStarted {
                    filename,
                    resume_from,
                });
            }
            StoreEvent::Progress(p) => {
                let fraction = p.fraction();
                if fraction.is_some() {
                    progress.send_replace(fraction);
                    let mut state = self.state();
                    state.download_progress = fraction;
                    self.publish(&state);
                }
                self.emit(ModelEvent::DownloadProgress {
                    filename,
                    downloaded_bytes: p.downloaded_bytes,
                    total_bytes: p.total_bytes,
                    fraction,
                });
            }
            StoreEvent::ChecksumSkipped => self.emit(ModelEvent::ChecksumSkipped { filename }),
            StoreEvent::Verifying => self.emit(ModelEvent::Verifying { filename }),
            StoreEvent::Complete => {
                self.clear_download_progress();
                self.emit(ModelEvent::DownloadComplete { filename });
            }
        }
    }

    fn clear_download_progress(&self) {
        let mut state = self.state();
        if state.download_progress.take().is_some() {
            self.publish(&state);
        }
    }

    /// Publish the outcome of an attempt. Always clears `preparing`.
    fn finish_prepare(
        &self,
        generation: u64,
        loaded: Result<Arc<dyn InferenceRuntime>, ModelError>,
    ) -> Result<(), ModelError> {
        let mut state = self.state();
        state.in_flight = None;
        state.download_progress = None;
        let stale = state.generation != generation;

        let result = match loaded {
            Ok(_) if stale => Err(ModelError::ConfigurationChanged),
            Ok(runtime) => {
                state.runtime = Some(runtime);
                state.apply(LifecycleEvent::Loaded);
                info!("Model ready");
                Ok(())
            }
            Err(e) => {
                if !stale {
                    state.apply(LifecycleEvent::Fail);
                    self.publish(&state);
                    state.apply(LifecycleEvent::Recover);
                }
                Err(e)
            }
        };

        if let Err(e) = &result {
            error!("Model preparation failed: {}", e);
            self.emit(ModelEvent::Error {
                message: e.to_string(),
            });
        }
        self.publish(&state);
        result
    }

    /// Translate `text` and return the raw model output.
    ///
    /// Fails with `ModelNotLoaded` unless Ready; the state is left untouched.
    pub async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        on_token: Option<TokenCallback>,
    ) -> Result<String, ModelError> {
        let (runtime, config) = {
            let state = self.state();
            let config = state.config.clone().ok_or(ModelError::NotConfigured)?;
            match (&state.runtime, state.state) {
                (Some(runtime), LifecycleState::Ready) => (runtime.clone(), config),
                _ => return Err(ModelError::ModelNotLoaded),
            }
        };

        let prompt = codec::encode(
            &config.system_prompt,
            &config.user_template,
            target_lang,
            text,
        );
        let params = config.generation_params();
        debug!("Translating {} chars to {}", text.chars().count(), target_lang);

        tokio::task::spawn_blocking(move || {
            runtime.generate(&prompt.system, &prompt.user, &params, on_token)
        })
        .await
        .map_err(|e| ModelError::GenerationFailed(format!("Generation task failed: {}", e)))?
    }

    /// Prepare if needed, translate, and decode the output.
    pub async fn ensure_and_translate(
        &self,
        text: &str,
        target_lang: &str,
        on_token: Option<TokenCallback>,
    ) -> Result<Translation, ModelError> {
        if !self.is_ready() {
            self.prepare_model(|_| {}).await?;
        }
        let raw = self.translate(text, target_lang, on_token).await?;
        Ok(codec::decode(&raw))
    }

    /// Ask the runtime to stop generating. No-op without a runtime.
    pub fn cancel(&self) {
        let runtime = self.state().runtime.clone();
        if let Some(runtime) = runtime {
            runtime.cancel();
        }
    }

    /// Cancel the in-flight download, keeping the partial file for resume.
    /// Returns whether there was one.
    pub fn cancel_download(&self) -> bool {
        match &self.state().in_flight {
            Some(in_flight) => {
                info!("Cancelling model download");
                in_flight.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop the runtime and release the model's memory.
    pub fn unload(&self) {
        let mut state = self.state();
        if state.runtime.take().is_some() {
            info!("Model unloaded");
        }
        if state.state == LifecycleState::Ready {
            state.apply(LifecycleEvent::Unload);
            self.publish(&state);
        }
    }
}

async fn load_blocking(
    runtime: Arc<dyn InferenceRuntime>,
    path: PathBuf,
    context_size: u32,
) -> Result<(), ModelError> {
    tokio::task::spawn_blocking(move || runtime.load_model(&path, context_size))
        .await
        .map_err(|e| ModelError::RuntimeUnavailable(format!("Model loading task failed: {}", e)))?
}
