// Composition root: builds the one ModelManager for this process.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{debug, info, warn};
use tokio::sync::broadcast::error::RecvError;
use uniterra_lib::chat::{ChatMessage, ProfileSource};
use uniterra_lib::config::{
    default_models_dir, default_settings_path, ConfigKey, ConfigStore, JsonFileStore,
    ModelConfig, TranslationPreferences,
};
use uniterra_lib::models::{catalog, ModelEvent, TokenCallback};
use uniterra_lib::{Error, ModelError, ModelManager, Translator};

#[derive(Parser, Debug)]
#[command(name = "uniterra-translate")]
#[command(about = "Translate chat text with an on-device model", long_about = None)]
#[command(version)]
struct Cli {
    /// Model configuration JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding downloaded models
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Catalog model id (e.g. qwen-8b-instruct)
    #[arg(short, long)]
    model: Option<String>,

    /// Target language; defaults to the saved preference
    #[arg(short, long)]
    target: Option<String>,

    /// JSON array of room messages, used when no text is given
    #[arg(long)]
    room_file: Option<PathBuf>,

    /// Current user id, so their own messages are skipped
    #[arg(long, default_value = "me")]
    user: String,

    /// Print tokens as they are generated
    #[arg(long)]
    stream: bool,

    /// Remember the chosen model and target language
    #[arg(long)]
    save: bool,

    /// Text to translate
    text: Option<String>,
}

struct CliProfile(Option<String>);

impl ProfileSource for CliProfile {
    fn preferred_language(&self) -> Option<String> {
        self.0.clone()
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    uniterra_lib::log::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!("{:?}", e);
            eprintln!("{}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let settings_path =
        default_settings_path().unwrap_or_else(|| PathBuf::from("uniterra-settings.json"));
    let settings = JsonFileStore::open(settings_path)?;

    let config = resolve_model_config(&cli, &settings)?;
    let target = cli.target.clone().or_else(|| {
        settings
            .get(&ConfigKey::TRANSLATION)
            .and_then(|prefs| prefs.target_language)
    });

    if cli.save {
        settings.set(&ConfigKey::MODEL, config.clone())?;
        settings.set(
            &ConfigKey::TRANSLATION,
            TranslationPreferences {
                target_language: target.clone(),
            },
        )?;
        info!("Saved settings to {:?}", settings.path());
    }

    let models_dir = cli
        .models_dir
        .clone()
        .or_else(default_models_dir)
        .unwrap_or_else(|| PathBuf::from("models"));

    let manager = ModelManager::new(models_dir);
    manager.configure(config)?;
    spawn_event_logger(&manager);
    spawn_interrupt_handler(&manager);

    let messages = match &cli.room_file {
        Some(path) => read_room_file(path)?,
        None => Vec::new(),
    };

    if !manager.is_ready() {
        manager
            .prepare_model(|fraction| {
                eprint!("\rDownloading model: {:>3.0}%", fraction * 100.0);
            })
            .await?;
        eprintln!();
    }

    let on_token: Option<TokenCallback> = if cli.stream {
        Some(Box::new(|piece: &str| {
            print!("{}", piece);
            let _ = std::io::stdout().flush();
        }))
    } else {
        None
    };

    let translator = Translator::new(manager, CliProfile(target));
    let translation = translator
        .translate_for_room(cli.text.as_deref(), &messages, &cli.user, on_token)
        .await?;

    if cli.stream {
        println!();
    }
    println!("{}", translation.text);
    if !translation.thoughts.is_empty() {
        eprintln!("(thoughts: {})", translation.thoughts);
    }
    Ok(())
}

fn resolve_model_config(cli: &Cli, settings: &JsonFileStore) -> Result<ModelConfig, Error> {
    if let Some(path) = &cli.config {
        let bytes = std::fs::read(path).map_err(|e| (path.clone(), e))?;
        return Ok(serde_json::from_slice(&bytes)?);
    }

    if let Some(id) = &cli.model {
        let entry = catalog::find_model(id)
            .ok_or_else(|| ModelError::InvalidConfiguration(format!("unknown model '{}'", id)))?;
        return Ok(ModelConfig::from_catalog(&entry));
    }

    if let Some(saved) = settings.get(&ConfigKey::MODEL) {
        return Ok(saved);
    }

    let entry = catalog::find_model(catalog::DEFAULT_MODEL_ID).ok_or_else(|| {
        ModelError::InvalidConfiguration("default model missing from catalog".into())
    })?;
    Ok(ModelConfig::from_catalog(&entry))
}

fn read_room_file(path: &Path) -> Result<Vec<ChatMessage>, Error> {
    let bytes = std::fs::read(path).map_err(|e| (path.to_path_buf(), e))?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn spawn_event_logger(manager: &ModelManager) {
    let mut events = manager.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ModelEvent::DownloadProgress { .. }) => {}
                Ok(ModelEvent::Error { message }) => warn!("Model error: {}", message),
                Ok(other) => debug!("Model event: {:?}", other),
                Err(RecvError::Lagged(skipped)) => debug!("Skipped {} model events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// First Ctrl-C stops the download (the partial file is kept) or generation.
/// A second one exits.
fn spawn_interrupt_handler(manager: &ModelManager) {
    let manager = manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        if !manager.cancel_download() {
            manager.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}
