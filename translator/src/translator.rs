use log::{debug, warn};

use crate::chat::{select_source_text, supported_language, ChatMessage, ProfileSource};
use crate::models::{ModelError, ModelManager, TokenCallback, Translation};

/// Translation entry point for chat rooms.
///
/// Resolves the reader's language from their profile, picks the text to
/// translate and drives the model manager.
pub struct Translator<P> {
    manager: ModelManager,
    profile: P,
}

impl<P: ProfileSource> Translator<P> {
    pub fn new(manager: ModelManager, profile: P) -> Self {
        Self { manager, profile }
    }

    pub fn manager(&self) -> &ModelManager {
        &self.manager
    }

    /// Target language from the profile, in its canonical spelling.
    pub fn target_language(&self) -> Result<&'static str, ModelError> {
        let preferred = self
            .profile
            .preferred_language()
            .filter(|lang| !lang.trim().is_empty())
            .ok_or(ModelError::LanguageNotSet)?;
        supported_language(&preferred).ok_or(ModelError::UnsupportedLanguage(preferred))
    }

    pub async fn translate_for_room(
        &self,
        explicit_text: Option<&str>,
        room_messages: &[ChatMessage],
        current_user: &str,
        on_token: Option<TokenCallback>,
    ) -> Result<Translation, ModelError> {
        let target = self.target_language()?;
        let source = select_source_text(explicit_text, room_messages, current_user);
        debug!("Translating room message to {}", target);

        let result = self
            .manager
            .ensure_and_translate(&source, target, on_token)
            .await;
        if let Err(e) = &result {
            warn!("Translation failed: {}", e);
        }
        result
    }
}
