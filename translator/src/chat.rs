//! Boundary types for the chat and profile collaborators.
//!
//! The message store and user profiles live elsewhere; translation only needs
//! a snapshot of a room's messages and the reader's preferred language.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Text used when there is nothing to translate yet.
pub const SAMPLE_TEXT: &str = "Hey, can you meet at 3pm?";

/// Languages a user can pick as their translation target.
pub const AVAILABLE_LANGUAGES: [&str; 20] = [
    "English",
    "Spanish",
    "French",
    "German",
    "Italian",
    "Portuguese",
    "Russian",
    "Chinese",
    "Japanese",
    "Korean",
    "Arabic",
    "Hindi",
    "Dutch",
    "Polish",
    "Turkish",
    "Swedish",
    "Norwegian",
    "Danish",
    "Finnish",
    "Greek",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub timestamp: SystemTime,
    /// Sender's user id
    pub sender: String,
    pub room_id: String,
    /// Detected source language, if known
    #[serde(default)]
    pub language: Option<String>,
}

/// Snapshot access to a room's message subscription.
pub trait MessageFeed {
    fn messages(&self, room_id: &str) -> Vec<ChatMessage>;
}

/// The signed-in user's profile.
pub trait ProfileSource {
    fn preferred_language(&self) -> Option<String>;
}

/// Canonical spelling of `name` if it is a supported language.
pub fn supported_language(name: &str) -> Option<&'static str> {
    let name = name.trim();
    AVAILABLE_LANGUAGES
        .iter()
        .copied()
        .find(|lang| lang.eq_ignore_ascii_case(name))
}

pub fn is_supported_language(name: &str) -> bool {
    supported_language(name).is_some()
}

/// Pick what to translate: explicit text first, then the latest message from
/// someone else, then [`SAMPLE_TEXT`].
pub fn select_source_text(
    explicit: Option<&str>,
    messages: &[ChatMessage],
    current_user: &str,
) -> String {
    if let Some(text) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return text.to_string();
    }

    messages
        .iter()
        .filter(|m| m.sender != current_user && !m.text.trim().is_empty())
        .max_by_key(|m| m.timestamp)
        .map(|m| m.text.clone())
        .unwrap_or_else(|| SAMPLE_TEXT.to_string())
}
