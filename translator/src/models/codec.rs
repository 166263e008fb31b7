//! Prompt building and output cleanup for translation requests.

use serde::{Deserialize, Serialize};
use uniterra_llama::CHAT_CONTROL_TOKENS;

/// Slot in the user template replaced by the target language name.
pub const TARGET_LANG_PLACEHOLDER: &str = "{TARGET_LANG}";
/// Slot in the user template replaced by the text to translate.
pub const SOURCE_TEXT_PLACEHOLDER: &str = "{SOURCE_TEXT}";

pub const THINK_START: &str = "<think>";
pub const THINK_END: &str = "</think>";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional translator. Output only the translated text. Keep meaning, tone, numbers, names, emoji, and punctuation. Do not explain. If source and target language are the same, return the input unchanged.";

pub const DEFAULT_USER_TEMPLATE: &str = "Translate to {TARGET_LANG}:\n{SOURCE_TEXT}";

/// System and user prompt for one generate call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Decoded model output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub text: String,
    /// Reasoning span, empty when the model produced none.
    pub thoughts: String,
}

/// Fill the user template. The target language is substituted before the
/// source text so placeholders typed by the user are left alone.
pub fn encode(system_prompt: &str, user_template: &str, target_lang: &str, text: &str) -> Prompt {
    let user = user_template
        .replace(TARGET_LANG_PLACEHOLDER, target_lang)
        .replace(SOURCE_TEXT_PLACEHOLDER, text);
    Prompt {
        system: system_prompt.to_string(),
        user,
    }
}

/// Strip chat control tokens, split off the `<think>` span and keep only the
/// first line of what remains.
pub fn decode(raw: &str) -> Translation {
    let mut cleaned = raw.to_string();
    for token in CHAT_CONTROL_TOKENS {
        cleaned = cleaned.replace(token, "");
    }
    let cleaned = cleaned.trim();

    let (remaining, thoughts) = match split_thoughts(cleaned) {
        Some((before, thoughts, after)) => (format!("{}{}", before, after), thoughts.trim()),
        None => (cleaned.to_string(), ""),
    };

    let text = remaining
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();

    Translation {
        text: text.to_string(),
        thoughts: thoughts.to_string(),
    }
}

/// Returns (before, inside, after) when both markers are present in order.
fn split_thoughts(text: &str) -> Option<(&str, &str, &str)> {
    let start = text.find(THINK_START)?;
    let inner_start = start + THINK_START.len();
    let inner_len = text[inner_start..].find(THINK_END)?;
    let inner_end = inner_start + inner_len;
    Some((
        &text[..start],
        &text[inner_start..inner_end],
        &text[inner_end + THINK_END.len()..],
    ))
}
