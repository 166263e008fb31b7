//! ChatML prompt layout used by the Qwen family of models.

/// Control tokens that may leak into raw completions.
pub const CHAT_CONTROL_TOKENS: &[&str] = &[
    "<|im_start|>assistant",
    "<|im_start|>user",
    "<|im_start|>system",
    "<|im_start|>",
    "<|im_end|>",
    "<|endoftext|>",
];

/// Lay out a single system + user exchange, leaving the assistant turn open.
pub fn format_chat_prompt(system_prompt: &str, user_prompt: &str) -> String {
    format!(
        "<|im_start|>system\n{system_prompt}\n<|im_end|>\n<|im_start|>user\n{user_prompt}\n<|im_end|>\n<|im_start|>assistant\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_ends_with_open_assistant_turn() {
        let prompt = format_chat_prompt("Be literal.", "Translate to German:\nHi");
        assert!(prompt.starts_with("<|im_start|>system\nBe literal.\n<|im_end|>"));
        assert!(prompt.contains("<|im_start|>user\nTranslate to German:\nHi\n<|im_end|>"));
        assert!(prompt.ends_with("<|im_start|>assistant\n"));
    }

    #[test]
    fn specific_tokens_are_listed_before_the_bare_prefix() {
        let bare = CHAT_CONTROL_TOKENS
            .iter()
            .position(|t| *t == "<|im_start|>")
            .unwrap();
        let assistant = CHAT_CONTROL_TOKENS
            .iter()
            .position(|t| *t == "<|im_start|>assistant")
            .unwrap();
        assert!(assistant < bare);
    }
}
