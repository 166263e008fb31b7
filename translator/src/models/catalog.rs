use serde::{Deserialize, Serialize};

/// Static information about a model available for download.
/// This is hardcoded and never changes at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCatalogEntry {
    /// Unique identifier, no spaces (e.g., "qwen-8b-instruct")
    pub id: String,
    /// Human-readable name
    pub display_name: String,
    pub description: String,
    /// Download URL
    pub url: String,
    /// Filename on disk
    pub filename: String,
    /// SHA-256 checksum (hex string), empty while unpinned
    pub sha256: String,
    /// Context window handed to the runtime
    pub context_length: u32,
}

/// Default model for new installs
pub const DEFAULT_MODEL_ID: &str = "qwen-8b-instruct";

/// Check if a model id exists in the catalog
pub fn is_model_in_catalog(id: &str) -> bool {
    find_model(id).is_some()
}

pub fn find_model(id: &str) -> Option<ModelCatalogEntry> {
    get_model_catalog().into_iter().find(|e| e.id == id)
}

/// Hardcoded catalog of available translation models (GGUF, Q4_K_M)
pub fn get_model_catalog() -> Vec<ModelCatalogEntry> {
    vec![
        ModelCatalogEntry {
            id: DEFAULT_MODEL_ID.into(),
            display_name: "Qwen3 8B Instruct".into(),
            description: "Powerful 8B model with thinking mode".into(),
            url: "https://huggingface.co/Qwen/Qwen3-8B-GGUF/resolve/main/Qwen3-8B-Q4_K_M.gguf"
                .into(),
            filename: "Qwen3-8B-Q4_K_M.gguf".into(),
            sha256: String::new(),
            context_length: 456,
        },
        ModelCatalogEntry {
            id: "qwen-7b-instruct".into(),
            display_name: "Qwen 2.5 7B Instruct".into(),
            description: "Efficient 7B model".into(),
            url: "https://huggingface.co/bartowski/Qwen2.5-7B-Instruct-GGUF/resolve/main/Qwen2.5-7B-Instruct-Q4_K_M.gguf"
                .into(),
            filename: "Qwen2.5-7B-Instruct-Q4_K_M.gguf".into(),
            sha256: String::new(),
            context_length: 456,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_is_in_catalog() {
        assert!(is_model_in_catalog(DEFAULT_MODEL_ID));
        assert!(!is_model_in_catalog("whisper-small"));
    }

    #[test]
    fn catalog_ids_and_filenames_are_unique() {
        let catalog = get_model_catalog();
        for (i, a) in catalog.iter().enumerate() {
            for b in &catalog[i + 1..] {
                assert_ne!(a.id, b.id);
                assert_ne!(a.filename, b.filename);
            }
        }
    }

    #[test]
    fn find_model_returns_entry() {
        let entry = find_model("qwen-7b-instruct").unwrap();
        assert_eq!(entry.filename, "Qwen2.5-7B-Instruct-Q4_K_M.gguf");
        assert_eq!(entry.context_length, 456);
        assert!(entry.url.starts_with("https://"));
    }
}
