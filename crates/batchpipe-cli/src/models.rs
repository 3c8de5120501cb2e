//! Batch-capable model registry
//!
//! Commands take a logical size (`nano`, `mini`, `full`) so cron entries do
//! not change when model snapshots do. A concrete supported model name is
//! also accepted as-is.

use tracing::warn;

/// Logical key to concrete model snapshot
pub const MODEL_MAP: &[(&str, &str)] = &[
    ("nano", "gpt-4.1-nano-2025-04-14"),
    ("mini", "gpt-4.1-mini-2025-04-14"),
    ("full", "gpt-4.1-2025-04-14"),
];

pub const DEFAULT_MODEL_KEY: &str = "nano";

/// Chat models accepted by the batch endpoint
pub const TEXT_CHAT_MODELS: &[&str] = &[
    "gpt-4.1-2025-04-14",
    "gpt-4.1-mini-2025-04-14",
    "gpt-4.1-nano-2025-04-14",
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4o-2024-05-13",
    "gpt-3.5-turbo",
    "gpt-3.5-turbo-16k",
    "gpt-4",
    "gpt-4-32k",
    "gpt-4-turbo-preview",
    "gpt-4-vision-preview",
    "gpt-4-turbo",
    "gpt-4-0125-preview",
    "gpt-3.5-turbo-1106",
    "gpt-4-0314",
    "gpt-4-turbo-2024-04-09",
    "gpt-4-32k-0314",
    "gpt-4-32k-0613",
];

/// Embedding models accepted by the batch endpoint
pub const EMBEDDING_MODELS: &[&str] = &[
    "text-embedding-3-large",
    "text-embedding-3-small",
    "text-embedding-ada-002",
];

/// Concrete model name for `key`; unknown keys fall back to `nano`
pub fn resolve(key: &str) -> &'static str {
    if let Some((_, model)) = MODEL_MAP.iter().find(|(k, _)| *k == key) {
        return *model;
    }
    if let Some(model) = TEXT_CHAT_MODELS
        .iter()
        .chain(EMBEDDING_MODELS)
        .find(|m| **m == key)
    {
        return *model;
    }

    warn!(model = key, fallback = DEFAULT_MODEL_KEY, "Unknown model key");
    MODEL_MAP[0].1
}

pub fn is_supported(model: &str) -> bool {
    TEXT_CHAT_MODELS.contains(&model) || EMBEDDING_MODELS.contains(&model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_keys() {
        assert_eq!(resolve("nano"), "gpt-4.1-nano-2025-04-14");
        assert_eq!(resolve("mini"), "gpt-4.1-mini-2025-04-14");
        assert_eq!(resolve("full"), "gpt-4.1-2025-04-14");
    }

    #[test]
    fn test_concrete_names_pass_through() {
        assert_eq!(resolve("gpt-4o-mini"), "gpt-4o-mini");
        assert_eq!(resolve("text-embedding-3-small"), "text-embedding-3-small");
    }

    #[test]
    fn test_unknown_falls_back_to_nano() {
        assert_eq!(resolve("huge"), "gpt-4.1-nano-2025-04-14");
        assert!(!is_supported("huge"));
    }

    #[test]
    fn test_every_mapped_model_is_supported() {
        assert!(MODEL_MAP.iter().all(|(_, model)| is_supported(model)));
    }
}
