//! Utility functions and helpers

use regex::Regex;
use serde::{Deserialize, Deserializer};

/// Regex for validating question variable paths (dot-separated segments).
/// Each segment starts with a letter or underscore, followed by letters,
/// numbers, underscores, or hyphens.
pub static VARIABLE_PATH_REGEX: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_-]*(\.[a-zA-Z_][a-zA-Z0-9_-]*)*$").unwrap()
});

/// Deserialize a boolean that older API clients send as `"true"` / `"false"`.
pub fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        String(String),
    }

    match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(value) => Ok(value),
        BoolOrString::String(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid boolean: {}", other))),
        },
    }
}

/// Same as [`lenient_bool`] for optional fields.
pub fn lenient_bool_opt<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "lenient_bool")] bool);

    Option::<Wrapper>::deserialize(deserializer).map(|opt| opt.map(|Wrapper(value)| value))
}
