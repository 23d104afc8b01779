use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::categories::category::{Category, CategoryInput, MatchMode, ValidationError};
use crate::categories::defaults::is_reserved_label;

/// Input that passed every check, with label trimmed and keywords deduplicated.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidCategory {
    pub label: String,
    pub color: String,
    pub keywords: Vec<String>,
    pub match_mode: MatchMode,
}

pub fn is_valid_hex_color(color: &str) -> bool {
    static HEX_COLOR: OnceLock<Regex> = OnceLock::new();
    HEX_COLOR
        .get_or_init(|| {
            Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("invalid hex color regex")
        })
        .is_match(color.trim())
}

/// Trims, drops empties and removes case-insensitive duplicates while
/// keeping the first-seen spelling and order.
pub fn dedupe_keywords<S: AsRef<str>>(keywords: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .iter()
        .map(|k| k.as_ref().trim())
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Checks run in a fixed order and stop at the first failure.
/// `editing` names the custom category being updated so it does not collide
/// with itself.
pub fn validate(
    input: &CategoryInput,
    existing_custom: &[Category],
    editing: Option<&str>,
) -> Result<ValidCategory, ValidationError> {
    let label = input.label.trim();
    if label.is_empty() {
        return Err(ValidationError::LabelRequired);
    }

    if is_reserved_label(label) {
        return Err(ValidationError::LabelIsDefault);
    }

    if !is_valid_hex_color(&input.color) {
        return Err(ValidationError::InvalidColor);
    }

    let keywords = dedupe_keywords(&input.keywords);
    if keywords.is_empty() {
        return Err(ValidationError::KeywordsRequired);
    }

    let key = label.to_lowercase();
    let taken = existing_custom
        .iter()
        .filter(|c| Some(c.id.as_str()) != editing)
        .any(|c| c.label_key() == key);
    if taken {
        return Err(ValidationError::LabelTaken);
    }

    Ok(ValidCategory {
        label: label.to_string(),
        color: input.color.trim().to_string(),
        keywords,
        match_mode: input.match_mode,
    })
}
