use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CURRENT_SCHEMA_VERSION: u32 = 1;
pub const UNCATEGORIZED_ID: &str = "uncategorized";
pub const UNCATEGORIZED_LABEL: &str = "Uncategorized";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub label: String,
    pub color: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Any,
    All,
}

impl Category {
    /// Fallback bucket for events no category claims.
    pub fn uncategorized() -> Self {
        Self {
            id: UNCATEGORIZED_ID.to_string(),
            label: UNCATEGORIZED_LABEL.to_string(),
            color: "#9aa0a6".to_string(),
            keywords: vec![],
            match_mode: MatchMode::Any,
            is_default: true,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
        }
    }

    pub fn is_uncategorized(&self) -> bool {
        self.id == UNCATEGORIZED_ID
    }

    pub fn label_key(&self) -> String {
        self.label.trim().to_lowercase()
    }
}

/// User-supplied fields for creating or editing a category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryInput {
    pub label: String,
    pub color: String,
    pub keywords: Vec<String>,
    pub match_mode: MatchMode,
}

impl CategoryInput {
    pub fn new(label: &str, color: &str, keywords: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            color: color.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            match_mode: MatchMode::Any,
        }
    }

    pub fn with_match_mode(mut self, match_mode: MatchMode) -> Self {
        self.match_mode = match_mode;
        self
    }
}

/// Persisted shape of the custom category list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCategoriesPayload {
    pub version: u32,
    pub categories: Vec<Category>,
}

impl StoredCategoriesPayload {
    pub fn new(categories: Vec<Category>) -> Self {
        Self {
            version: CURRENT_SCHEMA_VERSION,
            categories,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Name is required.")]
    LabelRequired,
    #[error("Name already exists as a default category.")]
    LabelIsDefault,
    #[error("Pick a valid color.")]
    InvalidColor,
    #[error("Add at least one keyword.")]
    KeywordsRequired,
    #[error("Name already exists.")]
    LabelTaken,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CategoryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Category no longer exists.")]
    Missing,
    #[error("Default categories cannot be edited.")]
    DefaultReadOnly,
    #[error("Could not save categories.")]
    Storage,
}

/// Outcome of every category mutation; failures are data for inline feedback.
pub type CategoryResult = Result<Category, CategoryError>;
