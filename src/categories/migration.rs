use serde::Deserialize;
use serde_json::Value;

use crate::categories::category::{CURRENT_SCHEMA_VERSION, Category};

/// Version implied by a bare array, the shape written before payloads were versioned.
pub const LEGACY_SCHEMA_VERSION: u32 = 0;

/// Any shape the `categories` key has ever held.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawPayload {
    Legacy(Vec<Value>),
    Versioned {
        version: u32,
        #[serde(default)]
        categories: Vec<Value>,
    },
}

impl RawPayload {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn version(&self) -> u32 {
        match self {
            RawPayload::Legacy(_) => LEGACY_SCHEMA_VERSION,
            RawPayload::Versioned { version, .. } => *version,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Migrated {
    pub categories: Vec<Category>,
    /// Stored schema was older than the current one.
    pub upgraded: bool,
    /// Entries that could not be decoded as a category.
    pub dropped: usize,
}

impl Migrated {
    pub fn needs_write_back(&self) -> bool {
        self.upgraded || self.dropped > 0
    }
}

pub fn migrate(raw: RawPayload) -> Migrated {
    let version = raw.version();
    if version > CURRENT_SCHEMA_VERSION {
        tracing::warn!(
            "Stored categories use schema {} (newer than {}); reading best-effort",
            version, CURRENT_SCHEMA_VERSION
        );
    }

    let entries = match raw {
        RawPayload::Legacy(entries) => entries,
        RawPayload::Versioned { categories, .. } => categories,
    };

    let total = entries.len();
    let categories: Vec<Category> = entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<Category>(entry) {
            Ok(category) => Some(category),
            Err(e) => {
                tracing::warn!("Dropping undecodable stored category: {}", e);
                None
            }
        })
        .collect();

    Migrated {
        dropped: total - categories.len(),
        categories,
        upgraded: version < CURRENT_SCHEMA_VERSION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ENTRY: &str = r##"{"id":"c1","label":"Books","color":"#112233","keywords":["novel"],"matchMode":"any","isDefault":false,"createdAt":"2024-05-01T10:00:00Z","updatedAt":"2024-05-01T10:00:00Z"}"##;

    #[test]
    fn bare_array_is_legacy_and_upgraded() {
        let raw = RawPayload::parse(&format!("[{}]", ENTRY)).unwrap();

        assert_eq!(raw.version(), LEGACY_SCHEMA_VERSION);
        let migrated = migrate(raw);

        assert!(migrated.upgraded);
        assert!(migrated.needs_write_back());
        assert_eq!(migrated.categories[0].label, "Books");
    }

    #[test]
    fn current_payload_needs_no_write_back() {
        let raw = RawPayload::parse(&format!(r#"{{"version":1,"categories":[{}]}}"#, ENTRY)).unwrap();

        let migrated = migrate(raw);

        assert!(!migrated.needs_write_back());
        assert_eq!(migrated.categories.len(), 1);
    }

    #[test]
    fn undecodable_entries_are_dropped_and_counted() {
        let raw = RawPayload::parse(&format!(r#"{{"version":1,"categories":[{},{{"label":7}}]}}"#, ENTRY))
            .unwrap();

        let migrated = migrate(raw);

        assert_eq!(migrated.dropped, 1);
        assert!(migrated.needs_write_back());
    }

    #[test]
    fn object_without_version_is_not_a_payload() {
        assert!(RawPayload::parse(r#"{"categories":[]}"#).is_err());
        assert!(RawPayload::parse("42").is_err());
        assert!(RawPayload::parse("{not json").is_err());
    }

    #[test]
    fn newer_schema_is_read_without_upgrade() {
        let raw = RawPayload::parse(&format!(r#"{{"version":3,"categories":[{}]}}"#, ENTRY)).unwrap();

        let migrated = migrate(raw);

        assert!(!migrated.upgraded);
        assert_eq!(migrated.categories.len(), 1);
    }
}
