use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chrono::Utc;
use uuid::Uuid;

use crate::categories::category::{
    Category, CategoryError, CategoryInput, CategoryResult, StoredCategoriesPayload,
};
use crate::categories::defaults::{is_reserved_id, is_reserved_label};
use crate::categories::migration::{RawPayload, migrate};
use crate::categories::validation::{dedupe_keywords, validate};
use crate::storage::kv::{KeyValueStore, StorageError};

pub const CATEGORIES_KEY: &str = "categories";

/// Persisted user-defined categories.
///
/// Reads never fail: a missing key is an empty list, a corrupt value is
/// cleared, and legacy or unsanitary data is rewritten in the current
/// schema as soon as it is read.
pub struct CategoryStore<S> {
    store: S,
}

impl<S: KeyValueStore> CategoryStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn get_custom_categories(&self) -> Vec<Category> {
        let raw = match self.store.get(CATEGORIES_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return vec![],
            Err(e) => {
                tracing::error!("Failed to read stored categories: {}", e);
                return vec![];
            }
        };

        let payload = match RawPayload::parse(&raw) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Discarding corrupt stored categories: {}", e);
                if let Err(e) = self.store.remove(CATEGORIES_KEY) {
                    tracing::error!("Failed to clear corrupt categories: {}", e);
                }
                return vec![];
            }
        };

        let from_version = payload.version();
        let migrated = migrate(payload);
        if migrated.upgraded {
            tracing::info!("Migrating stored categories from schema {}", from_version);
        }

        let categories = sanitize(migrated.categories.clone());
        let needs_write_back = migrated.needs_write_back() || categories != migrated.categories;

        if needs_write_back {
            if let Err(e) = self.persist(&categories) {
                tracing::error!("Failed to write back cleaned categories: {}", e);
            }
        }

        categories
    }

    pub fn add_custom_category(&self, input: &CategoryInput) -> CategoryResult {
        let mut categories = self.get_custom_categories();
        let valid = validate(input, &categories, None)?;

        let now = Utc::now();
        let category = Category {
            id: Uuid::new_v4().to_string(),
            label: valid.label,
            color: valid.color,
            keywords: valid.keywords,
            match_mode: valid.match_mode,
            is_default: false,
            created_at: now,
            updated_at: now,
        };

        categories.push(category.clone());
        self.save(&categories)?;

        tracing::info!("Added category {} ({})", category.label, category.id);
        Ok(category)
    }

    pub fn update_custom_category(&self, id: &str, input: &CategoryInput) -> CategoryResult {
        let mut categories = self.get_custom_categories();
        let index = categories
            .iter()
            .position(|c| c.id == id)
            .ok_or(CategoryError::Missing)?;

        let valid = validate(input, &categories, Some(id))?;

        let category = &mut categories[index];
        category.label = valid.label;
        category.color = valid.color;
        category.keywords = valid.keywords;
        category.match_mode = valid.match_mode;
        category.updated_at = Utc::now();
        let updated = category.clone();

        self.save(&categories)?;

        tracing::info!("Updated category {} ({})", updated.label, updated.id);
        Ok(updated)
    }

    /// Returns whether a category was deleted.
    pub fn remove_custom_category(&self, id: &str) -> Result<bool, CategoryError> {
        let mut categories = self.get_custom_categories();
        let before = categories.len();
        categories.retain(|c| c.id != id);

        if categories.len() == before {
            return Ok(false);
        }

        self.save(&categories)?;
        tracing::info!("Removed category {}", id);
        Ok(true)
    }

    pub fn clear(&self) -> Result<(), CategoryError> {
        self.store.remove(CATEGORIES_KEY).map_err(|e| {
            tracing::error!("Failed to clear categories: {}", e);
            CategoryError::Storage
        })
    }

    fn save(&self, categories: &[Category]) -> Result<(), CategoryError> {
        self.persist(categories).map_err(|e| {
            tracing::error!("Failed to persist categories: {}", e);
            CategoryError::Storage
        })
    }

    fn persist(&self, categories: &[Category]) -> Result<(), StorageError> {
        let payload = StoredCategoriesPayload::new(categories.to_vec());
        let json = serde_json::to_string(&payload).unwrap_or_else(|_| "[]".to_string());
        self.store.set(CATEGORIES_KEY, &json)
    }
}

/// Re-applies the write-time rules to stored entries, then keeps only the
/// most recently updated entry per label. Survivors keep their stored order.
pub fn sanitize(categories: Vec<Category>) -> Vec<Category> {
    let categories: Vec<Category> = categories.into_iter().filter_map(clean_entry).collect();

    let mut winners: HashMap<String, usize> = HashMap::new();
    for (index, category) in categories.iter().enumerate() {
        match winners.entry(category.label_key()) {
            Entry::Vacant(slot) => {
                slot.insert(index);
            }
            Entry::Occupied(mut slot) => {
                if category.updated_at > categories[*slot.get()].updated_at {
                    slot.insert(index);
                }
            }
        }
    }

    categories
        .into_iter()
        .enumerate()
        .filter(|(index, category)| winners.get(&category.label_key()) == Some(index))
        .map(|(_, category)| category)
        .collect()
}

/// Drops entries that collide with a built-in id or label, or that have no
/// usable keyword left after trimming and deduplication.
fn clean_entry(mut category: Category) -> Option<Category> {
    if is_reserved_id(&category.id) || is_reserved_label(&category.label) {
        tracing::warn!(
            "Dropping custom category {} ({}) shadowing a built-in",
            category.label, category.id
        );
        return None;
    }

    category.keywords = dedupe_keywords(&category.keywords);
    if category.keywords.is_empty() {
        tracing::warn!("Dropping custom category {} with no keywords", category.label);
        return None;
    }

    category.is_default = false;
    Some(category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::category::{CURRENT_SCHEMA_VERSION, MatchMode, ValidationError};
    use crate::categories::defaults::default_categories;
    use crate::categories::matcher::{categorize_title, sort_by_label};
    use crate::storage::kv::SqliteStore;
    use chrono::{DateTime, TimeZone};
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    fn create_store() -> (Rc<SqliteStore>, CategoryStore<Rc<SqliteStore>>) {
        let kv = Rc::new(SqliteStore::in_memory().unwrap());
        (Rc::clone(&kv), CategoryStore::new(kv))
    }

    fn stored(id: &str, label: &str, updated_secs: i64) -> Category {
        Category {
            id: id.to_string(),
            label: label.to_string(),
            color: "#123456".to_string(),
            keywords: vec!["kw".to_string()],
            match_mode: MatchMode::Any,
            is_default: false,
            created_at: DateTime::<Utc>::default(),
            updated_at: Utc.timestamp_opt(updated_secs, 0).unwrap(),
        }
    }

    fn raw_payload(kv: &SqliteStore) -> StoredCategoriesPayload {
        serde_json::from_str(&kv.get(CATEGORIES_KEY).unwrap().unwrap()).unwrap()
    }

    #[test]
    fn empty_store_has_no_custom_categories() {
        let (_, store) = create_store();

        assert!(store.get_custom_categories().is_empty());
    }

    #[test]
    fn corrupt_payload_is_cleared_and_reads_empty() {
        let (kv, store) = create_store();
        kv.set(CATEGORIES_KEY, "{definitely not json").unwrap();

        assert!(store.get_custom_categories().is_empty());
        assert_eq!(kv.get(CATEGORIES_KEY).unwrap(), None);
    }

    #[test]
    fn legacy_array_is_rewritten_as_versioned_payload() {
        let (kv, store) = create_store();
        let legacy = serde_json::to_string(&vec![stored("c1", "Books", 10)]).unwrap();
        kv.set(CATEGORIES_KEY, &legacy).unwrap();

        let categories = store.get_custom_categories();

        assert_eq!(categories, vec![stored("c1", "Books", 10)]);
        let payload = raw_payload(&kv);
        assert_eq!(payload.version, CURRENT_SCHEMA_VERSION);
        assert_eq!(payload.categories, categories);
    }

    #[test]
    fn entries_shadowing_defaults_are_dropped_and_written_back() {
        let (kv, store) = create_store();
        let payload = StoredCategoriesPayload::new(vec![
            stored("c1", "work", 10),
            stored("c2", "Books", 10),
        ]);
        kv.set(CATEGORIES_KEY, &serde_json::to_string(&payload).unwrap()).unwrap();

        let categories = store.get_custom_categories();

        assert_eq!(categories, vec![stored("c2", "Books", 10)]);
        assert_eq!(raw_payload(&kv).categories.len(), 1);
    }

    #[test]
    fn stored_keywords_are_cleaned_and_written_back() {
        let (kv, store) = create_store();
        let mut aardvark = stored("c1", "Aardvark", 10);
        aardvark.keywords = vec!["".to_string(), "zoo".to_string(), " Zoo ".to_string()];
        let mut hollow = stored("c2", "Hollow", 10);
        hollow.keywords = vec!["  ".to_string()];
        kv.set(CATEGORIES_KEY, &serde_json::to_string(&vec![aardvark, hollow]).unwrap()).unwrap();

        let categories = store.get_custom_categories();

        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].keywords, vec!["zoo".to_string()]);
        assert_eq!(raw_payload(&kv).categories, categories);
    }

    #[test]
    fn entry_with_blank_keyword_no_longer_claims_every_title() {
        let (kv, store) = create_store();
        let mut aardvark = stored("c1", "Aardvark", 10);
        aardvark.keywords = vec!["".to_string(), "zoo".to_string()];
        kv.set(CATEGORIES_KEY, &serde_json::to_string(&vec![aardvark]).unwrap()).unwrap();

        let mut categories = default_categories();
        categories.extend(store.get_custom_categories());
        sort_by_label(&mut categories);

        assert_eq!(categorize_title("Team standup", &categories).label, "Work");
    }

    #[test]
    fn entries_reusing_built_in_ids_or_fallback_label_are_dropped() {
        let (kv, store) = create_store();
        let payload = StoredCategoriesPayload::new(vec![
            stored("default-work", "Books", 10),
            stored("uncategorized", "Chess", 10),
            stored("c3", "Uncategorized", 10),
            stored("c4", "Garden", 10),
        ]);
        kv.set(CATEGORIES_KEY, &serde_json::to_string(&payload).unwrap()).unwrap();

        let ids: Vec<String> = store.get_custom_categories().into_iter().map(|c| c.id).collect();

        assert_eq!(ids, vec!["c4".to_string()]);
        assert_eq!(raw_payload(&kv).categories.len(), 1);
    }

    #[test]
    fn duplicate_labels_keep_most_recently_updated() {
        let cleaned = sanitize(vec![
            stored("old", "Books", 10),
            stored("other", "Chess", 5),
            stored("new", "BOOKS", 20),
            stored("older", "books", 1),
        ]);

        let ids: Vec<&str> = cleaned.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["other", "new"]);
    }

    #[test]
    fn clean_payload_is_not_rewritten() {
        let (kv, store) = create_store();
        let raw = serde_json::to_string(&StoredCategoriesPayload::new(vec![stored("c1", "Books", 10)]))
            .unwrap();
        kv.set(CATEGORIES_KEY, &raw).unwrap();

        store.get_custom_categories();

        assert_eq!(kv.get(CATEGORIES_KEY).unwrap(), Some(raw));
    }

    #[test]
    fn add_persists_new_category() {
        let (kv, store) = create_store();
        let input = CategoryInput::new("  Book club ", "#a1b2c3", &["book", "reading"])
            .with_match_mode(MatchMode::All);

        let category = store.add_custom_category(&input).unwrap();

        assert_eq!(category.label, "Book club");
        assert_eq!(category.match_mode, MatchMode::All);
        assert!(!category.is_default);
        assert_eq!(category.created_at, category.updated_at);
        assert_eq!(raw_payload(&kv).categories, vec![category]);
    }

    #[test]
    fn add_with_default_label_fails_and_persists_nothing() {
        let (kv, store) = create_store();
        let input = CategoryInput::new("Work", "#a1b2c3", &["office"]);

        let result = store.add_custom_category(&input);

        assert_eq!(result, Err(ValidationError::LabelIsDefault.into()));
        assert_eq!(kv.get(CATEGORIES_KEY).unwrap(), None);
    }

    #[test]
    fn add_deduplicates_keywords() {
        let (_, store) = create_store();
        let input = CategoryInput::new("Trips", "#a1b2c3", &["Flight", "flight", "hotel"]);

        let category = store.add_custom_category(&input).unwrap();

        assert_eq!(category.keywords, vec!["Flight".to_string(), "hotel".to_string()]);
    }

    #[test]
    fn add_rejects_existing_custom_label() {
        let (_, store) = create_store();
        store.add_custom_category(&CategoryInput::new("Books", "#fff", &["novel"])).unwrap();

        let result = store.add_custom_category(&CategoryInput::new("BOOKS", "#000", &["poem"]));

        assert_eq!(result, Err(ValidationError::LabelTaken.into()));
        assert_eq!(store.get_custom_categories().len(), 1);
    }

    #[test]
    fn update_rewrites_fields_and_timestamp() {
        let (kv, store) = create_store();
        let payload = StoredCategoriesPayload::new(vec![stored("c1", "Books", 10)]);
        kv.set(CATEGORIES_KEY, &serde_json::to_string(&payload).unwrap()).unwrap();

        let updated = store
            .update_custom_category("c1", &CategoryInput::new("Books", "#000000", &["novel", "Novel"]))
            .unwrap();

        assert_eq!(updated.color, "#000000");
        assert_eq!(updated.keywords, vec!["novel".to_string()]);
        assert!(updated.updated_at > Utc.timestamp_opt(10, 0).unwrap());
        assert_eq!(store.get_custom_categories(), vec![updated]);
    }

    #[test]
    fn update_of_unknown_id_reports_missing() {
        let (_, store) = create_store();

        let result = store.update_custom_category("gone", &CategoryInput::new("X", "#fff", &["x"]));

        assert_eq!(result, Err(CategoryError::Missing));
    }

    #[test]
    fn update_cannot_take_another_custom_label() {
        let (_, store) = create_store();
        let books = store.add_custom_category(&CategoryInput::new("Books", "#fff", &["novel"])).unwrap();
        store.add_custom_category(&CategoryInput::new("Chess", "#fff", &["chess"])).unwrap();

        let result = store.update_custom_category(&books.id, &CategoryInput::new("chess", "#fff", &["x"]));

        assert_eq!(result, Err(ValidationError::LabelTaken.into()));
    }

    #[test]
    fn remove_deletes_permanently_and_ignores_unknown_ids() {
        let (_, store) = create_store();
        let books = store.add_custom_category(&CategoryInput::new("Books", "#fff", &["novel"])).unwrap();

        assert_eq!(store.remove_custom_category("unknown"), Ok(false));
        assert_eq!(store.remove_custom_category(&books.id), Ok(true));
        assert!(store.get_custom_categories().is_empty());
    }
}
