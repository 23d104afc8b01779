use std::collections::BTreeSet;

use crate::storage::kv::{KeyValueStore, StorageError};

pub const DISABLED_CALENDARS_KEY: &str = "disabled_calendars";

/// Calendars the user has hidden from the year view.
pub struct DisabledCalendars<S> {
    store: S,
}

impl<S: KeyValueStore> DisabledCalendars<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn load(&self) -> BTreeSet<String> {
        let raw = match self.store.get(DISABLED_CALENDARS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return BTreeSet::new(),
            Err(e) => {
                tracing::warn!("Failed to read disabled calendars: {}", e);
                return BTreeSet::new();
            }
        };

        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                tracing::warn!("Discarding corrupt disabled calendar list: {}", e);
                if let Err(e) = self.store.remove(DISABLED_CALENDARS_KEY) {
                    tracing::error!("Failed to clear disabled calendars: {}", e);
                }
                BTreeSet::new()
            }
        }
    }

    pub fn save(&self, ids: &BTreeSet<String>) -> Result<(), StorageError> {
        if ids.is_empty() {
            return self.store.remove(DISABLED_CALENDARS_KEY);
        }
        let list: Vec<&String> = ids.iter().collect();
        let json = serde_json::to_string(&list).unwrap_or_else(|_| "[]".to_string());
        self.store.set(DISABLED_CALENDARS_KEY, &json)
    }

    pub fn is_disabled(&self, calendar_id: &str) -> bool {
        self.load().contains(calendar_id)
    }

    /// Flips one calendar and returns whether it is now disabled.
    pub fn toggle(&self, calendar_id: &str) -> Result<bool, StorageError> {
        let mut ids = self.load();
        let disabled = if ids.remove(calendar_id) {
            false
        } else {
            ids.insert(calendar_id.to_string());
            true
        };
        self.save(&ids)?;
        tracing::info!("Calendar {} disabled={}", calendar_id, disabled);
        Ok(disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::SqliteStore;
    use std::rc::Rc;

    fn create_disabled() -> (Rc<SqliteStore>, DisabledCalendars<Rc<SqliteStore>>) {
        let store = Rc::new(SqliteStore::in_memory().unwrap());
        let disabled = DisabledCalendars::new(Rc::clone(&store));
        (store, disabled)
    }

    #[test]
    fn empty_store_has_no_disabled_calendars() {
        let (_, disabled) = create_disabled();

        assert!(disabled.load().is_empty());
    }

    #[test]
    fn duplicates_in_storage_are_collapsed() {
        let (store, disabled) = create_disabled();
        store.set(DISABLED_CALENDARS_KEY, r#"["a","b","a"]"#).unwrap();

        let ids: Vec<String> = disabled.load().into_iter().collect();

        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn saving_empty_set_removes_the_key() {
        let (store, disabled) = create_disabled();
        store.set(DISABLED_CALENDARS_KEY, r#"["a"]"#).unwrap();

        disabled.save(&BTreeSet::new()).unwrap();

        assert_eq!(store.get(DISABLED_CALENDARS_KEY).unwrap(), None);
    }

    #[test]
    fn toggle_disables_then_enables() {
        let (store, disabled) = create_disabled();

        assert!(disabled.toggle("work@group").unwrap());
        assert!(disabled.is_disabled("work@group"));
        assert_eq!(store.get(DISABLED_CALENDARS_KEY).unwrap().as_deref(), Some(r#"["work@group"]"#));

        assert!(!disabled.toggle("work@group").unwrap());
        assert!(!disabled.is_disabled("work@group"));
        assert_eq!(store.get(DISABLED_CALENDARS_KEY).unwrap(), None);
    }

    #[test]
    fn corrupt_list_is_cleared() {
        let (store, disabled) = create_disabled();
        store.set(DISABLED_CALENDARS_KEY, "not json").unwrap();

        assert!(disabled.load().is_empty());
        assert_eq!(store.get(DISABLED_CALENDARS_KEY).unwrap(), None);
    }
}
