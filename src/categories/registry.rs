use crate::categories::category::{Category, CategoryError, CategoryInput, CategoryResult};
use crate::categories::defaults::{
    DefaultMembership, Membership, REMOVED_DEFAULTS_KEY, is_default_id,
};
use crate::categories::matcher::sort_by_label;
use crate::categories::store::CategoryStore;
use crate::storage::kv::KeyValueStore;
use crate::sync::cloud_sync::SyncTrigger;

/// The active category set: built-in defaults that have not been removed,
/// followed by the user's custom categories.
///
/// Every confirmed change is followed by exactly one sync trigger. Failed
/// validation and no-op requests never trigger.
pub struct CategoryRegistry<S, T> {
    kv: S,
    store: CategoryStore<S>,
    membership: DefaultMembership,
    sync: T,
}

impl<S: KeyValueStore + Clone, T: SyncTrigger> CategoryRegistry<S, T> {
    pub fn new(kv: S, sync: T) -> Self {
        let membership = load_membership(&kv);
        Self {
            store: CategoryStore::new(kv.clone()),
            kv,
            membership,
            sync,
        }
    }

    pub fn categories(&self) -> Vec<Category> {
        let mut categories = self.membership.active_defaults();
        categories.extend(self.store.get_custom_categories());
        categories
    }

    /// Active categories plus the trailing uncategorized bucket.
    pub fn all_categories(&self) -> Vec<Category> {
        let mut categories = self.categories();
        categories.push(Category::uncategorized());
        categories
    }

    /// Active categories in matching order.
    pub fn sorted_categories(&self) -> Vec<Category> {
        let mut categories = self.categories();
        sort_by_label(&mut categories);
        categories
    }

    pub fn removed_defaults(&self) -> Vec<Category> {
        self.membership.removed_defaults()
    }

    pub fn add_category(&self, input: &CategoryInput) -> CategoryResult {
        let category = self.store.add_custom_category(input)?;
        self.notify();
        Ok(category)
    }

    pub fn update_category(&self, id: &str, input: &CategoryInput) -> CategoryResult {
        if is_default_id(id) {
            return Err(CategoryError::DefaultReadOnly);
        }
        let category = self.store.update_custom_category(id, input)?;
        self.notify();
        Ok(category)
    }

    /// Custom categories are deleted; defaults are only hidden. Returns
    /// whether anything changed.
    pub fn remove_category(&mut self, id: &str) -> Result<bool, CategoryError> {
        let changed = if is_default_id(id) {
            self.set_membership(id, Membership::Removed)?
        } else {
            self.store.remove_custom_category(id)?
        };

        if changed {
            self.notify();
        }
        Ok(changed)
    }

    pub fn restore_default(&mut self, id: &str) -> Result<bool, CategoryError> {
        let changed = self.set_membership(id, Membership::Active)?;
        if changed {
            self.notify();
        }
        Ok(changed)
    }

    /// Drops every custom category and restores every removed default.
    pub fn reset_to_defaults(&mut self) -> Result<(), CategoryError> {
        self.store.clear()?;
        self.membership = DefaultMembership::default();
        self.save_membership()?;
        tracing::info!("Categories reset to defaults");
        self.notify();
        Ok(())
    }

    fn set_membership(&mut self, id: &str, membership: Membership) -> Result<bool, CategoryError> {
        let previous = self.membership.clone();
        if !self.membership.set(id, membership) {
            return Ok(false);
        }

        if let Err(e) = self.save_membership() {
            self.membership = previous;
            return Err(e);
        }

        tracing::info!("Default category {} is now {:?}", id, membership);
        Ok(true)
    }

    fn save_membership(&self) -> Result<(), CategoryError> {
        let removed = self.membership.removed_ids();
        let result = if removed.is_empty() {
            self.kv.remove(REMOVED_DEFAULTS_KEY)
        } else {
            let json = serde_json::to_string(&removed).unwrap_or_else(|_| "[]".to_string());
            self.kv.set(REMOVED_DEFAULTS_KEY, &json)
        };

        result.map_err(|e| {
            tracing::error!("Failed to persist removed defaults: {}", e);
            CategoryError::Storage
        })
    }

    fn notify(&self) {
        self.sync.trigger(&self.categories());
    }
}

fn load_membership<S: KeyValueStore>(kv: &S) -> DefaultMembership {
    let raw = match kv.get(REMOVED_DEFAULTS_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return DefaultMembership::default(),
        Err(e) => {
            tracing::error!("Failed to read removed defaults: {}", e);
            return DefaultMembership::default();
        }
    };

    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(ids) => DefaultMembership::with_removed(ids.iter().map(String::as_str)),
        Err(e) => {
            tracing::warn!("Discarding corrupt removed defaults: {}", e);
            if let Err(e) = kv.remove(REMOVED_DEFAULTS_KEY) {
                tracing::error!("Failed to clear removed defaults: {}", e);
            }
            DefaultMembership::default()
        }
    }
}
