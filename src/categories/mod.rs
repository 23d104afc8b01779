pub mod category;
pub mod defaults;
pub mod matcher;
pub mod migration;
pub mod registry;
pub mod store;
pub mod validation;

pub use category::{
    Category, CategoryError, CategoryInput, CategoryResult, MatchMode, StoredCategoriesPayload,
    ValidationError,
};
pub use matcher::{CategorizedEvent, categorize_events, match_category};
pub use registry::CategoryRegistry;
pub use store::CategoryStore;
