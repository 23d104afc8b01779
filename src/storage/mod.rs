pub mod config;
pub mod disabled_calendars;
pub mod kv;

pub use disabled_calendars::DisabledCalendars;
pub use kv::{KeyValueStore, SqliteStore, StorageError};
