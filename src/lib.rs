pub mod calendar;
pub mod categories;
pub mod storage;
pub mod sync;

pub use calendar::{CalendarListEntry, Event, EventStatus};
pub use categories::{Category, CategoryRegistry, CategoryStore};
