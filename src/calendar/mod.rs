pub mod event;
pub mod calendar_type;

pub use event::{Event, EventStatus};
pub use calendar_type::{CalendarListEntry, AccessRole};

pub const PRIMARY_CALENDAR_ID: &str = "primary";
