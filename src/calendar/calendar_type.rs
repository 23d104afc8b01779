use serde::{Deserialize, Serialize};

/// A calendar the signed-in user can read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarListEntry {
    pub id: String,
    pub summary: String,
    pub access_role: AccessRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessRole {
    Owner,
    Writer,
    Reader,
    FreeBusyReader,
}

impl AccessRole {
    pub fn from_google(role: Option<&str>) -> Self {
        match role {
            Some("owner") => AccessRole::Owner,
            Some("writer") => AccessRole::Writer,
            Some("freeBusyReader") => AccessRole::FreeBusyReader,
            _ => AccessRole::Reader,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessRole::Owner => "owner",
            AccessRole::Writer => "writer",
            AccessRole::Reader => "reader",
            AccessRole::FreeBusyReader => "freeBusyReader",
        }
    }
}
