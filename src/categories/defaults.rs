use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::categories::category::{Category, MatchMode, UNCATEGORIZED_ID, UNCATEGORIZED_LABEL};

pub const REMOVED_DEFAULTS_KEY: &str = "removed_default_categories";

struct DefaultDefinition {
    id: &'static str,
    label: &'static str,
    color: &'static str,
    keywords: &'static [&'static str],
}

const DEFAULTS: [DefaultDefinition; 5] = [
    DefaultDefinition {
        id: "default-work",
        label: "Work",
        color: "#4285f4",
        keywords: &["meeting", "standup", "sync", "1:1", "review", "interview"],
    },
    DefaultDefinition {
        id: "default-travel",
        label: "Travel",
        color: "#f4511e",
        keywords: &["flight", "hotel", "trip", "airport", "train"],
    },
    DefaultDefinition {
        id: "default-health",
        label: "Health",
        color: "#0b8043",
        keywords: &["doctor", "dentist", "gym", "workout", "therapy", "yoga"],
    },
    DefaultDefinition {
        id: "default-social",
        label: "Social",
        color: "#8e24aa",
        keywords: &["dinner", "party", "drinks", "wedding", "concert"],
    },
    DefaultDefinition {
        id: "default-family",
        label: "Family",
        color: "#f6bf26",
        keywords: &["birthday", "mom", "dad", "kids", "family"],
    },
];

/// The built-in categories, in table order.
pub fn default_categories() -> Vec<Category> {
    DEFAULTS
        .iter()
        .map(|d| Category {
            id: d.id.to_string(),
            label: d.label.to_string(),
            color: d.color.to_string(),
            keywords: d.keywords.iter().map(|k| k.to_string()).collect(),
            match_mode: MatchMode::Any,
            is_default: true,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
        })
        .collect()
}

pub fn is_default_id(id: &str) -> bool {
    DEFAULTS.iter().any(|d| d.id == id)
}

pub fn is_default_label(label: &str) -> bool {
    let key = label.trim().to_lowercase();
    DEFAULTS.iter().any(|d| d.label.to_lowercase() == key)
}

/// Labels no custom category may take: the built-ins and the fallback bucket.
pub fn is_reserved_label(label: &str) -> bool {
    is_default_label(label) || label.trim().eq_ignore_ascii_case(UNCATEGORIZED_LABEL)
}

pub fn is_reserved_id(id: &str) -> bool {
    is_default_id(id) || id == UNCATEGORIZED_ID
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Active,
    Removed,
}

/// Active/removed state of each built-in category. The definitions
/// themselves never change; only membership toggles.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultMembership {
    states: BTreeMap<&'static str, Membership>,
}

impl Default for DefaultMembership {
    fn default() -> Self {
        Self {
            states: DEFAULTS.iter().map(|d| (d.id, Membership::Active)).collect(),
        }
    }
}

impl DefaultMembership {
    /// Unknown ids are ignored.
    pub fn with_removed<'a>(removed: impl IntoIterator<Item = &'a str>) -> Self {
        let mut membership = Self::default();
        for id in removed {
            membership.set(id, Membership::Removed);
        }
        membership
    }

    pub fn state(&self, id: &str) -> Option<Membership> {
        self.states.get(id).copied()
    }

    /// Returns true when the state actually changed.
    pub fn set(&mut self, id: &str, membership: Membership) -> bool {
        match self.states.get_mut(id) {
            Some(state) if *state != membership => {
                *state = membership;
                true
            }
            _ => false,
        }
    }

    pub fn removed_ids(&self) -> Vec<String> {
        self.states
            .iter()
            .filter(|(_, state)| **state == Membership::Removed)
            .map(|(id, _)| id.to_string())
            .collect()
    }

    pub fn active_defaults(&self) -> Vec<Category> {
        default_categories()
            .into_iter()
            .filter(|c| self.state(&c.id) == Some(Membership::Active))
            .collect()
    }

    pub fn removed_defaults(&self) -> Vec<Category> {
        default_categories()
            .into_iter()
            .filter(|c| self.state(&c.id) == Some(Membership::Removed))
            .collect()
    }
}
