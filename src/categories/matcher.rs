use crate::calendar::Event;
use crate::categories::category::{Category, MatchMode};

#[derive(Debug, Clone, PartialEq)]
pub struct CategorizedEvent {
    pub event: Event,
    pub category: Category,
}

/// Orders categories alphabetically by label, ignoring case.
pub fn sort_by_label(categories: &mut [Category]) {
    categories.sort_by_key(|c| c.label.to_lowercase());
}

fn rule_matches(category: &Category, title: &str) -> bool {
    if category.keywords.is_empty() {
        return false;
    }
    let contains = |keyword: &String| title.contains(&keyword.to_lowercase());
    match category.match_mode {
        MatchMode::Any => category.keywords.iter().any(contains),
        MatchMode::All => category.keywords.iter().all(contains),
    }
}

/// First category in `sorted` whose keyword rule matches `title`, compared
/// case-insensitively as substrings. `None` means uncategorized.
pub fn match_category<'a>(title: &str, sorted: &'a [Category]) -> Option<&'a Category> {
    let title = title.to_lowercase();
    sorted.iter().find(|c| rule_matches(c, &title))
}

/// Like [`match_category`] but falls back to the uncategorized bucket.
pub fn categorize_title(title: &str, sorted: &[Category]) -> Category {
    match_category(title, sorted)
        .cloned()
        .unwrap_or_else(Category::uncategorized)
}

pub fn categorize_events(events: Vec<Event>, categories: &[Category]) -> Vec<CategorizedEvent> {
    let mut sorted = categories.to_vec();
    sort_by_label(&mut sorted);

    events
        .into_iter()
        .map(|event| CategorizedEvent {
            category: categorize_title(&event.title, &sorted),
            event,
        })
        .collect()
}

/// Event count per category label, in category order, then uncategorized.
pub fn tally(categorized: &[CategorizedEvent], categories: &[Category]) -> Vec<(String, usize)> {
    let mut sorted = categories.to_vec();
    sort_by_label(&mut sorted);
    sorted.push(Category::uncategorized());

    sorted
        .iter()
        .map(|category| {
            let count = categorized
                .iter()
                .filter(|c| c.category.id == category.id)
                .count();
            (category.label.clone(), count)
        })
        .collect()
}
