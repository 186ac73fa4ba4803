//! Category configuration.

use serde::{Deserialize, Serialize};

/// A store category to crawl: display name plus canonical listing URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDescriptor {
    pub name: String,
    pub url: String,
}

impl CategoryDescriptor {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Truncate an ordered category list to its first `max` entries.
///
/// `max == 0` means no bound.
pub fn select_categories(categories: &[CategoryDescriptor], max: usize) -> &[CategoryDescriptor] {
    if max == 0 || max >= categories.len() {
        categories
    } else {
        &categories[..max]
    }
}
