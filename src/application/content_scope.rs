//! Content Scope
//!
//! Narrows content records to a country site or a language. When the
//! international app is switched off, nothing is filtered.

use crate::domain::entities::Localized;
use crate::domain::value_objects::CountryCode;

#[derive(Debug, Clone, Copy)]
pub struct ContentScope {
    international: bool,
}

impl ContentScope {
    pub fn new(international: bool) -> Self {
        Self { international }
    }

    pub fn is_scoped(&self) -> bool {
        self.international
    }

    /// Records linked to the site with `code`.
    pub fn filter_by_country<T, I>(&self, items: I, code: &CountryCode) -> Vec<T>
    where
        T: Localized,
        I: IntoIterator<Item = T>,
    {
        let items = items.into_iter();
        if !self.international {
            return items.collect();
        }
        items.filter(|item| item.country_codes().contains(code)).collect()
    }

    /// Records tagged with `language`.
    pub fn filter_by_language<T, I>(&self, items: I, language: &str) -> Vec<T>
    where
        T: Localized,
        I: IntoIterator<Item = T>,
    {
        let items = items.into_iter();
        if !self.international {
            return items.collect();
        }
        items
            .filter(|item| item.object_language() == Some(language))
            .collect()
    }
}

impl Default for ContentScope {
    fn default() -> Self {
        Self::new(true)
    }
}
