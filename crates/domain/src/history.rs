//! Property history retention policy.

use std::collections::BTreeSet;

use chrono::Duration;

use crate::property::PropertyScope;
use crate::time::Timestamp;

/// Default number of prior value sets kept per property.
pub const DEFAULT_MAX_ENTRIES: usize = 10;

/// Which scopes keep history and how much of it.
///
/// `max_entries` and `max_age` are independent bounds; an entry is pruned as
/// soon as it violates either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPolicy {
    pub scopes: BTreeSet<PropertyScope>,
    pub max_entries: Option<usize>,
    pub max_age: Option<Duration>,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            scopes: PropertyScope::ALL.into_iter().collect(),
            max_entries: Some(DEFAULT_MAX_ENTRIES),
            max_age: None,
        }
    }
}

impl HistoryPolicy {
    /// A policy recording no history at all.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            scopes: BTreeSet::new(),
            max_entries: None,
            max_age: None,
        }
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = PropertyScope>) -> Self {
        self.scopes = scopes.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries;
        self
    }

    #[must_use]
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    #[must_use]
    pub fn is_enabled(&self, scope: PropertyScope) -> bool {
        self.scopes.contains(&scope)
    }

    /// Entries recorded before the returned instant are expired.
    #[must_use]
    pub fn cutoff(&self, now: Timestamp) -> Option<Timestamp> {
        self.max_age.map(|age| now - age)
    }
}
