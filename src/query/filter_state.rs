//! Caller-owned filter state: column → selected values.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Active selections per column. An empty list means "no constraint".
///
/// Backed by a sorted map, so two states built in different insertion
/// orders compare equal and evaluate identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterState {
    selections: BTreeMap<String, Vec<String>>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style selection.
    pub fn with<I, S>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(column, values);
        self
    }

    pub fn set<I, S>(&mut self, column: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selections
            .insert(column.into(), values.into_iter().map(Into::into).collect());
    }

    /// Add one value to a column's selection (no-op if already selected).
    pub fn toggle_on(&mut self, column: &str, value: impl Into<String>) {
        let value = value.into();
        let selected = self.selections.entry(column.to_string()).or_default();
        if !selected.contains(&value) {
            selected.push(value);
        }
    }

    pub fn toggle_off(&mut self, column: &str, value: &str) {
        if let Some(selected) = self.selections.get_mut(column) {
            selected.retain(|v| v != value);
        }
    }

    pub fn remove(&mut self, column: &str) -> Option<Vec<String>> {
        self.selections.remove(column)
    }

    pub fn get(&self, column: &str) -> &[String] {
        self.selections.get(column).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Copy of this state with `column` unconstrained.
    pub fn without(&self, column: &str) -> FilterState {
        let mut other = self.clone();
        other.selections.remove(column);
        other
    }

    /// Columns with a non-empty selection, in column-name order.
    pub fn active(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.selections
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(column, values)| (column.as_str(), values.as_slice()))
    }

    pub fn is_active(&self) -> bool {
        self.active().next().is_some()
    }

    /// Canonical serialization used as a cache key.
    ///
    /// Empty selections are dropped; values are sorted and de-duplicated, so
    /// states that select the same rows serialize identically.
    pub fn canonical_key(&self) -> String {
        let canonical: BTreeMap<&str, BTreeSet<&str>> = self
            .active()
            .map(|(column, values)| (column, values.iter().map(String::as_str).collect()))
            .collect();
        serde_json::to_string(&canonical).unwrap_or_default()
    }
}

impl<K, I> FromIterator<(K, I)> for FilterState
where
    K: Into<String>,
    I: IntoIterator,
    I::Item: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, I)>>(iter: T) -> Self {
        let mut state = FilterState::new();
        for (column, values) in iter {
            state.set(column, values);
        }
        state
    }
}
