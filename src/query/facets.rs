//! Facet option resolver (dependent filtering).
//!
//! A column's options are counted under every *other* active filter, so
//! selecting a value in one column reshapes the choices offered in all the
//! others, and symmetrically back.

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::index::ColumnIndex;

/// A selectable value for a column plus its post-filter row count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetOption {
    pub value: String,
    pub label: String,
    pub count: u64,
}

/// Options for `index` restricted to `scope`.
///
/// `scope` is the matching set of the other filters, or `None` when no other
/// filter is active (counts are then the full set sizes). Zero-count values
/// are omitted, except the column's own `selected` values that are still in
/// its domain when `keep_selected` is set; those stay with count 0.
pub fn resolve_options(
    index: &ColumnIndex,
    scope: Option<&RoaringBitmap>,
    selected: &[String],
    keep_selected: bool,
) -> Vec<FacetOption> {
    let domain = index.facet_domain();
    let mut options = Vec::with_capacity(domain.len());

    for slot in domain {
        let count = match scope {
            None => slot.positions.len(),
            Some(scope) => slot.positions.intersection_len(scope),
        };
        let retain = count > 0
            || (keep_selected && selected.iter().any(|s| s.as_str() == slot.value));
        if retain {
            options.push(FacetOption {
                value: slot.value.to_string(),
                label: slot.label,
                count,
            });
        }
    }
    options
}
