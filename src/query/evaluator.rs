//! Filter evaluator: ordered set intersection over column indexes.
//!
//! Algorithm:
//! 1. Drop columns with empty selections.
//! 2. No active columns → every position `[0, row_count)`.
//! 3. Order the rest by selectivity (selected values / facet cardinality),
//!    most selective first; ties by column name.
//! 4. Union the first column's selected value sets.
//! 5. For each next column, union its value sets and intersect with the
//!    running result, iterating the smaller side.
//! 6. Stop as soon as the running result is empty.

use std::collections::BTreeSet;

use roaring::RoaringBitmap;

use crate::index::{ColumnIndex, ColumnIndexer};
use crate::query::filter_state::FilterState;
use crate::query::positions::{all_positions, intersect_smaller_first, union_all};

/// One active column in evaluation order.
#[derive(Debug, Clone)]
pub struct PlannedColumn<'a> {
    pub column: &'a str,
    pub selectivity: f64,
    pub values: BTreeSet<&'a str>,
    index: &'a ColumnIndex,
}

/// How a filter state will be evaluated.
#[derive(Debug, Clone)]
pub enum Plan<'a> {
    /// No active constraint: every position matches.
    All,
    /// An active column has no index; nothing can match.
    UnknownColumn(&'a str),
    /// Active columns, most selective first.
    Intersect(Vec<PlannedColumn<'a>>),
}

impl<'a> Plan<'a> {
    pub fn build(indexer: &'a ColumnIndexer, state: &'a FilterState) -> Plan<'a> {
        let mut steps = Vec::new();
        for (column, selected) in state.active() {
            let Some(index) = indexer.get(column) else {
                tracing::debug!(column, "Filter references a column with no index");
                return Plan::UnknownColumn(column);
            };
            let values: BTreeSet<&str> = selected.iter().map(String::as_str).collect();
            let cardinality = index.facet_cardinality();
            let selectivity = if cardinality == 0 {
                0.0
            } else {
                values.len() as f64 / cardinality as f64
            };
            steps.push(PlannedColumn {
                column,
                selectivity,
                values,
                index,
            });
        }

        if steps.is_empty() {
            return Plan::All;
        }
        steps.sort_by(|a, b| {
            a.selectivity
                .total_cmp(&b.selectivity)
                .then_with(|| a.column.cmp(b.column))
        });
        Plan::Intersect(steps)
    }

    /// Column names in evaluation order (empty for `All` / `UnknownColumn`).
    pub fn order(&self) -> Vec<&'a str> {
        match self {
            Plan::Intersect(steps) => steps.iter().map(|s| s.column).collect(),
            _ => Vec::new(),
        }
    }
}

impl PlannedColumn<'_> {
    /// Union of the position sets of this column's selected values.
    fn candidates(&self) -> RoaringBitmap {
        union_all(self.values.iter().filter_map(|v| self.index.positions(v)))
    }
}

/// Positions matching every active constraint of `state`.
pub fn matching_positions(
    indexer: &ColumnIndexer,
    row_count: u32,
    state: &FilterState,
) -> RoaringBitmap {
    match Plan::build(indexer, state) {
        Plan::All => all_positions(row_count),
        Plan::UnknownColumn(_) => RoaringBitmap::new(),
        Plan::Intersect(steps) => execute(&steps),
    }
}

fn execute(steps: &[PlannedColumn<'_>]) -> RoaringBitmap {
    let mut running: Option<RoaringBitmap> = None;
    for (evaluated, step) in steps.iter().enumerate() {
        let candidates = step.candidates();
        let narrowed = match running {
            None => candidates,
            Some(current) => intersect_smaller_first(&current, &candidates),
        };
        if narrowed.is_empty() {
            tracing::trace!(
                column = step.column,
                evaluated = evaluated + 1,
                skipped = steps.len() - evaluated - 1,
                "Filter result empty, stopping early"
            );
            return narrowed;
        }
        running = Some(narrowed);
    }
    running.unwrap_or_default()
}
