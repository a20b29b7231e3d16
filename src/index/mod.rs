//! Column indexer: one inverted index per column.
//!
//! Indexes are built incrementally, chunk by chunk, and rebuilt from
//! scratch only when the dataset is replaced.

pub mod bucket;
pub mod column;
pub mod dictionary;

pub use bucket::BucketLayout;
pub use column::{compare_facet_values, ColumnIndex, FacetSlot, MergeStats};

use std::collections::BTreeMap;

use roaring::RoaringBitmap;

use crate::config::BucketPolicy;
use crate::store::types::{Row, Schema};

/// Owns the inverted index of every indexed column.
#[derive(Debug, Default)]
pub struct ColumnIndexer {
    columns: BTreeMap<String, ColumnIndex>,
    policy: BucketPolicy,
}

impl ColumnIndexer {
    pub fn new(policy: BucketPolicy) -> Self {
        Self {
            columns: BTreeMap::new(),
            policy,
        }
    }

    /// Merge one column of `rows` (global positions starting at `offset`).
    pub fn index_column(
        &mut self,
        schema: &Schema,
        column: &str,
        offset: u32,
        rows: &[Row],
    ) -> MergeStats {
        let Some(col) = schema.position_of(column) else {
            tracing::debug!(column, "Skipping index build for column outside the schema");
            return MergeStats::default();
        };
        let kind = schema.columns()[col].kind;
        let index = self
            .columns
            .entry(column.to_string())
            .or_insert_with(|| ColumnIndex::new(column));
        index.merge(
            offset,
            rows.iter().filter_map(|row| row.value(col)),
            kind,
            &self.policy,
        )
    }

    /// Re-merge the rows at `offset..offset + rows.len()` into every column
    /// other than `skip`, limited to positions that column already indexed.
    pub fn refresh_indexed(
        &mut self,
        schema: &Schema,
        skip: &str,
        offset: u32,
        rows: &[Row],
    ) -> MergeStats {
        let mut total = MergeStats::default();
        let mut window = RoaringBitmap::new();
        window.insert_range(offset..offset + rows.len() as u32);

        for (name, index) in self.columns.iter_mut() {
            if name == skip {
                continue;
            }
            let Some(col) = schema.position_of(name) else {
                continue;
            };
            let kind = schema.columns()[col].kind;
            let touched = &window & index.indexed_positions();
            for position in touched.iter() {
                let value = rows[(position - offset) as usize].value(col);
                let stats = index.merge(position, value, kind, &self.policy);
                total.moved += stats.moved;
                total.unchanged += stats.unchanged;
            }
        }
        total
    }

    /// Merge every schema column of `rows`.
    pub fn index_rows(&mut self, schema: &Schema, offset: u32, rows: &[Row]) -> MergeStats {
        let mut total = MergeStats::default();
        for meta in schema.columns() {
            let stats = self.index_column(schema, &meta.name, offset, rows);
            total.inserted += stats.inserted;
            total.moved += stats.moved;
            total.unchanged += stats.unchanged;
        }
        total
    }

    /// Index of a column, `None` if it has never been indexed.
    pub fn get(&self, column: &str) -> Option<&ColumnIndex> {
        self.columns.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnIndex> {
        self.columns.values()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn clear(&mut self) {
        self.columns.clear();
    }
}
