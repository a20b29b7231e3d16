//! Filter engine facade.
//!
//! Wires the row store, the column indexer, the result cache and the
//! metrics together behind one caller-owned value. Mutations take
//! `&mut self` and invalidate the cache synchronously; queries take `&self`
//! and are safe to run from several threads once a load has completed.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use rayon::prelude::*;
use roaring::RoaringBitmap;

use crate::cache::{CacheKey, CacheStats, CachedValue, ResultCache};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::index::{ColumnIndex, ColumnIndexer, MergeStats};
use crate::job::{AbortSignal, IndexJob};
use crate::metrics::{EngineMetrics, Operation};
use crate::query::{self, FacetOption, FilterState};
use crate::store::row_store::normalize_all;
use crate::store::{Record, Row, RowRef, RowStore, Schema};

// ── FilterEngine ────────────────────────────────────────────────────

/// In-memory faceted filter engine over one dataset.
///
/// ```
/// use facet_engine::{FilterEngine, FilterState, Record};
///
/// let mut engine = FilterEngine::default();
/// let records: Vec<Record> = (1..=6i64)
///     .map(|i| Record::new().with("id", i).with("mod3", i % 3))
///     .collect();
/// engine.load(&records).unwrap();
///
/// let state = FilterState::new().with("mod3", ["0"]);
/// assert_eq!(engine.filtered_count(&state), 2);
/// assert_eq!(engine.options("id", &state).len(), 2);
/// ```
#[derive(Debug)]
pub struct FilterEngine {
    config: EngineConfig,
    store: RowStore,
    indexer: ColumnIndexer,
    cache: Mutex<ResultCache>,
    metrics: EngineMetrics,
    /// Bumped on every load, start_load and invalidate_all.
    generation: u64,
    /// Trips jobs started under the current generation.
    abort: AbortSignal,
}

// ── Constructors ────────────────────────────────────────────────────

impl FilterEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: EngineConfig) -> Self {
        Self {
            store: RowStore::new(config.kind_sample_size),
            indexer: ColumnIndexer::new(config.bucketing.clone()),
            cache: Mutex::new(ResultCache::new(&config.cache)),
            metrics: EngineMetrics::new(),
            generation: 0,
            abort: AbortSignal::new(),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Default for FilterEngine {
    fn default() -> Self {
        Self::with_config(EngineConfig::default())
    }
}

// ── Loading and indexing ────────────────────────────────────────────

impl FilterEngine {
    /// Replace the dataset and rebuild every index synchronously.
    ///
    /// On `InvalidData` the previous dataset, indexes and cache stay as they
    /// were.
    pub fn load(&mut self, records: &[Record]) -> Result<()> {
        let start = Instant::now();
        if let Err(err) = self.store.load(records) {
            tracing::warn!(code = err.code(), error = %err, "Rejected dataset");
            return Err(err);
        }
        self.invalidate_all();
        self.indexer.clear();
        let stats = self
            .indexer
            .index_rows(self.store.schema(), 0, self.store.rows());

        tracing::debug!(
            rows = self.store.count(),
            columns = self.store.schema().len(),
            postings = stats.inserted,
            generation = self.generation,
            "Loaded dataset"
        );
        self.metrics
            .record(Operation::Load, start.elapsed().as_micros() as u64);
        Ok(())
    }

    /// Validate `records` and reset to an empty dataset with their schema.
    ///
    /// Rows become visible as the returned job is stepped. A failed
    /// validation leaves the engine untouched.
    pub fn start_load(&mut self, records: &[Record]) -> Result<IndexJob> {
        let (schema, rows) = match normalize_all(records) {
            Ok(prepared) => prepared,
            Err(err) => {
                tracing::warn!(code = err.code(), error = %err, "Rejected dataset");
                return Err(err);
            }
        };
        self.invalidate_all();
        self.store.reset(schema);
        self.indexer.clear();

        tracing::debug!(
            rows = rows.len(),
            batch_size = self.config.batch_size,
            generation = self.generation,
            "Starting progressive load"
        );
        Ok(IndexJob::new(
            self.generation,
            self.abort.clone(),
            rows,
            self.config.batch_size,
        ))
    }

    /// Place `records` at `offset` and merge them into one column's index.
    ///
    /// Positions other columns have already indexed are re-merged with the
    /// new rows, so an overwrite never leaves them pointing at old values.
    /// Positions a column has not indexed do not match filters on it.
    pub fn build_index(
        &mut self,
        column: &str,
        records: &[Record],
        offset: usize,
    ) -> Result<MergeStats> {
        let start = Instant::now();
        let range = self.store.place(offset, records)?;
        self.invalidate_cache();
        let rows = &self.store.rows()[range.start as usize..range.end as usize];
        let stats = self
            .indexer
            .index_column(self.store.schema(), column, range.start, rows);
        let refreshed = self
            .indexer
            .refresh_indexed(self.store.schema(), column, range.start, rows);
        if refreshed.moved > 0 {
            tracing::debug!(
                column,
                offset = range.start,
                moved = refreshed.moved,
                "Overwrite moved positions in other indexed columns"
            );
        }
        self.metrics
            .record(Operation::BuildIndex, start.elapsed().as_micros() as u64);
        Ok(stats)
    }

    /// Place `records` at `offset` and merge them into every column's index.
    pub fn append_chunk(&mut self, records: &[Record], offset: usize) -> Result<MergeStats> {
        let start = Instant::now();
        let range = self.store.place(offset, records)?;
        let stats = self.index_range(range);
        self.metrics
            .record(Operation::BuildIndex, start.elapsed().as_micros() as u64);
        Ok(stats)
    }

    /// One progressive batch of already-normalized rows.
    pub(crate) fn apply_batch(&mut self, offset: usize, rows: Vec<Row>) -> Result<MergeStats> {
        let start = Instant::now();
        let range = self.store.place_rows(offset, rows)?;
        let stats = self.index_range(range);
        self.metrics
            .record(Operation::BuildIndex, start.elapsed().as_micros() as u64);
        Ok(stats)
    }

    fn index_range(&mut self, range: Range<u32>) -> MergeStats {
        self.invalidate_cache();
        let rows = &self.store.rows()[range.start as usize..range.end as usize];
        self.indexer
            .index_rows(self.store.schema(), range.start, rows)
    }
}

// ── Queries ─────────────────────────────────────────────────────────

impl FilterEngine {
    /// Positions matching every active constraint of `state`.
    pub fn matching_positions(&self, state: &FilterState) -> Arc<RoaringBitmap> {
        self.metrics
            .timed(Operation::MatchingPositions, || self.positions_for(state))
    }

    /// Matching rows in position order, optionally only the half-open page
    /// `range` of the result. Rows outside the page are never materialized.
    pub fn filtered_rows(
        &self,
        state: &FilterState,
        range: Option<Range<usize>>,
    ) -> Vec<RowRef<'_>> {
        self.metrics.timed(Operation::FilteredRows, || {
            let positions = self.positions_for(state);
            let (skip, take) = match range {
                None => (0, usize::MAX),
                Some(r) => (r.start, r.end.saturating_sub(r.start)),
            };
            positions
                .iter()
                .skip(skip)
                .take(take)
                .filter_map(|position| self.store.row_ref(position))
                .collect()
        })
    }

    pub fn filtered_count(&self, state: &FilterState) -> u64 {
        self.metrics
            .timed(Operation::FilteredCount, || self.positions_for(state).len())
    }

    /// Options for `column` under every other active filter.
    ///
    /// A column that was never indexed has no options.
    pub fn options(&self, column: &str, state: &FilterState) -> Vec<FacetOption> {
        self.metrics.timed(Operation::Options, || {
            self.options_for(column, state)
                .map(|options| (*options).clone())
                .unwrap_or_default()
        })
    }

    /// Options for every indexed column, computed in parallel.
    pub fn all_options(&self, state: &FilterState) -> BTreeMap<String, Vec<FacetOption>> {
        let columns: Vec<&str> = self.indexer.column_names().collect();
        columns
            .par_iter()
            .map(|&column| (column.to_string(), self.options(column, state)))
            .collect()
    }

    fn positions_for(&self, state: &FilterState) -> Arc<RoaringBitmap> {
        let key = CacheKey::positions(state);
        if let Some(hit) = self.lock_cache().get_positions(&key) {
            self.metrics.record_cache(true);
            return hit;
        }
        self.metrics.record_cache(false);

        let positions = Arc::new(query::matching_positions(
            &self.indexer,
            self.store.count() as u32,
            state,
        ));
        self.lock_cache()
            .put(key, CachedValue::Positions(Arc::clone(&positions)));
        positions
    }

    fn options_for(&self, column: &str, state: &FilterState) -> Option<Arc<Vec<FacetOption>>> {
        let Some(index) = self.indexer.get(column) else {
            tracing::debug!(column, "Options requested for a column with no index");
            return None;
        };

        let key = CacheKey::options(column, state);
        if let Some(hit) = self.lock_cache().get_options(&key) {
            self.metrics.record_cache(true);
            return Some(hit);
        }
        self.metrics.record_cache(false);

        let others = state.without(column);
        let scope = others.is_active().then(|| self.positions_for(&others));
        let options = Arc::new(query::resolve_options(
            index,
            scope.as_deref(),
            state.get(column),
            self.config.keep_unavailable_selections,
        ));
        self.lock_cache()
            .put(key, CachedValue::Options(Arc::clone(&options)));
        Some(options)
    }

    fn lock_cache(&self) -> MutexGuard<'_, ResultCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Accessors and invalidation ──────────────────────────────────────

impl FilterEngine {
    pub fn get(&self, position: usize) -> Result<RowRef<'_>> {
        self.store.get(position)
    }

    pub fn row_count(&self) -> usize {
        self.store.count()
    }

    pub fn schema(&self) -> &Schema {
        self.store.schema()
    }

    /// Index of `column`, `None` if it was never indexed.
    pub fn index(&self, column: &str) -> Option<&ColumnIndex> {
        self.indexer.get(column)
    }

    pub fn indexed_columns(&self) -> impl Iterator<Item = &str> {
        self.indexer.column_names()
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock_cache().stats()
    }

    /// Signal of jobs started under the current generation.
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drop every cached result. Indexes are untouched.
    pub fn clear_cache(&self) {
        self.lock_cache().invalidate_all();
    }

    /// Drop cached results and abort any in-flight indexing job.
    pub fn invalidate_all(&mut self) {
        self.invalidate_cache();
        self.abort.abort();
        self.abort = AbortSignal::new();
        self.generation += 1;
    }

    fn invalidate_cache(&mut self) {
        self.cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .invalidate_all();
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::store::Scalar;

    fn twelve() -> Vec<Record> {
        (1..=12i64)
            .map(|i| Record::new().with("id", i).with("mod3", i % 3))
            .collect()
    }

    fn loaded() -> FilterEngine {
        let mut engine = FilterEngine::default();
        engine.load(&twelve()).unwrap();
        engine
    }

    fn values(options: &[FacetOption]) -> Vec<(&str, u64)> {
        options.iter().map(|o| (o.value.as_str(), o.count)).collect()
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FilterEngine>();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            batch_size: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(FilterEngine::new(config), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_options_ignore_own_selection() {
        let engine = loaded();
        let state = FilterState::new().with("mod3", ["0"]);
        let options = engine.options("mod3", &state);
        assert_eq!(values(&options), vec![("0", 4), ("1", 4), ("2", 4)]);

        let ids = engine.options("id", &state);
        assert_eq!(values(&ids), vec![("3", 1), ("6", 1), ("9", 1), ("12", 1)]);
    }

    #[test]
    fn test_filtered_rows_paging() {
        let engine = loaded();
        let state = FilterState::new().with("mod3", ["1"]);
        let all = engine.filtered_rows(&state, None);
        let ids: Vec<Scalar> = all.iter().map(|r| r.get("id").unwrap().clone()).collect();
        assert_eq!(
            ids,
            vec![
                Scalar::Number(1.0),
                Scalar::Number(4.0),
                Scalar::Number(7.0),
                Scalar::Number(10.0)
            ]
        );

        let page = engine.filtered_rows(&state, Some(1..3));
        let positions: Vec<u32> = page.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![3, 6]);

        assert!(engine.filtered_rows(&state, Some(10..20)).is_empty());
        assert!(engine.filtered_rows(&state, Some(3..1)).is_empty());
    }

    #[test]
    fn test_unknown_column_is_soft() {
        let engine = loaded();
        let state = FilterState::new().with("nope", ["1"]);
        assert_eq!(engine.filtered_count(&state), 0);
        assert!(engine.options("nope", &FilterState::new()).is_empty());
    }

    #[test]
    fn test_failed_load_keeps_state_and_cache() {
        let mut engine = loaded();
        let state = FilterState::new().with("mod3", ["2"]);
        assert_eq!(engine.filtered_count(&state), 4);
        let generation = engine.generation();

        let bad = vec![Record::new().with("id", 1), Record::new().with("other", 2)];
        let err = engine.load(&bad).unwrap_err();
        assert_eq!(err.code(), "INVALID_DATA");

        assert_eq!(engine.generation(), generation);
        assert_eq!(engine.row_count(), 12);
        assert_eq!(engine.cache_stats().entries, 1);
        assert_eq!(engine.filtered_count(&state), 4);
    }

    #[test]
    fn test_repeated_query_hits_cache() {
        let engine = loaded();
        let state = FilterState::new().with("mod3", ["0", "1"]);
        let first = engine.matching_positions(&state);
        let second = engine.matching_positions(&state);
        assert!(Arc::ptr_eq(&first, &second));

        let stats = engine.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(engine.metrics().snapshot().cache_hits, 1);
    }

    #[test]
    fn test_mutations_invalidate_cache() {
        let mut engine = loaded();
        let state = FilterState::new().with("mod3", ["0"]);
        assert_eq!(engine.filtered_count(&state), 4);

        let more: Vec<Record> = (13..=15i64)
            .map(|i| Record::new().with("id", i).with("mod3", i % 3))
            .collect();
        engine.append_chunk(&more, 12).unwrap();
        assert_eq!(engine.cache_stats().entries, 0);
        assert_eq!(engine.filtered_count(&state), 5);

        engine.clear_cache();
        assert_eq!(engine.cache_stats().entries, 0);
    }

    #[test]
    fn test_build_index_single_column() {
        let mut engine = FilterEngine::default();
        let records = twelve();
        engine.build_index("mod3", &records[..6], 0).unwrap();
        assert_eq!(engine.row_count(), 6);
        assert!(engine.index("id").is_none());
        assert_eq!(engine.index("mod3").unwrap().indexed_count(), 6);

        engine.build_index("mod3", &records[6..], 6).unwrap();
        // same chunk twice is a no-op
        let stats = engine.build_index("mod3", &records[6..], 6).unwrap();
        assert_eq!(stats.unchanged, 6);
        assert_eq!(engine.index("mod3").unwrap().indexed_count(), 12);
    }

    #[test]
    fn test_build_index_overwrite_updates_other_columns() {
        let mut engine = loaded();
        let replacement: Vec<Record> = (101..=106i64)
            .map(|i| Record::new().with("id", i).with("mod3", i % 3))
            .collect();
        engine.build_index("mod3", &replacement, 0).unwrap();
        assert_eq!(engine.row_count(), 12);

        let old = FilterState::new().with("id", ["1"]);
        assert_eq!(engine.filtered_count(&old), 0);
        assert!(engine.filtered_rows(&old, None).is_empty());

        let new = FilterState::new().with("id", ["101"]);
        let rows = engine.filtered_rows(&new, None);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].position, 0);
        assert_eq!(rows[0].get("id"), Some(&Scalar::Number(101.0)));
        assert_eq!(rows[0].to_record(), replacement[0]);

        // untouched tail keeps its values
        let tail = FilterState::new().with("id", ["12"]);
        assert_eq!(engine.filtered_count(&tail), 1);
        let id = engine.index("id").unwrap();
        assert_eq!(id.indexed_count(), 12);
        assert_eq!(id.distinct_count(), 12);
    }

    #[test]
    fn test_chunk_gap_rejected() {
        let mut engine = loaded();
        let err = engine.append_chunk(&twelve(), 20).unwrap_err();
        assert!(matches!(err, EngineError::InvalidData { .. }));
        assert_eq!(engine.row_count(), 12);
    }

    #[test]
    fn test_invalidate_all_bumps_generation() {
        let mut engine = loaded();
        let signal = engine.abort_signal();
        engine.invalidate_all();
        assert!(signal.is_aborted());
        assert!(!engine.abort_signal().is_aborted());
        assert_eq!(engine.generation(), 2);
    }

    #[test]
    fn test_all_options_matches_single_calls() {
        let engine = loaded();
        let state = FilterState::new().with("mod3", ["2"]);
        let all = engine.all_options(&state);
        assert_eq!(all.len(), 2);
        assert_eq!(all["id"], engine.options("id", &state));
        assert_eq!(all["mod3"], engine.options("mod3", &state));
    }

    #[test]
    fn test_get_and_schema() {
        let engine = loaded();
        assert_eq!(engine.get(0).unwrap().get("id"), Some(&Scalar::Number(1.0)));
        assert!(matches!(
            engine.get(12),
            Err(EngineError::OutOfRange { position: 12, count: 12 })
        ));
        let names: Vec<&str> = engine.schema().column_names().collect();
        assert_eq!(names, vec!["id", "mod3"]);
    }
}
