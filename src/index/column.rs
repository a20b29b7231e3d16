//! Inverted index for a single column.
//!
//! Maps each stringified value to the roaring set of positions holding it.
//! Every indexed position holds exactly one value, so the postings are
//! pairwise disjoint and their union is `indexed_positions()`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use roaring::RoaringBitmap;

use crate::config::BucketPolicy;
use crate::index::bucket::{BucketLayout, Buckets};
use crate::index::dictionary::ValueDictionary;
use crate::store::types::{parse_numeric, ColumnKind, Scalar};

/// `value_at` marker for positions this column has not indexed.
const UNINDEXED: u32 = u32::MAX;

/// Outcome of merging one chunk into a column index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Positions indexed for the first time.
    pub inserted: usize,
    /// Positions that moved to a different value.
    pub moved: usize,
    /// Positions already holding the same value.
    pub unchanged: usize,
}

/// One entry of a column's facet domain, in display order.
#[derive(Debug, Clone)]
pub struct FacetSlot<'a> {
    pub value: &'a str,
    pub label: String,
    pub positions: &'a RoaringBitmap,
}

#[derive(Debug)]
pub struct ColumnIndex {
    name: String,
    dictionary: ValueDictionary,
    /// Positions per value id.
    postings: Vec<RoaringBitmap>,
    /// Numeric reading of each value id (None for text).
    numbers: Vec<Option<f64>>,
    /// Value id per position.
    value_at: Vec<u32>,
    indexed: RoaringBitmap,
    /// Non-empty numeric values in facet order, to their ids.
    numeric: BTreeMap<NumericKey, u32>,
    /// Non-empty text values in facet order, to their ids.
    text: BTreeMap<Box<str>, u32>,
    range: Option<(f64, f64)>,
    buckets: Option<Buckets>,
}

impl ColumnIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dictionary: ValueDictionary::new(),
            postings: Vec::new(),
            numbers: Vec::new(),
            value_at: Vec::new(),
            indexed: RoaringBitmap::new(),
            numeric: BTreeMap::new(),
            text: BTreeMap::new(),
            range: None,
            buckets: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Merge `values` for positions `offset, offset + 1, ...`.
    ///
    /// Never rescans previously indexed rows. A position keeps exactly one
    /// value: re-indexing it with the same value is a no-op, with a different
    /// value moves it.
    pub fn merge<'a>(
        &mut self,
        offset: u32,
        values: impl IntoIterator<Item = &'a Scalar>,
        kind: ColumnKind,
        policy: &BucketPolicy,
    ) -> MergeStats {
        let mut stats = MergeStats::default();

        for (i, value) in values.into_iter().enumerate() {
            let position = offset + i as u32;
            let key = value.index_key();
            let id = self.intern(&key);

            let slot = position as usize;
            if slot >= self.value_at.len() {
                self.value_at.resize(slot + 1, UNINDEXED);
            }
            let previous = self.value_at[slot];
            if previous == id {
                stats.unchanged += 1;
                continue;
            }
            if previous == UNINDEXED {
                self.indexed.insert(position);
                stats.inserted += 1;
            } else {
                self.detach(previous, position);
                stats.moved += 1;
            }
            self.attach(id, position);
            self.value_at[slot] = id;
        }

        self.maybe_activate_buckets(kind, policy);
        stats
    }

    fn intern(&mut self, key: &str) -> u32 {
        let id = self.dictionary.intern(key);
        if id as usize == self.postings.len() {
            self.postings.push(RoaringBitmap::new());
            self.numbers.push(parse_numeric(key));
        }
        id
    }

    fn attach(&mut self, id: u32, position: u32) {
        let postings = &mut self.postings[id as usize];
        let was_empty = postings.is_empty();
        postings.insert(position);
        if was_empty {
            self.enter_order(id);
        }

        if let Some(n) = self.numbers[id as usize] {
            self.range = Some(match self.range {
                Some((lo, hi)) => (lo.min(n), hi.max(n)),
                None => (n, n),
            });
            if let Some(buckets) = &mut self.buckets {
                buckets.insert(n, position);
            }
        }
    }

    fn detach(&mut self, id: u32, position: u32) {
        let postings = &mut self.postings[id as usize];
        postings.remove(position);
        if postings.is_empty() {
            self.leave_order(id);
        }
        if let (Some(n), Some(buckets)) = (self.numbers[id as usize], &mut self.buckets) {
            buckets.remove(n, position);
        }
    }

    /// Switch to bucketed facets once the column is numeric, large and
    /// nearly all-distinct. Boundaries are fixed from the current min/max.
    fn maybe_activate_buckets(&mut self, kind: ColumnKind, policy: &BucketPolicy) {
        if self.buckets.is_some() || !policy.enabled || kind != ColumnKind::Numeric {
            return;
        }
        let rows = self.indexed.len() as usize;
        if rows < policy.min_rows || rows == 0 {
            return;
        }
        if (self.distinct_count() as f64 / rows as f64) < policy.min_unique_ratio {
            return;
        }
        let Some((min, max)) = self.range else {
            return;
        };
        let Some(layout) = BucketLayout::new(min, max, policy.bucket_count(rows)) else {
            return;
        };

        let mut buckets = Buckets::new(layout);
        for (id, postings) in self.postings.iter().enumerate() {
            if let Some(n) = self.numbers[id] {
                if !postings.is_empty() {
                    buckets.insert_all(n, postings);
                }
            }
        }
        tracing::debug!(
            column = self.name.as_str(),
            rows,
            distinct = self.distinct_count(),
            buckets = buckets.layout().count(),
            "Switching column to bucketed facets"
        );
        self.buckets = Some(buckets);
    }

    // ── Facet order ─────────────────────────────────────────────────

    /// A value id gained its first position.
    fn enter_order(&mut self, id: u32) {
        let value: Box<str> = self.dictionary.get(id).unwrap_or("").into();
        match self.numbers[id as usize] {
            Some(number) => {
                self.numeric.insert(NumericKey { number, value }, id);
            }
            None => {
                self.text.insert(value, id);
            }
        }
    }

    /// A value id lost its last position.
    fn leave_order(&mut self, id: u32) {
        let value = self.dictionary.get(id).unwrap_or("");
        match self.numbers[id as usize] {
            Some(number) => {
                self.numeric.remove(&NumericKey {
                    number,
                    value: value.into(),
                });
            }
            None => {
                self.text.remove(value);
            }
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Positions for a filter value: exact value first, then bucket key.
    pub fn positions(&self, value: &str) -> Option<&RoaringBitmap> {
        if let Some(id) = self.dictionary.lookup(value) {
            let postings = &self.postings[id as usize];
            if !postings.is_empty() {
                return Some(postings);
            }
        }
        self.buckets
            .as_ref()
            .and_then(|b| b.positions_for_key(value))
            .filter(|p| !p.is_empty())
    }

    /// Exact values with their positions, in facet order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &RoaringBitmap)> {
        let numeric = self
            .numeric
            .iter()
            .map(|(key, &id)| (&*key.value, &self.postings[id as usize]));
        numeric.chain(self.text_entries())
    }

    fn text_entries(&self) -> impl Iterator<Item = (&str, &RoaringBitmap)> {
        self.text
            .iter()
            .map(|(value, &id)| (&**value, &self.postings[id as usize]))
    }

    /// The full value → positions mapping.
    pub fn to_map(&self) -> BTreeMap<String, RoaringBitmap> {
        self.entries()
            .map(|(value, positions)| (value.to_string(), positions.clone()))
            .collect()
    }

    /// The values offered as facet options, in display order.
    ///
    /// Flat columns list every exact value (numeric values ascending, then
    /// text). Bucketed columns list non-empty buckets in range order followed
    /// by the column's non-numeric values.
    pub fn facet_domain(&self) -> Vec<FacetSlot<'_>> {
        match &self.buckets {
            None => self
                .entries()
                .map(|(value, positions)| FacetSlot {
                    value,
                    label: value.to_string(),
                    positions,
                })
                .collect(),
            Some(buckets) => {
                let mut slots: Vec<FacetSlot<'_>> = buckets
                    .entries()
                    .map(|(value, label, positions)| FacetSlot {
                        value,
                        label,
                        positions,
                    })
                    .collect();
                slots.extend(self.text_entries().map(|(value, positions)| FacetSlot {
                    value,
                    label: value.to_string(),
                    positions,
                }));
                slots
            }
        }
    }

    /// Number of distinct exact values.
    pub fn distinct_count(&self) -> usize {
        self.numeric.len() + self.text.len()
    }

    /// Size of the facet domain; the denominator for selectivity.
    pub fn facet_cardinality(&self) -> usize {
        match &self.buckets {
            None => self.distinct_count(),
            Some(buckets) => buckets.non_empty() + self.text.len(),
        }
    }

    pub fn indexed_positions(&self) -> &RoaringBitmap {
        &self.indexed
    }

    pub fn indexed_count(&self) -> u64 {
        self.indexed.len()
    }

    pub fn is_bucketed(&self) -> bool {
        self.buckets.is_some()
    }

    pub fn bucket_layout(&self) -> Option<&BucketLayout> {
        self.buckets.as_ref().map(|b| b.layout())
    }
}

/// Order key of a numeric value: its number, then its spelling.
#[derive(Debug, Clone)]
struct NumericKey {
    number: f64,
    value: Box<str>,
}

impl Ord for NumericKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_facet_values(&self.value, Some(self.number), &other.value, Some(other.number))
    }
}

impl PartialOrd for NumericKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for NumericKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NumericKey {}

/// Total order for facet values.
///
/// Numeric-looking values sort numerically and before text; text sorts
/// byte-lexically. Equal numbers with different spellings fall back to the
/// lexical order so the comparison stays total.
pub fn compare_facet_values(a: &str, a_num: Option<f64>, b: &str, b_num: Option<f64>) -> Ordering {
    match (a_num, b_num) {
        (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
