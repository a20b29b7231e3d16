//! Fixed-width numeric buckets for high-cardinality columns.
//!
//! A layout is computed once from the min/max observed when bucketing is
//! activated and never changes afterwards. Values outside the original range
//! clamp into the first or last bucket.

use std::collections::HashMap;

use roaring::RoaringBitmap;

use crate::store::types::format_number;

/// Equal-width ranges over `[min, max]`. The last bucket is closed on the right.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketLayout {
    min: f64,
    max: f64,
    width: f64,
    count: usize,
}

impl BucketLayout {
    /// `None` when the range is degenerate (min == max, or non-finite).
    pub fn new(min: f64, max: f64, count: usize) -> Option<Self> {
        if count == 0 || !min.is_finite() || !max.is_finite() || max <= min {
            return None;
        }
        let width = (max - min) / count as f64;
        if width <= 0.0 || !width.is_finite() {
            return None;
        }
        Some(Self {
            min,
            max,
            width,
            count,
        })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn bucket_of(&self, value: f64) -> usize {
        let raw = ((value - self.min) / self.width).floor();
        if raw <= 0.0 {
            0
        } else {
            (raw as usize).min(self.count - 1)
        }
    }

    pub fn bounds(&self, bucket: usize) -> (f64, f64) {
        let lo = self.min + bucket as f64 * self.width;
        let hi = if bucket + 1 >= self.count {
            self.max
        } else {
            self.min + (bucket + 1) as f64 * self.width
        };
        (lo, hi)
    }

    /// Option value for a bucket, e.g. `"0..100"`.
    pub fn key(&self, bucket: usize) -> String {
        let (lo, hi) = self.bounds(bucket);
        format!("{}..{}", format_bound(lo), format_bound(hi))
    }

    /// Display label for a bucket, e.g. `"0 - 100"`.
    pub fn label(&self, bucket: usize) -> String {
        let (lo, hi) = self.bounds(bucket);
        format!("{} - {}", format_bound(lo), format_bound(hi))
    }
}

fn format_bound(value: f64) -> String {
    format_number((value * 1e6).round() / 1e6)
}

/// Bucket postings layered over a column's exact-value postings.
#[derive(Debug)]
pub struct Buckets {
    layout: BucketLayout,
    postings: Vec<RoaringBitmap>,
    keys: Vec<String>,
    by_key: HashMap<String, usize>,
}

impl Buckets {
    pub fn new(layout: BucketLayout) -> Self {
        let keys: Vec<String> = (0..layout.count()).map(|b| layout.key(b)).collect();
        let by_key = keys
            .iter()
            .enumerate()
            .map(|(b, key)| (key.clone(), b))
            .collect();
        Self {
            postings: vec![RoaringBitmap::new(); layout.count()],
            layout,
            keys,
            by_key,
        }
    }

    pub fn layout(&self) -> &BucketLayout {
        &self.layout
    }

    pub fn insert(&mut self, value: f64, position: u32) {
        let b = self.layout.bucket_of(value);
        self.postings[b].insert(position);
    }

    pub fn insert_all(&mut self, value: f64, positions: &RoaringBitmap) {
        let b = self.layout.bucket_of(value);
        self.postings[b] |= positions;
    }

    pub fn remove(&mut self, value: f64, position: u32) {
        let b = self.layout.bucket_of(value);
        self.postings[b].remove(position);
    }

    pub fn positions_for_key(&self, key: &str) -> Option<&RoaringBitmap> {
        self.by_key.get(key).map(|&b| &self.postings[b])
    }

    /// Non-empty buckets in range order: (key, label, positions).
    pub fn entries(&self) -> impl Iterator<Item = (&str, String, &RoaringBitmap)> {
        self.postings
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.is_empty())
            .map(|(b, p)| (self.keys[b].as_str(), self.layout.label(b), p))
    }

    pub fn non_empty(&self) -> usize {
        self.postings.iter().filter(|p| !p.is_empty()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_rejects_degenerate_range() {
        assert!(BucketLayout::new(5.0, 5.0, 10).is_none());
        assert!(BucketLayout::new(0.0, f64::INFINITY, 10).is_none());
        assert!(BucketLayout::new(0.0, 1.0, 0).is_none());
    }

    #[test]
    fn test_bucket_of_clamps() {
        let layout = BucketLayout::new(0.0, 100.0, 10).unwrap();
        assert_eq!(layout.bucket_of(0.0), 0);
        assert_eq!(layout.bucket_of(9.99), 0);
        assert_eq!(layout.bucket_of(10.0), 1);
        assert_eq!(layout.bucket_of(100.0), 9);
        assert_eq!(layout.bucket_of(-50.0), 0);
        assert_eq!(layout.bucket_of(1e9), 9);
    }

    #[test]
    fn test_keys_and_labels() {
        let layout = BucketLayout::new(1.0, 1001.0, 10).unwrap();
        assert_eq!(layout.key(0), "1..101");
        assert_eq!(layout.label(0), "1 - 101");
        assert_eq!(layout.key(9), "901..1001");
    }

    #[test]
    fn test_buckets_track_positions() {
        let mut buckets = Buckets::new(BucketLayout::new(0.0, 10.0, 2).unwrap());
        buckets.insert(1.0, 0);
        buckets.insert(9.0, 1);
        buckets.insert(7.0, 2);
        assert_eq!(buckets.positions_for_key("5..10").unwrap().len(), 2);

        buckets.remove(7.0, 2);
        assert_eq!(buckets.positions_for_key("5..10").unwrap().len(), 1);
        assert_eq!(buckets.non_empty(), 2);

        let keys: Vec<&str> = buckets.entries().map(|(k, _, _)| k).collect();
        assert_eq!(keys, vec!["0..5", "5..10"]);
    }
}
