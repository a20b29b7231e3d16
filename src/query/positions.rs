//! Position-set helpers shared by the evaluator and the facet resolver.

use roaring::RoaringBitmap;

/// All positions `[0, count)`.
pub fn all_positions(count: u32) -> RoaringBitmap {
    let mut all = RoaringBitmap::new();
    all.insert_range(0..count);
    all
}

/// Intersect two position sets by iterating the smaller and probing the larger.
///
/// Cost is O(min(|a|, |b|)) membership probes.
pub fn intersect_smaller_first(a: &RoaringBitmap, b: &RoaringBitmap) -> RoaringBitmap {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small.iter().filter(|p| large.contains(*p)).collect()
}

/// Union of several position sets.
pub fn union_all<'a>(sets: impl IntoIterator<Item = &'a RoaringBitmap>) -> RoaringBitmap {
    let mut out = RoaringBitmap::new();
    for set in sets {
        out |= set;
    }
    out
}
