//! Property tests: engine results against a naive row-by-row reference.

use std::collections::BTreeSet;

use facet_engine::{CacheConfig, EngineConfig, FilterEngine, FilterState, Record, Scalar};
use proptest::prelude::*;
use roaring::RoaringBitmap;

const COLUMNS: [&str; 3] = ["num", "tag", "flag"];
/// Only the first four tags occur in generated rows; the rest are absent values.
const TAGS: [&str; 6] = ["w", "x", "y", "z", "q", "r"];

type Row = (u8, usize, u8);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn to_records(rows: &[Row]) -> Vec<Record> {
    rows.iter()
        .map(|&(num, tag, flag)| {
            Record::new()
                .with("num", num as i64)
                .with("tag", TAGS[tag])
                .with("flag", if flag == 0 { "off".to_string() } else { flag.to_string() })
        })
        .collect()
}

fn key_of(row: &Row, column: &str) -> String {
    match column {
        "num" => row.0.to_string(),
        "tag" => TAGS[row.1].to_string(),
        _ if row.2 == 0 => "off".to_string(),
        _ => row.2.to_string(),
    }
}

/// Reference scan: a row matches when every active column holds a selected value.
fn brute_force(rows: &[Row], state: &FilterState) -> RoaringBitmap {
    rows.iter()
        .enumerate()
        .filter(|(_, row)| {
            state
                .active()
                .all(|(column, selected)| selected.iter().any(|v| *v == key_of(row, column)))
        })
        .map(|(i, _)| i as u32)
        .collect()
}

fn engine_with(rows: &[Row], config: EngineConfig) -> FilterEngine {
    let mut engine = FilterEngine::new(config).unwrap();
    engine.load(&to_records(rows)).unwrap();
    engine
}

/// `rows` with `chunk` written from `offset` on, extending past the end.
fn overwrite(rows: &[Row], chunk: &[Row], offset: usize) -> Vec<Row> {
    let mut current = rows.to_vec();
    for (i, row) in chunk.iter().enumerate() {
        match current.get_mut(offset + i) {
            Some(slot) => *slot = *row,
            None => current.push(*row),
        }
    }
    current
}

fn assert_matches_rows(engine: &FilterEngine, current: &[Row], state: &FilterState) {
    assert_eq!(engine.row_count(), current.len());
    assert_eq!(*engine.matching_positions(state), brute_force(current, state));

    let fresh = engine_with(current, EngineConfig::default());
    for column in COLUMNS {
        let a = engine.index(column).map(|i| i.to_map()).unwrap_or_default();
        let b = fresh.index(column).map(|i| i.to_map()).unwrap_or_default();
        assert_eq!(a, b, "column {}", column);
    }
}

fn rows_strategy(max: usize) -> impl Strategy<Value = Vec<Row>> {
    prop::collection::vec((0u8..5, 0usize..4, 0u8..3), 0..max)
}

/// Selections draw from a slightly larger domain than the data, so some
/// selected values never occur.
fn state_strategy() -> impl Strategy<Value = FilterState> {
    (
        prop::option::of(prop::collection::vec(0u8..7, 0..4)),
        prop::option::of(prop::collection::vec(0usize..6, 0..4)),
        prop::option::of(prop::collection::vec(0u8..4, 0..3)),
    )
        .prop_map(|(num, tag, flag)| {
            let mut state = FilterState::new();
            if let Some(values) = num {
                state.set("num", values.into_iter().map(|v| v.to_string()));
            }
            if let Some(values) = tag {
                state.set("tag", values.into_iter().map(|t| TAGS[t]));
            }
            if let Some(values) = flag {
                state.set(
                    "flag",
                    values
                        .into_iter()
                        .map(|f| if f == 0 { "off".to_string() } else { f.to_string() }),
                );
            }
            state
        })
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn index_covers_every_position_once(rows in rows_strategy(300)) {
        let engine = engine_with(&rows, EngineConfig::default());
        for column in COLUMNS {
            let Some(index) = engine.index(column) else {
                prop_assert!(rows.is_empty());
                continue;
            };
            let mut union = RoaringBitmap::new();
            let mut total = 0u64;
            for (_, positions) in index.entries() {
                total += positions.len();
                union |= positions;
            }
            prop_assert_eq!(total, rows.len() as u64);
            prop_assert_eq!(union.len(), rows.len() as u64);
            prop_assert_eq!(&union, index.indexed_positions());
        }
    }

    #[test]
    fn matching_positions_equal_brute_force(
        rows in rows_strategy(400),
        state in state_strategy(),
    ) {
        let engine = engine_with(&rows, EngineConfig::default());
        let expected = brute_force(&rows, &state);
        prop_assert_eq!(&*engine.matching_positions(&state), &expected);
        prop_assert_eq!(engine.filtered_count(&state), expected.len());

        let positions: Vec<u32> = engine
            .filtered_rows(&state, None)
            .iter()
            .map(|row| row.position)
            .collect();
        prop_assert_eq!(positions, expected.iter().collect::<Vec<_>>());
    }

    #[test]
    fn adding_a_constraint_never_grows_the_result(
        rows in rows_strategy(300),
        state in state_strategy(),
        extra in 0u8..5,
    ) {
        let engine = engine_with(&rows, EngineConfig::default());
        let before = engine.filtered_count(&state);

        let mut narrowed = state.clone();
        match state.get("num") {
            [] => narrowed.set("num", [extra.to_string()]),
            // a subset of the current selection
            [first, ..] => narrowed.set("num", [first.clone()]),
        }
        prop_assert!(engine.filtered_count(&narrowed) <= before);
    }

    #[test]
    fn option_counts_sum_to_other_filters_result(
        rows in rows_strategy(300),
        state in state_strategy(),
    ) {
        let engine = engine_with(&rows, EngineConfig::default());
        for column in COLUMNS {
            let total: u64 = engine.options(column, &state).iter().map(|o| o.count).sum();
            prop_assert_eq!(total, engine.filtered_count(&state.without(column)));
        }
    }

    #[test]
    fn options_never_list_absent_values(
        rows in rows_strategy(200),
        state in state_strategy(),
    ) {
        let engine = engine_with(&rows, EngineConfig::default());
        for column in COLUMNS {
            let present: BTreeSet<String> = rows.iter().map(|r| key_of(r, column)).collect();
            for option in engine.options(column, &state) {
                prop_assert!(present.contains(&option.value));
                if option.count == 0 {
                    prop_assert!(state.get(column).contains(&option.value));
                }
            }
        }
    }

    #[test]
    fn cache_never_changes_results(
        rows in rows_strategy(300),
        states in prop::collection::vec(state_strategy(), 1..6),
    ) {
        let cached = engine_with(&rows, EngineConfig::default());
        let uncached = engine_with(&rows, EngineConfig {
            cache: CacheConfig { capacity: 0, ..CacheConfig::default() },
            ..EngineConfig::default()
        });

        // twice over, so the second pass is served from a warm cache
        for _ in 0..2 {
            for state in &states {
                prop_assert_eq!(
                    cached.matching_positions(state),
                    uncached.matching_positions(state)
                );
                for column in COLUMNS {
                    prop_assert_eq!(cached.options(column, state), uncached.options(column, state));
                }
            }
        }
        prop_assert_eq!(uncached.cache_stats().entries, 0);
    }

    #[test]
    fn reindexing_a_chunk_is_idempotent(
        rows in rows_strategy(200),
        split in 0usize..200,
    ) {
        let whole = engine_with(&rows, EngineConfig::default());
        let records = to_records(&rows);
        let split = split.min(records.len());

        let mut chunked = FilterEngine::default();
        chunked.append_chunk(&records[..split], 0).unwrap();
        chunked.append_chunk(&records[split..], split).unwrap();
        chunked.append_chunk(&records[split..], split).unwrap();
        chunked.append_chunk(&records[..split], 0).unwrap();

        prop_assert_eq!(chunked.row_count(), whole.row_count());
        for column in COLUMNS {
            let a = whole.index(column).map(|i| i.to_map()).unwrap_or_default();
            let b = chunked.index(column).map(|i| i.to_map()).unwrap_or_default();
            prop_assert_eq!(a, b);
        }
    }
}

// ---------------------------------------------------------------------------
// Overwritten chunks
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn append_chunk_overwrite_matches_scan(
        rows in rows_strategy(200),
        chunk in rows_strategy(80),
        offset in 0usize..200,
        state in state_strategy(),
    ) {
        let offset = offset.min(rows.len());
        let mut engine = engine_with(&rows, EngineConfig::default());
        // prime the cache so stale entries would show up
        engine.matching_positions(&state);

        engine.append_chunk(&to_records(&chunk), offset).unwrap();
        assert_matches_rows(&engine, &overwrite(&rows, &chunk, offset), &state);
    }

    #[test]
    fn build_index_overwrite_matches_scan(
        rows in rows_strategy(200),
        chunk in rows_strategy(80),
        offset in 0usize..200,
        column in 0usize..3,
        state in state_strategy(),
    ) {
        prop_assume!(!rows.is_empty());
        let offset = offset.min(rows.len());
        let chunk = &chunk[..chunk.len().min(rows.len() - offset)];
        prop_assume!(!chunk.is_empty());
        let mut engine = engine_with(&rows, EngineConfig::default());
        engine.matching_positions(&state);

        engine
            .build_index(COLUMNS[column], &to_records(chunk), offset)
            .unwrap();
        assert_matches_rows(&engine, &overwrite(&rows, chunk, offset), &state);
    }
}

// ---------------------------------------------------------------------------
// Bucketed columns
// ---------------------------------------------------------------------------

/// 2000 distinct prices: the column switches to bucketed options.
fn priced() -> (FilterEngine, Vec<f64>) {
    let prices: Vec<f64> = (0..2000).map(|i| ((i * 37) % 2000) as f64 * 0.5).collect();
    let records: Vec<Record> = prices
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            Record::new()
                .with("price", p)
                .with("side", if i % 2 == 0 { "buy" } else { "sell" })
        })
        .collect();
    let mut engine = FilterEngine::default();
    engine.load(&records).unwrap();
    (engine, prices)
}

#[test]
fn bucket_filter_matches_value_range() {
    let (engine, prices) = priced();
    let index = engine.index("price").unwrap();
    assert!(index.is_bucketed());
    let layout = index.bucket_layout().unwrap().clone();
    // round(sqrt(2000) / 4) = 11
    assert_eq!(layout.count(), 11);

    let options = engine.options("price", &FilterState::new());
    assert_eq!(options.len(), 11);
    assert_eq!(options.iter().map(|o| o.count).sum::<u64>(), 2000);

    let bucket = 3;
    let state = FilterState::new().with("price", [layout.key(bucket)]);
    let expected: RoaringBitmap = prices
        .iter()
        .enumerate()
        .filter(|(_, &p)| layout.bucket_of(p) == bucket)
        .map(|(i, _)| i as u32)
        .collect();
    assert_eq!(&*engine.matching_positions(&state), &expected);
}

#[test]
fn bucketed_counts_follow_other_filters() {
    let (engine, _) = priced();
    let state = FilterState::new().with("side", ["buy"]);
    let options = engine.options("price", &state);
    assert_eq!(options.iter().map(|o| o.count).sum::<u64>(), 1000);

    // exact values still filter exactly
    let exact = FilterState::new().with("price", ["18.5"]);
    let rows = engine.filtered_rows(&exact, None);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("price"), Some(&Scalar::Number(18.5)));
}
