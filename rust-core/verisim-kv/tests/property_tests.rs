// SPDX-License-Identifier: PMPL-1.0-or-later
//! Property-based tests for cursor range scans

use std::collections::BTreeMap;
use std::ops::Bound;

use proptest::prelude::*;
use verisim_kv::{CursorOptions, Database, OpenOptions, WriteOptions};

/// Generate short keys from a small alphabet so bounds often hit stored keys.
fn arb_key() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(b'a'..=b'e', 1..4)
}

/// Generate a store of up to 40 entries.
fn arb_store() -> impl Strategy<Value = BTreeMap<Vec<u8>, Vec<u8>>> {
    prop::collection::btree_map(arb_key(), prop::collection::vec(any::<u8>(), 0..8), 0..40)
}

#[derive(Debug, Clone)]
struct Bounds {
    lower: Option<(Vec<u8>, bool)>,
    upper: Option<(Vec<u8>, bool)>,
    reverse: bool,
    limit: Option<u64>,
}

/// Generate bounds; the flag marks an inclusive bound.
fn arb_bounds() -> impl Strategy<Value = Bounds> {
    (
        prop::option::of((arb_key(), any::<bool>())),
        prop::option::of((arb_key(), any::<bool>())),
        any::<bool>(),
        prop::option::of(0u64..10),
    )
        .prop_map(|(lower, upper, reverse, limit)| Bounds {
            lower,
            upper,
            reverse,
            limit,
        })
}

fn cursor_options(bounds: &Bounds, high_water_mark: usize) -> CursorOptions {
    let mut options = CursorOptions::new()
        .reverse(bounds.reverse)
        .high_water_mark(high_water_mark);
    match &bounds.lower {
        Some((key, true)) => options = options.gte(key),
        Some((key, false)) => options = options.gt(key),
        None => {}
    }
    match &bounds.upper {
        Some((key, true)) => options = options.lte(key),
        Some((key, false)) => options = options.lt(key),
        None => {}
    }
    if let Some(limit) = bounds.limit {
        options = options.limit(limit);
    }
    options
}

/// The keys a scan with `bounds` must return, in order.
fn oracle(store: &BTreeMap<Vec<u8>, Vec<u8>>, bounds: &Bounds) -> Vec<Vec<u8>> {
    let lower = match &bounds.lower {
        Some((key, true)) => Bound::Included(key.clone()),
        Some((key, false)) => Bound::Excluded(key.clone()),
        None => Bound::Unbounded,
    };
    let upper = match &bounds.upper {
        Some((key, true)) => Bound::Included(key.clone()),
        Some((key, false)) => Bound::Excluded(key.clone()),
        None => Bound::Unbounded,
    };

    // An inverted range is empty rather than a panic.
    let both_inclusive =
        matches!(lower, Bound::Included(_)) && matches!(upper, Bound::Included(_));
    let empty = match (&lower, &upper) {
        (Bound::Included(l) | Bound::Excluded(l), Bound::Included(u) | Bound::Excluded(u)) => {
            l > u || (l == u && !both_inclusive)
        }
        _ => false,
    };
    if empty {
        return Vec::new();
    }

    let keys = store.range((lower, upper)).map(|(k, _)| k.clone());
    let keys: Vec<_> = if bounds.reverse {
        keys.rev().collect()
    } else {
        keys.collect()
    };
    let limit = bounds.limit.map_or(usize::MAX, |l| l as usize);
    keys.into_iter().take(limit).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_scan_matches_sorted_map(
        store in arb_store(),
        bounds in arb_bounds(),
        high_water_mark in 0usize..64,
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let db: Database = Database::new().unwrap();
            db.open("memory", OpenOptions::default()).await.unwrap();
            for (key, value) in &store {
                db.put(key.clone(), value.clone(), WriteOptions::default()).await.unwrap();
            }

            let cursor = db.cursor(cursor_options(&bounds, high_water_mark)).unwrap();
            let mut keys = Vec::new();
            loop {
                let batch = cursor.advance().await.unwrap();
                // Every call but the last makes progress.
                prop_assert!(batch.finished || !batch.is_empty());
                keys.extend(batch.keys());
                if batch.finished {
                    break;
                }
            }
            cursor.end().await.unwrap();
            db.close().await.unwrap();

            prop_assert_eq!(keys, oracle(&store, &bounds));
            Ok(())
        })?;
    }

    #[test]
    fn test_unbounded_high_water_mark_finishes_in_one_call(
        store in arb_store(),
        bounds in arb_bounds(),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let db: Database = Database::new().unwrap();
            db.open("memory", OpenOptions::default()).await.unwrap();
            for (key, value) in &store {
                db.put(key.clone(), value.clone(), WriteOptions::default()).await.unwrap();
            }

            let cursor = db.cursor(cursor_options(&bounds, usize::MAX)).unwrap();
            let batch = cursor.advance().await.unwrap();
            prop_assert!(batch.finished);
            prop_assert_eq!(batch.keys(), oracle(&store, &bounds));

            cursor.end().await.unwrap();
            db.close().await.unwrap();
            Ok(())
        })?;
    }

    #[test]
    fn test_close_always_waits_for_every_cursor(
        cursor_count in 1usize..6,
        end_order in prop::collection::vec(any::<prop::sample::Index>(), 6),
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let db: Database = Database::new().unwrap();
            db.open("memory", OpenOptions::default()).await.unwrap();

            let mut cursors: Vec<_> = (0..cursor_count)
                .map(|_| db.cursor(CursorOptions::new()).unwrap())
                .collect();
            let close = db.close();

            for index in end_order.iter().take(cursor_count) {
                prop_assert!(db.engine().is_some());
                let cursor = cursors.remove(index.index(cursors.len()));
                cursor.end().await.unwrap();
            }

            close.await.unwrap();
            prop_assert!(db.engine().is_none());
            prop_assert_eq!(db.open_cursors(), 0);
            Ok(())
        })?;
    }
}
