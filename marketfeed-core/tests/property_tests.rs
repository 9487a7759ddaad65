//! Property tests for Parquet store merge invariants.
//!
//! 1. Loaded history is strictly ascending by date
//! 2. Saving the same rows twice leaves the partition unchanged
//! 3. Merge keeps the union of dates, newer rows winning on overlap

use chrono::{Duration as Days, NaiveDate};
use marketfeed_core::data::{HistoricalStore, PartitionKey};
use marketfeed_core::domain::{DataKind, HistoricalRecord, Period};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_cache_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!("marketfeed_prop_{}_{id}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn key() -> PartitionKey {
    PartitionKey::new(DataKind::Stock, "600000", Period::Daily)
}

// ── Strategies (proptest) ────────────────────────────────────────────

/// Rows on day offsets 0..60 (duplicates allowed), closes in cents.
fn arb_rows() -> impl Strategy<Value = Vec<HistoricalRecord>> {
    prop::collection::vec((0i64..60, 100u32..100_000), 1..40).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(offset, cents)| {
                let close = f64::from(cents) / 100.0;
                HistoricalRecord {
                    date: base() + Days::days(offset),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: u64::from(cents),
                    amount: close * f64::from(cents),
                    change_percent: 0.0,
                    turnover: 0.0,
                }
            })
            .collect()
    })
}

/// Every row the generators can produce, read back from disk.
fn load_all(store: &HistoricalStore) -> Vec<HistoricalRecord> {
    store
        .try_load(&key(), base(), base() + Days::days(59))
        .unwrap_or_default()
}

fn large_staleness(dir: PathBuf) -> HistoricalStore {
    HistoricalStore::new(dir).unwrap().with_staleness_days(i64::from(u16::MAX))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn loaded_history_is_sorted_and_unique(rows in arb_rows()) {
        let dir = temp_cache_dir();
        let store = large_staleness(dir.clone());
        store.save(&rows, &key()).unwrap();

        let loaded = load_all(&store);
        prop_assert!(!loaded.is_empty());
        for pair in loaded.windows(2) {
            prop_assert!(pair[0].date < pair[1].date);
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn saving_twice_is_idempotent(rows in arb_rows()) {
        let dir = temp_cache_dir();
        let store = large_staleness(dir.clone());
        store.save(&rows, &key()).unwrap();
        let once = load_all(&store);
        store.save(&rows, &key()).unwrap();
        let twice = load_all(&store);
        prop_assert_eq!(once, twice);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn merge_is_union_with_newer_rows_winning(old in arb_rows(), new in arb_rows()) {
        let dir = temp_cache_dir();
        let store = large_staleness(dir.clone());
        store.save(&old, &key()).unwrap();
        store.save(&new, &key()).unwrap();

        let mut expected: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for row in old.iter().chain(new.iter()) {
            expected.insert(row.date, row.close);
        }
        let loaded: BTreeMap<NaiveDate, f64> =
            load_all(&store).into_iter().map(|r| (r.date, r.close)).collect();
        prop_assert_eq!(loaded, expected);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
