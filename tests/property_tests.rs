//! Property-based checks for the series-level invariants in spec.md §8
//! (P1/P3/P8/P9). Each case builds a temporary series, feeds it a random
//! batch of distinct timestamps, and checks the selected result against the
//! property rather than against a fixed fixture.

use proptest::collection::vec as pvec;
use proptest::prelude::*;
use std::collections::HashSet;
use tempfile::tempdir;
use zekta::{Entry, OpenOptions, SelectOptions, Series};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn distinct_times() -> impl Strategy<Value = Vec<f64>> {
    pvec(-20_000i32..20_000i32, 1..64).prop_map(|ints| {
        let mut seen = HashSet::new();
        ints.into_iter()
            .map(|i| i as f64)
            .filter(|t| seen.insert(t.to_bits()))
            .collect()
    })
}

proptest! {
    /// P1 (Sorted) and P3 (select/push round-trip): pushing a batch of
    /// entries with distinct times and selecting the full range returns
    /// exactly those entries, sorted by time.
    #[test]
    fn push_then_select_is_sorted_round_trip(times in distinct_times()) {
        let rt = runtime();
        rt.block_on(async {
            let dir = tempdir().unwrap();
            let series = Series::open(
                dir.path(),
                OpenOptions { value_byte_length: Some(8), ..Default::default() },
            )
            .await
            .unwrap();

            for &t in &times {
                series.push(t, &t.to_le_bytes()).await.unwrap();
            }

            let got = series.select(SelectOptions::default()).await.unwrap();
            let mut expected = times.clone();
            expected.sort_by(|a, b| a.partial_cmp(b).unwrap());

            prop_assert_eq!(got.len(), expected.len());
            for (entry, time) in got.iter().zip(expected.iter()) {
                prop_assert_eq!(entry.time, *time);
                prop_assert_eq!(&entry.value, &time.to_le_bytes().to_vec());
            }
            for window in got.windows(2) {
                prop_assert!(window[0].time <= window[1].time);
            }
            Ok(())
        })?;
    }

    /// P8 (Range query inclusivity): selecting `[a, b]` returns exactly the
    /// entries with `a <= t <= b`, both endpoints included.
    #[test]
    fn select_range_is_inclusive_on_both_ends(times in distinct_times(), a in -20_000i32..20_000i32, span in 0i32..40_000i32) {
        let rt = runtime();
        rt.block_on(async {
            let from = a as f64;
            let to = (a + span) as f64;
            let dir = tempdir().unwrap();
            let series = Series::open(
                dir.path(),
                OpenOptions { value_byte_length: Some(8), ..Default::default() },
            )
            .await
            .unwrap();

            for &t in &times {
                series.push(t, &t.to_le_bytes()).await.unwrap();
            }

            let got = series
                .select(SelectOptions { from, to, asc: true })
                .await
                .unwrap();

            let mut expected: Vec<f64> = times.iter().copied().filter(|t| *t >= from && *t <= to).collect();
            expected.sort_by(|x, y| x.partial_cmp(y).unwrap());

            let got_times: Vec<f64> = got.iter().map(|e: &Entry| e.time).collect();
            prop_assert_eq!(got_times, expected);
            Ok(())
        })?;
    }

    /// P9 (Descending symmetry): `select(asc:false)` is the exact reverse
    /// of `select(asc:true)` for the same range.
    #[test]
    fn descending_select_mirrors_ascending(times in distinct_times()) {
        let rt = runtime();
        rt.block_on(async {
            let dir = tempdir().unwrap();
            let series = Series::open(
                dir.path(),
                OpenOptions { value_byte_length: Some(8), ..Default::default() },
            )
            .await
            .unwrap();

            for &t in &times {
                series.push(t, &t.to_le_bytes()).await.unwrap();
            }

            let asc = series.select(SelectOptions { asc: true, ..Default::default() }).await.unwrap();
            let mut desc = series.select(SelectOptions { asc: false, ..Default::default() }).await.unwrap();
            desc.reverse();

            prop_assert_eq!(asc, desc);
            Ok(())
        })?;
    }
}
