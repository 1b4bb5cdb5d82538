//! Parallel readers and writers over one event workspace.

use std::thread;

use rayon::prelude::*;
use rustevent_core::{BinEdges, EventList, PulseTime, SortOrder, TofEvent, WeightedEvent};
use rustevent_workspace::{EventWorkspace, MatrixWorkspace, WorkspaceConfig};

const N_ROWS: usize = 16;
const EVENTS_PER_ROW: u32 = 5_000;

/// Deterministic, deliberately unsorted rows.
fn build_workspace() -> EventWorkspace {
    let lists = (0..N_ROWS)
        .map(|row| {
            let row = u32::try_from(row).unwrap();
            let mut list = EventList::with_detector_ids([i32::try_from(row).unwrap()]);
            for i in 0..EVENTS_PER_ROW {
                let tof = f64::from((i * 7_919 + row * 31) % 10_000);
                list.add_event(WeightedEvent::new(
                    tof,
                    PulseTime(i64::from(i % 60)),
                    1.0 + f64::from(row % 3),
                    1.0,
                ));
            }
            list
        })
        .collect();
    let edges = BinEdges::from_rebin_params(&[0.0, 250.0, 10_000.0]).unwrap();
    // A small threshold also exercises the parallel single-list sort.
    EventWorkspace::from_event_lists(lists, edges)
        .with_config(WorkspaceConfig::new().with_parallel_sort_threshold(1_024))
}

#[test]
fn threads_reading_distinct_rows_match_serial_reads() {
    let expected: Vec<Vec<f64>> = {
        let ws = build_workspace();
        (0..N_ROWS)
            .map(|row| ws.read_y(row).unwrap().to_vec())
            .collect()
    };

    let ws = build_workspace();
    let results: Vec<Vec<f64>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..N_ROWS)
            .map(|row| {
                let ws = &ws;
                scope.spawn(move || ws.read_y(row).unwrap().to_vec())
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    assert_eq!(results, expected);
    for row in 0..N_ROWS {
        assert_eq!(ws.event_list(row).unwrap().sort_order(), SortOrder::Tof);
    }
}

#[test]
fn threads_reading_the_same_row_share_one_result() {
    let ws = build_workspace();
    let results: Vec<Vec<f64>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| ws.read_y(3).unwrap().to_vec()))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    let first = &results[0];
    assert!(results.iter().all(|y| y == first));
    let total: f64 = first.iter().sum();
    assert!((total - f64::from(EVENTS_PER_ROW) * 1.0).abs() < 1e-9);

    let stats = ws.cache_stats();
    assert_eq!(stats.hits + stats.misses, 8);
    assert!(stats.misses >= 1);
}

#[test]
fn rayon_materialize_all_matches_per_row_reads() {
    let ws = build_workspace();
    let all = ws.materialize_all().unwrap();
    assert_eq!(all.len(), N_ROWS);

    let fresh = build_workspace();
    for (row, histogram) in all.iter().enumerate() {
        let counts = fresh
            .generate_histogram(row, &fresh.x(row).unwrap().clone(), false)
            .unwrap();
        assert_eq!(histogram.y().as_slice(), counts.y.as_slice());
        assert_eq!(histogram.e().as_slice(), counts.e.as_slice());
    }
}

#[test]
fn writers_and_readers_on_disjoint_rows() {
    let ws = build_workspace();
    let before: Vec<f64> = (0..N_ROWS)
        .map(|row| ws.read_y(row).unwrap().iter().sum())
        .collect();

    (0..N_ROWS).into_par_iter().for_each(|row| {
        if row % 2 == 0 {
            let mut list = ws.event_list_mut(row).unwrap();
            list.add_event(TofEvent::new(10.0, PulseTime(0)));
        } else {
            ws.read_y(row).unwrap();
        }
    });

    for row in 0..N_ROWS {
        let total: f64 = ws.read_y(row).unwrap().iter().sum();
        let added = if row % 2 == 0 { 1.0 } else { 0.0 };
        assert!((total - before[row] - added).abs() < 1e-9, "row {row}");
    }
}

#[test]
fn mutation_during_parallel_reads_is_never_served_stale() {
    let ws = build_workspace();
    let edges = ws.x(0).unwrap().clone();
    let baseline: f64 = ws.read_y(0).unwrap().iter().sum();

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..50 {
                    let total: f64 = ws.read_y(0).unwrap().iter().sum();
                    assert!(total >= baseline);
                }
            });
        }
        scope.spawn(|| {
            for _ in 0..20 {
                ws.event_list_mut(0)
                    .unwrap()
                    .add_event(TofEvent::new(edges.first(), PulseTime(0)));
            }
        });
    });

    let total: f64 = ws.read_y(0).unwrap().iter().sum();
    assert!((total - baseline - 20.0).abs() < 1e-9);
}
