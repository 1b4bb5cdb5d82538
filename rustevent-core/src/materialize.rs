//! Histogram materialization.
//!
//! Turns events sorted on the binned axis into counts with a single merge
//! sweep over events and edges, `O(n_events + n_bins)`.

use crate::event::Event;
use crate::histogram::{BinAxis, BinEdges, Counts};

/// Bins pre-sorted events into `edges`.
///
/// `events` must be sorted ascending on `axis`. Bins are half-open
/// `[edges[k], edges[k+1])`; events below the first edge or at/after the last
/// edge are dropped, as are NaN keys. Weights sum into `y`; squared errors sum during the
/// sweep and are square-rooted at the end, or left as zeros if
/// `skip_error` is set.
#[must_use]
pub fn bin_sorted_events<E: Event>(
    events: &[E],
    edges: &BinEdges,
    axis: BinAxis,
    skip_error: bool,
) -> Counts {
    match axis {
        BinAxis::Tof => bin_by_key(events, edges, skip_error, Event::tof),
        BinAxis::PulseTime => {
            bin_by_key(events, edges, skip_error, |e: &E| e.pulse_time().as_f64())
        }
    }
}

fn bin_by_key<E, K>(events: &[E], edges: &BinEdges, skip_error: bool, key: K) -> Counts
where
    E: Event,
    K: Fn(&E) -> f64,
{
    let edges = edges.as_slice();
    let n_bins = edges.len() - 1;
    let mut counts = Counts::zeros(n_bins);

    // Jump over everything below the first edge.
    let start = events.partition_point(|e| key(e) < edges[0]);

    let mut bin = 0;
    for event in &events[start..] {
        let t = key(event);
        if t.is_nan() {
            continue;
        }
        while bin < n_bins && t >= edges[bin + 1] {
            bin += 1;
        }
        if bin == n_bins {
            break;
        }
        counts.y[bin] += event.weight();
        if !skip_error {
            counts.e[bin] += event.error_squared();
        }
    }

    if !skip_error {
        for e in &mut counts.e {
            *e = e.sqrt();
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{PulseTime, TofEvent, WeightedEvent};
    use approx::assert_relative_eq;

    fn edges(values: &[f64]) -> BinEdges {
        BinEdges::new(values.to_vec()).unwrap()
    }

    #[test]
    fn test_weighted_counts_and_errors() {
        let events = vec![
            WeightedEvent::new(1.0, PulseTime(0), 1.0, 1.0),
            WeightedEvent::new(1.5, PulseTime(0), 2.0, 2.0),
            WeightedEvent::new(3.0, PulseTime(0), 1.0, 1.0),
        ];
        let counts = bin_sorted_events(&events, &edges(&[0.0, 2.0, 4.0]), BinAxis::Tof, false);
        assert_eq!(counts.y, vec![3.0, 1.0]);
        assert_relative_eq!(counts.e[0], 3.0_f64.sqrt());
        assert_relative_eq!(counts.e[1], 1.0);
    }

    #[test]
    fn test_half_open_window() {
        let events = vec![
            TofEvent::new(-1.0, PulseTime(0)),
            TofEvent::new(0.0, PulseTime(0)),
            TofEvent::new(2.0, PulseTime(0)),
            TofEvent::new(4.0, PulseTime(0)),
            TofEvent::new(9.0, PulseTime(0)),
        ];
        let counts = bin_sorted_events(&events, &edges(&[0.0, 2.0, 4.0]), BinAxis::Tof, false);
        assert_eq!(counts.y, vec![1.0, 1.0]);
    }

    #[test]
    fn test_empty_bins_are_zero() {
        let events = vec![TofEvent::new(5.5, PulseTime(0))];
        let counts = bin_sorted_events(
            &events,
            &edges(&[0.0, 1.0, 2.0, 5.0, 6.0]),
            BinAxis::Tof,
            false,
        );
        assert_eq!(counts.y, vec![0.0, 0.0, 0.0, 1.0]);
        assert_eq!(counts.e, vec![0.0, 0.0, 0.0, 1.0]);
        assert!(counts.e.iter().all(|e| !e.is_nan()));
    }

    #[test]
    fn test_zero_width_bins_are_skipped() {
        let events = vec![
            TofEvent::new(0.5, PulseTime(0)),
            TofEvent::new(1.0, PulseTime(0)),
            TofEvent::new(1.5, PulseTime(0)),
        ];
        let counts = bin_sorted_events(&events, &edges(&[0.0, 1.0, 1.0, 2.0]), BinAxis::Tof, true);
        assert_eq!(counts.y, vec![1.0, 0.0, 2.0]);
        assert_eq!(counts.e, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_nan_tof_is_dropped() {
        let events = vec![
            TofEvent::new(1.0, PulseTime(0)),
            TofEvent::new(f64::NAN, PulseTime(0)),
        ];
        let counts = bin_sorted_events(&events, &edges(&[0.0, 10.0]), BinAxis::Tof, false);
        assert_eq!(counts.y, vec![1.0]);
    }

    #[test]
    fn test_nan_tof_between_valid_events_is_skipped() {
        // Events that are not NaN-last still bin every finite value.
        let events = vec![
            TofEvent::new(-f64::NAN, PulseTime(0)),
            TofEvent::new(1.0, PulseTime(0)),
            TofEvent::new(3.0, PulseTime(0)),
        ];
        let counts = bin_sorted_events(&events, &edges(&[0.0, 2.0, 4.0]), BinAxis::Tof, false);
        assert_eq!(counts.y, vec![1.0, 1.0]);
        assert_eq!(counts.e, vec![1.0, 1.0]);
    }

    #[test]
    fn test_negative_weights_keep_positive_variance() {
        let events = vec![
            WeightedEvent::new(1.0, PulseTime(0), 2.0, 2.0),
            WeightedEvent::new(1.2, PulseTime(0), -2.0, 2.0),
        ];
        let counts = bin_sorted_events(&events, &edges(&[0.0, 2.0]), BinAxis::Tof, false);
        assert_relative_eq!(counts.y[0], 0.0);
        assert_relative_eq!(counts.e[0], 2.0);
    }

    #[test]
    fn test_pulse_time_axis() {
        let events = vec![
            TofEvent::new(50.0, PulseTime(100)),
            TofEvent::new(10.0, PulseTime(150)),
            TofEvent::new(30.0, PulseTime(250)),
        ];
        let counts = bin_sorted_events(
            &events,
            &edges(&[100.0, 200.0, 300.0]),
            BinAxis::PulseTime,
            false,
        );
        assert_eq!(counts.y, vec![2.0, 1.0]);
    }
}
