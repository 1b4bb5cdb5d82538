//! Ordering of event records.
//!
//! Binning needs events in monotonic order on the binned axis. The order an
//! event list is in is tracked as a [`SortOrder`] tag; sorting to an order
//! the list already satisfies costs nothing, any other request is a fresh
//! stable sort.

use std::cmp::Ordering;

use rayon::slice::ParallelSliceMut;

use crate::event::Event;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Lists at least this long are sorted on the rayon pool.
pub const PARALLEL_SORT_THRESHOLD: usize = 1 << 16;

/// Order of the records in an event list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SortOrder {
    /// No known order.
    #[default]
    Unsorted,
    /// Ascending time-of-flight.
    Tof,
    /// Ascending pulse time.
    PulseTime,
    /// Ascending pulse time, then ascending time-of-flight.
    PulseTimeTof,
}

impl SortOrder {
    /// Returns true if a list in this order is also in `required` order.
    ///
    /// `PulseTimeTof` implies `PulseTime`; `Unsorted` is satisfied by
    /// anything.
    #[inline]
    #[must_use]
    pub fn satisfies(self, required: SortOrder) -> bool {
        match required {
            SortOrder::Unsorted => true,
            SortOrder::PulseTime => {
                matches!(self, SortOrder::PulseTime | SortOrder::PulseTimeTof)
            }
            other => self == other,
        }
    }

    /// Compares two events under this order.
    #[inline]
    pub fn compare<E: Event>(self, a: &E, b: &E) -> Ordering {
        match self {
            SortOrder::Unsorted => Ordering::Equal,
            SortOrder::Tof => compare_tof(a.tof(), b.tof()),
            SortOrder::PulseTime => a.pulse_time().cmp(&b.pulse_time()),
            SortOrder::PulseTimeTof => a
                .pulse_time()
                .cmp(&b.pulse_time())
                .then_with(|| compare_tof(a.tof(), b.tof())),
        }
    }
}

/// Total order on times-of-flight with every NaN last, whatever its sign.
#[inline]
fn compare_tof(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.total_cmp(&b),
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SortOrder::Unsorted => "nothing",
            SortOrder::Tof => "time-of-flight",
            SortOrder::PulseTime => "pulse time",
            SortOrder::PulseTimeTof => "pulse time then time-of-flight",
        };
        f.write_str(name)
    }
}

/// Stable sort of `events` into `order`.
///
/// Slices of at least `parallel_threshold` records use rayon's stable
/// parallel merge sort; equal keys keep their insertion order either way.
pub fn sort_events<E: Event>(events: &mut [E], order: SortOrder, parallel_threshold: usize) {
    if order == SortOrder::Unsorted {
        return;
    }
    if events.len() >= parallel_threshold {
        events.par_sort_by(|a, b| order.compare(a, b));
    } else {
        events.sort_by(|a, b| order.compare(a, b));
    }
}

/// Returns true if `events` is non-decreasing under `order`.
pub fn is_sorted_by<E: Event>(events: &[E], order: SortOrder) -> bool {
    events
        .windows(2)
        .all(|pair| order.compare(&pair[0], &pair[1]) != Ordering::Greater)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{PulseTime, TofEvent, WeightedEvent};

    #[test]
    fn test_satisfies() {
        assert!(SortOrder::PulseTimeTof.satisfies(SortOrder::PulseTime));
        assert!(!SortOrder::PulseTime.satisfies(SortOrder::PulseTimeTof));
        assert!(!SortOrder::Tof.satisfies(SortOrder::PulseTime));
        assert!(SortOrder::Unsorted.satisfies(SortOrder::Unsorted));
        assert!(!SortOrder::Unsorted.satisfies(SortOrder::Tof));
    }

    #[test]
    fn test_sort_is_stable() {
        let mut events = vec![
            WeightedEvent::new(2.0, PulseTime(0), 1.0, 1.0),
            WeightedEvent::new(1.0, PulseTime(0), 2.0, 1.0),
            WeightedEvent::new(2.0, PulseTime(0), 3.0, 1.0),
            WeightedEvent::new(1.0, PulseTime(0), 4.0, 1.0),
        ];
        sort_events(&mut events, SortOrder::Tof, usize::MAX);
        let weights: Vec<f64> = events.iter().map(Event::weight).collect();
        assert_eq!(weights, vec![2.0, 4.0, 1.0, 3.0]);
    }

    #[test]
    fn test_parallel_sort_matches_serial() {
        let make = || -> Vec<TofEvent> {
            (0..2_000u32)
                .map(|i| TofEvent::new(f64::from((i * 7919) % 1000), PulseTime(i64::from(i % 13))))
                .collect()
        };
        let mut serial = make();
        let mut parallel = make();
        sort_events(&mut serial, SortOrder::PulseTimeTof, usize::MAX);
        sort_events(&mut parallel, SortOrder::PulseTimeTof, 1);
        assert_eq!(serial, parallel);
        assert!(is_sorted_by(&serial, SortOrder::PulseTimeTof));
        assert!(is_sorted_by(&serial, SortOrder::PulseTime));
    }

    #[test]
    fn test_nan_sorts_last() {
        let mut events = vec![
            TofEvent::new(f64::NAN, PulseTime(0)),
            TofEvent::new(1.0, PulseTime(0)),
        ];
        sort_events(&mut events, SortOrder::Tof, usize::MAX);
        assert!((events[0].tof - 1.0).abs() < f64::EPSILON);
        assert!(events[1].tof.is_nan());
    }

    #[test]
    fn test_negative_nan_sorts_last() {
        let negative_nan = -f64::NAN;
        assert!(negative_nan.is_sign_negative());
        let mut events = vec![
            TofEvent::new(3.0, PulseTime(0)),
            TofEvent::new(negative_nan, PulseTime(0)),
            TofEvent::new(f64::NAN, PulseTime(0)),
            TofEvent::new(1.0, PulseTime(0)),
            TofEvent::new(f64::NEG_INFINITY, PulseTime(0)),
        ];
        sort_events(&mut events, SortOrder::Tof, usize::MAX);
        let tofs: Vec<f64> = events.iter().map(Event::tof).collect();
        assert_eq!(&tofs[..3], &[f64::NEG_INFINITY, 1.0, 3.0]);
        assert!(tofs[3..].iter().all(|t| t.is_nan()));
        assert!(is_sorted_by(&events, SortOrder::Tof));
    }

    #[test]
    fn test_is_sorted_by() {
        let events = vec![
            TofEvent::new(2.0, PulseTime(1)),
            TofEvent::new(1.0, PulseTime(2)),
        ];
        assert!(is_sorted_by(&events, SortOrder::PulseTime));
        assert!(!is_sorted_by(&events, SortOrder::Tof));
        assert!(is_sorted_by(&events[..1], SortOrder::Tof));
    }
}
