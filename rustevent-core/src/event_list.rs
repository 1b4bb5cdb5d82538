//! Per-spectrum event storage.
//!
//! An [`EventList`] owns the events of one spectrum, the set of detector IDs
//! feeding it, and a [`SortOrder`] tag that always describes the actual order
//! of the stored records. Every content mutation replaces a generation stamp
//! that caches use to detect staleness.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::error::{Error, Result};
use crate::event::{
    DetectorId, Event, EventType, PulseTime, TofEvent, WeightedEvent, WeightedEventNoTime,
    WeightedRecord,
};
use crate::histogram::{BinAxis, BinEdges, Counts};
use crate::materialize::bin_sorted_events;
use crate::sort::{sort_events, SortOrder, PARALLEL_SORT_THRESHOLD};

/// Whether a time-of-flight transform keeps the event order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Monotonicity {
    /// Non-decreasing: `a <= b` implies `f(a) <= f(b)`.
    Increasing,
    /// No guarantee; the list is marked unsorted.
    Unknown,
}

/// Sum of weights and squared errors over a range of events.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Integral {
    /// Summed weight.
    pub weight: f64,
    /// Summed squared error.
    pub error_squared: f64,
}

impl Integral {
    /// Error as a standard deviation.
    #[must_use]
    pub fn error(&self) -> f64 {
        self.error_squared.sqrt()
    }

    fn accumulate<E: Event>(events: &[E]) -> Self {
        events.iter().fold(Self::default(), |acc, e| Self {
            weight: acc.weight + e.weight(),
            error_squared: acc.error_squared + e.error_squared(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum EventStorage {
    Tof(Vec<TofEvent>),
    Weighted(Vec<WeightedEvent>),
    WeightedNoTime(Vec<WeightedEventNoTime>),
}

/// Runs `$body` with `$events` bound to the concrete record vector.
macro_rules! with_events {
    ($storage:expr, $events:ident => $body:expr) => {
        match $storage {
            EventStorage::Tof($events) => $body,
            EventStorage::Weighted($events) => $body,
            EventStorage::WeightedNoTime($events) => $body,
        }
    };
}

/// Like `with_events!`, rewrapping the resulting vector in the same variant.
macro_rules! map_events {
    ($storage:expr, $events:ident => $body:expr) => {
        match $storage {
            EventStorage::Tof($events) => EventStorage::Tof($body),
            EventStorage::Weighted($events) => EventStorage::Weighted($body),
            EventStorage::WeightedNoTime($events) => EventStorage::WeightedNoTime($body),
        }
    };
}

impl EventStorage {
    fn empty(event_type: EventType) -> Self {
        match event_type {
            EventType::Tof => Self::Tof(Vec::new()),
            EventType::Weighted => Self::Weighted(Vec::new()),
            EventType::WeightedNoTime => Self::WeightedNoTime(Vec::new()),
        }
    }

    fn event_type(&self) -> EventType {
        match self {
            Self::Tof(_) => EventType::Tof,
            Self::Weighted(_) => EventType::Weighted,
            Self::WeightedNoTime(_) => EventType::WeightedNoTime,
        }
    }

    fn len(&self) -> usize {
        with_events!(self, events => events.len())
    }

    /// Widens to `target`. Callers guarantee `target >= self.event_type()`.
    fn widen(&mut self, target: EventType) {
        let widened = match (&*self, target) {
            (Self::Tof(events), EventType::Weighted) => {
                Self::Weighted(events.iter().map(Event::to_weighted).collect())
            }
            (Self::Tof(events), EventType::WeightedNoTime) => {
                Self::WeightedNoTime(events.iter().map(Event::to_weighted_no_time).collect())
            }
            (Self::Weighted(events), EventType::WeightedNoTime) => {
                Self::WeightedNoTime(events.iter().map(Event::to_weighted_no_time).collect())
            }
            _ => return,
        };
        *self = widened;
    }

    fn push<E: Event>(&mut self, event: E) {
        match self {
            Self::Tof(events) => events.push(TofEvent::new(event.tof(), event.pulse_time())),
            Self::Weighted(events) => events.push(event.to_weighted()),
            Self::WeightedNoTime(events) => events.push(event.to_weighted_no_time()),
        }
    }

    fn extend_from(&mut self, other: &EventStorage) {
        with_events!(other, source => {
            for event in source {
                self.push(*event);
            }
        });
    }
}

/// Source of generation stamps; 0 is reserved for never-mutated lists.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, AtomicOrdering::Relaxed)
}

/// Events of one spectrum plus the detectors feeding it.
///
/// Equality compares content (events, detector IDs and order), not
/// generation.
#[derive(Debug, Clone)]
pub struct EventList {
    events: EventStorage,
    detector_ids: BTreeSet<DetectorId>,
    order: SortOrder,
    generation: u64,
}

impl PartialEq for EventList {
    fn eq(&self, other: &Self) -> bool {
        self.events == other.events
            && self.detector_ids == other.detector_ids
            && self.order == other.order
    }
}

impl Default for EventList {
    fn default() -> Self {
        Self::new()
    }
}

impl EventList {
    /// Creates an empty, unsorted list of [`TofEvent`] records.
    #[must_use]
    pub fn new() -> Self {
        Self::with_type(EventType::Tof)
    }

    /// Creates an empty list with the given record layout.
    #[must_use]
    pub fn with_type(event_type: EventType) -> Self {
        Self {
            events: EventStorage::empty(event_type),
            detector_ids: BTreeSet::new(),
            order: SortOrder::Unsorted,
            generation: 0,
        }
    }

    /// Creates an empty list fed by the given detectors.
    #[must_use]
    pub fn with_detector_ids<I: IntoIterator<Item = DetectorId>>(ids: I) -> Self {
        let mut list = Self::new();
        list.detector_ids.extend(ids);
        list
    }

    /// Record layout currently stored.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.events.event_type()
    }

    /// Number of events.
    #[inline]
    #[must_use]
    pub fn number_events(&self) -> usize {
        self.events.len()
    }

    /// Alias of [`EventList::number_events`].
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if the list holds no events.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.len() == 0
    }

    /// Current order of the stored records.
    #[inline]
    #[must_use]
    pub fn sort_order(&self) -> SortOrder {
        self.order
    }

    /// Stamp replaced on every content mutation.
    ///
    /// Stamps are unique across the process, so two lists only share one if
    /// one is an unmodified clone of the other, or both are fresh and empty
    /// (generation 0). Sorting keeps the stamp.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn touch(&mut self) {
        self.generation = next_generation();
    }

    // ---------------------------------------------------------------------
    // Detector IDs

    /// Detectors contributing to this spectrum.
    #[must_use]
    pub fn detector_ids(&self) -> &BTreeSet<DetectorId> {
        &self.detector_ids
    }

    /// Adds one detector.
    pub fn add_detector_id(&mut self, id: DetectorId) {
        self.detector_ids.insert(id);
    }

    /// Replaces the detector set.
    pub fn set_detector_ids<I: IntoIterator<Item = DetectorId>>(&mut self, ids: I) {
        self.detector_ids = ids.into_iter().collect();
    }

    /// Returns true if `id` feeds this spectrum.
    #[must_use]
    pub fn has_detector_id(&self, id: DetectorId) -> bool {
        self.detector_ids.contains(&id)
    }

    // ---------------------------------------------------------------------
    // Adding events

    /// Appends one event.
    ///
    /// A record richer than the stored layout widens the list first. The
    /// sort tag survives when the new record does not precede the current
    /// last record under that order; otherwise the list becomes unsorted.
    pub fn add_event<E: Event>(&mut self, event: E) {
        if E::TYPE > self.event_type() {
            self.widen(E::TYPE);
        }
        self.events.push(event);
        if self.order != SortOrder::Unsorted && !self.tail_in_order() {
            self.order = SortOrder::Unsorted;
        }
        self.touch();
    }

    fn tail_in_order(&self) -> bool {
        let order = self.order;
        with_events!(&self.events, events => match events.as_slice() {
            [.., prev, last] => order.compare(prev, last) != Ordering::Greater,
            _ => true,
        })
    }

    /// Marks an empty list as sorted in `order`, so that in-order appends
    /// keep the tag without a sort pass.
    ///
    /// # Errors
    /// `InvalidArgument` if the list already holds events.
    pub fn declare_sorted(&mut self, order: SortOrder) -> Result<()> {
        if !self.is_empty() {
            return Err(Error::InvalidArgument(
                "only an empty event list can be declared sorted".into(),
            ));
        }
        self.order = order;
        Ok(())
    }

    /// Removes all events; detector IDs are kept.
    pub fn clear(&mut self) {
        self.events = EventStorage::empty(self.event_type());
        self.order = SortOrder::Unsorted;
        self.touch();
    }

    // ---------------------------------------------------------------------
    // Access

    /// Event at `index`, widened to the weighted layout.
    ///
    /// # Errors
    /// `IndexOutOfRange` past the end of the list.
    pub fn event(&self, index: usize) -> Result<WeightedEvent> {
        Error::check_index(index, self.len())?;
        Ok(with_events!(&self.events, events => events[index].to_weighted()))
    }

    /// All times-of-flight in storage order.
    #[must_use]
    pub fn tofs(&self) -> Vec<f64> {
        with_events!(&self.events, events => events.iter().map(Event::tof).collect())
    }

    /// All weights in storage order.
    #[must_use]
    pub fn weights(&self) -> Vec<f64> {
        with_events!(&self.events, events => events.iter().map(Event::weight).collect())
    }

    /// All squared errors in storage order.
    #[must_use]
    pub fn error_squareds(&self) -> Vec<f64> {
        with_events!(&self.events, events => events.iter().map(Event::error_squared).collect())
    }

    /// All pulse times in storage order.
    #[must_use]
    pub fn pulse_times(&self) -> Vec<PulseTime> {
        with_events!(&self.events, events => events.iter().map(Event::pulse_time).collect())
    }

    /// Smallest time-of-flight, ignoring NaN.
    #[must_use]
    pub fn tof_min(&self) -> Option<f64> {
        with_events!(&self.events, events => {
            if self.order == SortOrder::Tof {
                events.iter().map(Event::tof).find(|tof| !tof.is_nan())
            } else {
                events.iter().map(Event::tof).filter(|tof| !tof.is_nan()).reduce(f64::min)
            }
        })
    }

    /// Largest time-of-flight, ignoring NaN.
    #[must_use]
    pub fn tof_max(&self) -> Option<f64> {
        with_events!(&self.events, events => {
            if self.order == SortOrder::Tof {
                // NaN sorts last.
                events.iter().rev().map(Event::tof).find(|tof| !tof.is_nan())
            } else {
                events.iter().map(Event::tof).filter(|tof| !tof.is_nan()).reduce(f64::max)
            }
        })
    }

    /// Earliest pulse time.
    #[must_use]
    pub fn pulse_time_min(&self) -> Option<PulseTime> {
        with_events!(&self.events, events => {
            if self.order.satisfies(SortOrder::PulseTime) {
                events.first().map(Event::pulse_time)
            } else {
                events.iter().map(Event::pulse_time).min()
            }
        })
    }

    /// Latest pulse time.
    #[must_use]
    pub fn pulse_time_max(&self) -> Option<PulseTime> {
        with_events!(&self.events, events => {
            if self.order.satisfies(SortOrder::PulseTime) {
                events.last().map(Event::pulse_time)
            } else {
                events.iter().map(Event::pulse_time).max()
            }
        })
    }

    // ---------------------------------------------------------------------
    // Sorting

    /// Sorts into `order`; a no-op when the list already satisfies it.
    pub fn sort(&mut self, order: SortOrder) {
        self.sort_with_threshold(order, PARALLEL_SORT_THRESHOLD);
    }

    /// [`EventList::sort`] with an explicit parallel-sort cutoff.
    pub fn sort_with_threshold(&mut self, order: SortOrder, parallel_threshold: usize) {
        if self.order.satisfies(order) {
            return;
        }
        with_events!(&mut self.events, events => sort_events(events, order, parallel_threshold));
        log::trace!("sorted {} events by {order}", self.len());
        self.order = order;
    }

    /// Returns true if the list satisfies `order`.
    #[must_use]
    pub fn is_sorted_by(&self, order: SortOrder) -> bool {
        self.order.satisfies(order)
    }

    // ---------------------------------------------------------------------
    // Switching layout

    /// Widens the stored records to `target`.
    ///
    /// # Errors
    /// `NotSupported` for a narrowing switch, which would lose weights or
    /// pulse times.
    pub fn switch_to(&mut self, target: EventType) -> Result<()> {
        let current = self.event_type();
        if target == current {
            return Ok(());
        }
        if target < current {
            return Err(Error::NotSupported(format!(
                "cannot switch event list from {current} to {target}"
            )));
        }
        self.widen(target);
        self.touch();
        Ok(())
    }

    /// Widens the storage; pulse-time orders do not survive losing the
    /// pulse times.
    fn widen(&mut self, target: EventType) {
        self.events.widen(target);
        if !target.has_pulse_time() && self.order.satisfies(SortOrder::PulseTime) {
            self.order = SortOrder::Unsorted;
        }
    }

    // ---------------------------------------------------------------------
    // Combining

    /// Appends all events of `other` and unions the detector IDs.
    ///
    /// The interleaving of the two sources is unknown, so the result is
    /// always unsorted.
    pub fn merge(&mut self, other: &EventList) {
        let target = self.event_type().max(other.event_type());
        self.widen(target);
        self.events.extend_from(&other.events);
        self.detector_ids.extend(other.detector_ids.iter().copied());
        self.order = SortOrder::Unsorted;
        self.touch();
    }

    /// Appends all events of `other` with negated weights.
    ///
    /// Squared errors are carried unchanged: variances add under
    /// subtraction. Tof lists switch to the weighted layout.
    pub fn subtract(&mut self, other: &EventList) {
        let target = self
            .event_type()
            .max(other.event_type())
            .max(EventType::Weighted);
        self.widen(target);
        with_events!(&other.events, source => {
            for event in source {
                let mut negated = event.to_weighted();
                negated.set_weight(-event.weight(), event.error_squared());
                self.events.push(negated);
            }
        });
        self.detector_ids.extend(other.detector_ids.iter().copied());
        self.order = SortOrder::Unsorted;
        self.touch();
    }

    /// Scales every weight by `value ± error`.
    ///
    /// New squared error is `err² · value² + weight² · error²`. Tof lists
    /// switch to the weighted layout first.
    pub fn multiply(&mut self, value: f64, error: f64) {
        if self.event_type() == EventType::Tof {
            self.widen(EventType::Weighted);
        }
        match &mut self.events {
            EventStorage::Weighted(events) => scale_weights(events, value, error),
            EventStorage::WeightedNoTime(events) => scale_weights(events, value, error),
            EventStorage::Tof(_) => {}
        }
        self.touch();
    }

    // ---------------------------------------------------------------------
    // Time-of-flight transforms

    /// Applies `f` to every time-of-flight in place.
    ///
    /// Unless the caller guarantees `f` is non-decreasing, the list is
    /// marked unsorted.
    pub fn convert_tof<F: Fn(f64) -> f64>(&mut self, f: F, monotonicity: Monotonicity) {
        with_events!(&mut self.events, events => {
            for event in events.iter_mut() {
                event.set_tof(f(event.tof()));
            }
        });
        if monotonicity == Monotonicity::Unknown {
            self.order = SortOrder::Unsorted;
        }
        self.touch();
    }

    /// Multiplies every time-of-flight by `factor`.
    pub fn scale_tof(&mut self, factor: f64) {
        let monotonicity = if factor >= 0.0 {
            Monotonicity::Increasing
        } else {
            Monotonicity::Unknown
        };
        self.convert_tof(|tof| tof * factor, monotonicity);
    }

    /// Adds `offset` to every time-of-flight.
    pub fn add_tof(&mut self, offset: f64) {
        self.convert_tof(|tof| tof + offset, Monotonicity::Increasing);
    }

    /// Removes events with time-of-flight in `[min_tof, max_tof]`, both ends
    /// included.
    pub fn mask_tof(&mut self, min_tof: f64, max_tof: f64) {
        with_events!(&mut self.events, events => {
            events.retain(|e| !(e.tof() >= min_tof && e.tof() <= max_tof));
        });
        self.touch();
    }

    // ---------------------------------------------------------------------
    // Queries

    /// Sums weights and squared errors of events with time-of-flight in
    /// `[min_x, max_x)`, or of every event if `entire_range` is set.
    ///
    /// A list sorted by time-of-flight uses binary-search bounds; any other
    /// order falls back to a linear scan. Nothing is mutated.
    #[must_use]
    pub fn integrate(&self, min_x: f64, max_x: f64, entire_range: bool) -> Integral {
        with_events!(&self.events, events => {
            if entire_range {
                Integral::accumulate(events)
            } else if self.order == SortOrder::Tof {
                let lo = events.partition_point(|e| e.tof() < min_x);
                let hi = events.partition_point(|e| e.tof() < max_x).max(lo);
                Integral::accumulate(&events[lo..hi])
            } else {
                events
                    .iter()
                    .filter(|e| e.tof() >= min_x && e.tof() < max_x)
                    .fold(Integral::default(), |acc, e| Integral {
                        weight: acc.weight + e.weight(),
                        error_squared: acc.error_squared + e.error_squared(),
                    })
            }
        })
    }

    /// New list holding the events with time-of-flight in `[min_tof, max_tof)`.
    ///
    /// The result keeps this list's layout, order and detector IDs.
    #[must_use]
    pub fn filter_by_time(&self, min_tof: f64, max_tof: f64) -> EventList {
        let sorted = self.order == SortOrder::Tof;
        let events = map_events!(&self.events, events => {
            if sorted {
                let lo = events.partition_point(|e| e.tof() < min_tof);
                let hi = events.partition_point(|e| e.tof() < max_tof).max(lo);
                events[lo..hi].to_vec()
            } else {
                events
                    .iter()
                    .filter(|e| e.tof() >= min_tof && e.tof() < max_tof)
                    .copied()
                    .collect()
            }
        });
        self.derived(events)
    }

    /// New list holding the events with pulse time in `[start, stop)`.
    ///
    /// # Errors
    /// `NotSupported` for lists without pulse times.
    pub fn filter_by_pulse_time(&self, start: PulseTime, stop: PulseTime) -> Result<EventList> {
        if !self.event_type().has_pulse_time() {
            return Err(Error::NotSupported(
                "event list has no pulse times to filter on".into(),
            ));
        }
        let sorted = self.order.satisfies(SortOrder::PulseTime);
        let events = map_events!(&self.events, events => {
            if sorted {
                let lo = events.partition_point(|e| e.pulse_time() < start);
                let hi = events.partition_point(|e| e.pulse_time() < stop).max(lo);
                events[lo..hi].to_vec()
            } else {
                events
                    .iter()
                    .filter(|e| e.pulse_time() >= start && e.pulse_time() < stop)
                    .copied()
                    .collect()
            }
        });
        Ok(self.derived(events))
    }

    fn derived(&self, events: EventStorage) -> EventList {
        EventList {
            events,
            detector_ids: self.detector_ids.clone(),
            order: self.order,
            generation: next_generation(),
        }
    }

    // ---------------------------------------------------------------------
    // Histogramming

    /// Bins the events into `edges` on `axis`, sorting first if needed.
    ///
    /// # Errors
    /// `NotSupported` for pulse-time binning of a list without pulse times.
    pub fn histogram(
        &mut self,
        edges: &BinEdges,
        axis: BinAxis,
        skip_error: bool,
    ) -> Result<Counts> {
        self.check_axis(axis)?;
        self.sort(required_order(axis));
        self.histogram_sorted(edges, axis, skip_error)
    }

    /// Bins the events without sorting.
    ///
    /// # Errors
    /// `NotSorted` unless the list is already ordered on `axis`;
    /// `NotSupported` for pulse-time binning of a list without pulse times.
    pub fn histogram_sorted(
        &self,
        edges: &BinEdges,
        axis: BinAxis,
        skip_error: bool,
    ) -> Result<Counts> {
        self.check_axis(axis)?;
        let required = required_order(axis);
        if !self.order.satisfies(required) {
            return Err(Error::NotSorted { required });
        }
        Ok(with_events!(&self.events, events => {
            bin_sorted_events(events, edges, axis, skip_error)
        }))
    }

    fn check_axis(&self, axis: BinAxis) -> Result<()> {
        if axis == BinAxis::PulseTime && !self.event_type().has_pulse_time() {
            return Err(Error::NotSupported(
                "event list has no pulse times to bin on".into(),
            ));
        }
        Ok(())
    }
}

/// Order a list must be in before binning on `axis`.
#[must_use]
pub fn required_order(axis: BinAxis) -> SortOrder {
    match axis {
        BinAxis::Tof => SortOrder::Tof,
        BinAxis::PulseTime => SortOrder::PulseTime,
    }
}

impl<E: Event> Extend<E> for EventList {
    fn extend<I: IntoIterator<Item = E>>(&mut self, iter: I) {
        for event in iter {
            self.add_event(event);
        }
    }
}

impl<E: Event> FromIterator<E> for EventList {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        let mut list = EventList::with_type(E::TYPE);
        list.extend(iter);
        list
    }
}

fn scale_weights<E: WeightedRecord>(events: &mut [E], value: f64, error: f64) {
    let value_squared = value * value;
    let error_squared = error * error;
    for event in events {
        let weight = event.weight();
        let new_error = event.error_squared() * value_squared + weight * weight * error_squared;
        event.set_weight(weight * value, new_error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tof_list(tofs: &[f64]) -> EventList {
        tofs.iter()
            .map(|&tof| TofEvent::new(tof, PulseTime(0)))
            .collect()
    }

    #[test]
    fn test_add_event_and_count() {
        let mut list = EventList::new();
        assert!(list.is_empty());
        list.add_event(TofEvent::new(1.0, PulseTime(10)));
        list.add_event(TofEvent::new(2.0, PulseTime(20)));
        assert_eq!(list.number_events(), 2);
        assert_eq!(list.event_type(), EventType::Tof);
        assert_eq!(list.sort_order(), SortOrder::Unsorted);
    }

    #[test]
    fn test_add_event_keeps_order_when_appending_in_order() {
        let mut list = tof_list(&[3.0, 1.0, 2.0]);
        list.sort(SortOrder::Tof);
        list.add_event(TofEvent::new(3.0, PulseTime(0)));
        assert_eq!(list.sort_order(), SortOrder::Tof);
        list.add_event(TofEvent::new(0.5, PulseTime(0)));
        assert_eq!(list.sort_order(), SortOrder::Unsorted);
    }

    #[test]
    fn test_declare_sorted_for_ordered_loads() {
        let mut list = EventList::new();
        list.declare_sorted(SortOrder::PulseTime).unwrap();
        for i in 0..5 {
            list.add_event(TofEvent::new(f64::from(5 - i), PulseTime(i64::from(i))));
        }
        assert_eq!(list.sort_order(), SortOrder::PulseTime);
        assert!(list.declare_sorted(SortOrder::Tof).is_err());
    }

    #[test]
    fn test_add_weighted_widens() {
        let mut list = tof_list(&[1.0]);
        list.add_event(WeightedEvent::new(2.0, PulseTime(0), 2.5, 0.5));
        assert_eq!(list.event_type(), EventType::Weighted);
        assert_eq!(list.weights(), vec![1.0, 2.5]);
        assert_eq!(list.error_squareds(), vec![1.0, 0.5]);
    }

    #[test]
    fn test_event_index_out_of_range() {
        let list = tof_list(&[1.0, 2.0]);
        assert!(list.event(1).is_ok());
        assert_eq!(
            list.event(2),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        );
    }

    #[test]
    fn test_sort_same_key_is_noop() {
        let mut list = tof_list(&[2.0, 1.0]);
        list.sort(SortOrder::Tof);
        let before = list.clone();
        list.sort(SortOrder::Tof);
        assert_eq!(list, before);
        assert_eq!(list.tofs(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_sort_by_other_key_rederives() {
        let mut list: EventList = [
            TofEvent::new(1.0, PulseTime(30)),
            TofEvent::new(2.0, PulseTime(10)),
            TofEvent::new(3.0, PulseTime(20)),
        ]
        .into_iter()
        .collect();
        list.sort(SortOrder::Tof);
        list.sort(SortOrder::PulseTime);
        assert_eq!(list.sort_order(), SortOrder::PulseTime);
        assert_eq!(list.tofs(), vec![2.0, 3.0, 1.0]);
        list.sort(SortOrder::Tof);
        assert_eq!(list.tofs(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_sort_does_not_bump_generation() {
        let mut list = tof_list(&[2.0, 1.0]);
        let generation = list.generation();
        list.sort(SortOrder::Tof);
        assert_eq!(list.generation(), generation);
    }

    #[test]
    fn test_integrate_sorted_and_unsorted_agree() {
        let mut list = tof_list(&[5.0, 1.0, 3.0, 2.0, 4.0, 6.0]);
        let unsorted = list.integrate(2.0, 5.0, false);
        list.sort(SortOrder::Tof);
        let sorted = list.integrate(2.0, 5.0, false);
        assert_eq!(unsorted, sorted);
        assert_relative_eq!(sorted.weight, 3.0);
        assert_relative_eq!(list.integrate(0.0, 0.0, true).weight, 6.0);
        assert_relative_eq!(list.integrate(5.0, 2.0, false).weight, 0.0);
    }

    #[test]
    fn test_integrate_negative_weights() {
        let mut list = EventList::with_type(EventType::Weighted);
        list.add_event(WeightedEvent::new(1.0, PulseTime(0), 4.0, 4.0));
        list.add_event(WeightedEvent::new(1.5, PulseTime(0), -1.0, 1.0));
        let integral = list.integrate(0.0, 2.0, false);
        assert_relative_eq!(integral.weight, 3.0);
        assert_relative_eq!(integral.error_squared, 5.0);
    }

    #[test]
    fn test_filter_by_time_does_not_mutate() {
        let mut list = tof_list(&[1.0, 2.0, 3.0, 4.0]);
        list.add_detector_id(7);
        let generation = list.generation();
        let filtered = list.filter_by_time(2.0, 4.0);
        assert_eq!(filtered.tofs(), vec![2.0, 3.0]);
        assert!(filtered.has_detector_id(7));
        assert_eq!(list.number_events(), 4);
        assert_eq!(list.generation(), generation);
    }

    #[test]
    fn test_filter_by_pulse_time() {
        let mut list: EventList = (0..10)
            .map(|i| TofEvent::new(1.0, PulseTime(i * 100)))
            .collect();
        list.sort(SortOrder::PulseTime);
        let filtered = list
            .filter_by_pulse_time(PulseTime(200), PulseTime(500))
            .unwrap();
        assert_eq!(filtered.number_events(), 3);
        assert_eq!(filtered.sort_order(), SortOrder::PulseTime);

        let no_time = EventList::with_type(EventType::WeightedNoTime);
        assert!(no_time
            .filter_by_pulse_time(PulseTime(0), PulseTime(1))
            .is_err());
    }

    #[test]
    fn test_merge_is_unsorted_and_unions_detectors() {
        let mut a = tof_list(&[1.0, 2.0]);
        a.add_detector_id(1);
        a.sort(SortOrder::Tof);
        let mut b = tof_list(&[0.5, 3.0, 4.0]);
        b.add_detector_id(2);
        b.sort(SortOrder::Tof);

        a.merge(&b);
        assert_eq!(a.number_events(), 5);
        assert_eq!(a.sort_order(), SortOrder::Unsorted);
        assert_eq!(a.detector_ids().iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_merge_widens_to_richer_layout() {
        let mut a = tof_list(&[1.0]);
        let mut b = EventList::with_type(EventType::WeightedNoTime);
        b.add_event(WeightedEventNoTime::new(2.0, 3.0, 9.0));
        a.merge(&b);
        assert_eq!(a.event_type(), EventType::WeightedNoTime);
        assert_eq!(a.weights(), vec![1.0, 3.0]);
    }

    #[test]
    fn test_subtract_negates_weights_keeps_variance() {
        let mut sample = tof_list(&[1.0, 1.0]);
        let background = tof_list(&[1.0]);
        sample.subtract(&background);
        assert_eq!(sample.event_type(), EventType::Weighted);
        let integral = sample.integrate(0.0, 0.0, true);
        assert_relative_eq!(integral.weight, 1.0);
        assert_relative_eq!(integral.error_squared, 3.0);
    }

    #[test]
    fn test_multiply_propagates_error() {
        let mut list = tof_list(&[1.0]);
        list.multiply(2.0, 0.5);
        let event = list.event(0).unwrap();
        assert_relative_eq!(event.weight(), 2.0);
        // 1 * 4 + 1 * 0.25
        assert_relative_eq!(event.error_squared(), 4.25);

        list.multiply(-1.0, 0.0);
        let event = list.event(0).unwrap();
        assert_relative_eq!(event.weight(), -2.0);
        assert!(event.error_squared() >= 0.0);
    }

    #[test]
    fn test_convert_tof_order_tracking() {
        let mut list = tof_list(&[1.0, 2.0, 3.0]);
        list.sort(SortOrder::Tof);
        list.add_tof(10.0);
        assert_eq!(list.sort_order(), SortOrder::Tof);
        assert_eq!(list.tofs(), vec![11.0, 12.0, 13.0]);

        list.scale_tof(-1.0);
        assert_eq!(list.sort_order(), SortOrder::Unsorted);

        list.sort(SortOrder::Tof);
        list.convert_tof(|t| t * t, Monotonicity::Unknown);
        assert_eq!(list.sort_order(), SortOrder::Unsorted);
    }

    #[test]
    fn test_mask_tof() {
        let mut list = tof_list(&[1.0, 2.0, 3.0, 4.0]);
        list.mask_tof(2.0, 3.5);
        assert_eq!(list.tofs(), vec![1.0, 4.0]);

        let mut list = tof_list(&[1.0, 2.0, 4.0]);
        list.mask_tof(2.0, 4.0);
        assert_eq!(list.tofs(), vec![1.0]);
    }

    #[test]
    fn test_switch_to() {
        let mut list: EventList = [TofEvent::new(1.0, PulseTime(5))].into_iter().collect();
        list.switch_to(EventType::Weighted).unwrap();
        assert_eq!(list.pulse_times(), vec![PulseTime(5)]);
        list.switch_to(EventType::WeightedNoTime).unwrap();
        assert_eq!(list.pulse_times(), vec![PulseTime(0)]);
        assert!(matches!(
            list.switch_to(EventType::Tof),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn test_dropping_pulse_times_drops_pulse_time_order() {
        let mut list: EventList = [
            TofEvent::new(5.0, PulseTime(1)),
            TofEvent::new(1.0, PulseTime(2)),
        ]
        .into_iter()
        .collect();
        list.sort(SortOrder::PulseTimeTof);
        list.switch_to(EventType::WeightedNoTime).unwrap();
        assert_eq!(list.sort_order(), SortOrder::Unsorted);
        list.sort(SortOrder::PulseTimeTof);
        assert_eq!(list.tofs(), vec![1.0, 5.0]);

        let mut list = EventList::new();
        list.declare_sorted(SortOrder::PulseTime).unwrap();
        list.add_event(TofEvent::new(5.0, PulseTime(1)));
        list.add_event(TofEvent::new(1.0, PulseTime(2)));
        list.add_event(WeightedEventNoTime::new(3.0, 1.0, 1.0));
        assert_eq!(list.event_type(), EventType::WeightedNoTime);
        assert_eq!(list.sort_order(), SortOrder::Unsorted);

        let mut list = tof_list(&[2.0, 1.0]);
        list.sort(SortOrder::Tof);
        list.switch_to(EventType::WeightedNoTime).unwrap();
        assert_eq!(list.sort_order(), SortOrder::Tof);
    }

    #[test]
    fn test_negative_nan_tof_is_ignored() {
        let mut list = tof_list(&[1.0, -f64::NAN, 3.0]);
        let edges = BinEdges::new(vec![0.0, 2.0, 4.0]).unwrap();
        let counts = list.histogram(&edges, BinAxis::Tof, false).unwrap();
        assert_eq!(counts.y, vec![1.0, 1.0]);
        assert_eq!(&list.tofs()[..2], &[1.0, 3.0]);
        assert!(list.tofs()[2].is_nan());
        assert_relative_eq!(list.integrate(0.0, 4.0, false).weight, 2.0);
        assert_eq!(list.tof_min(), Some(1.0));
        assert_eq!(list.tof_max(), Some(3.0));
    }

    #[test]
    fn test_nan_from_tof_conversion_is_ignored() {
        let mut list = tof_list(&[1.0, -4.0, 3.0]);
        // A negative argument yields NaN at runtime.
        list.convert_tof(f64::sqrt, Monotonicity::Unknown);
        let edges = BinEdges::new(vec![0.0, 1.5, 4.0]).unwrap();
        let counts = list.histogram(&edges, BinAxis::Tof, false).unwrap();
        assert_eq!(counts.y, vec![1.0, 1.0]);
        assert_relative_eq!(list.integrate(0.0, 4.0, false).weight, 2.0);
        assert_relative_eq!(list.integrate(0.0, 0.0, true).weight, 3.0);
    }

    #[test]
    fn test_negative_error_squared_never_reaches_histogram() {
        let mut list = EventList::with_type(EventType::Weighted);
        list.add_event(WeightedEvent::new(1.0, PulseTime(0), 1.0, -4.0));
        list.add_event(WeightedEvent::new(1.5, PulseTime(0), 1.0, 1.0));
        let edges = BinEdges::new(vec![0.0, 2.0]).unwrap();
        let counts = list.histogram(&edges, BinAxis::Tof, false).unwrap();
        assert_eq!(counts.y, vec![2.0]);
        assert_relative_eq!(counts.e[0], 1.0);
        assert!(WeightedEvent::try_new(1.0, PulseTime(0), 1.0, -4.0).is_err());
    }

    #[test]
    fn test_min_max() {
        let list: EventList = [
            TofEvent::new(3.0, PulseTime(7)),
            TofEvent::new(1.0, PulseTime(9)),
            TofEvent::new(2.0, PulseTime(8)),
        ]
        .into_iter()
        .collect();
        assert_eq!(list.tof_min(), Some(1.0));
        assert_eq!(list.tof_max(), Some(3.0));
        assert_eq!(list.pulse_time_min(), Some(PulseTime(7)));
        assert_eq!(list.pulse_time_max(), Some(PulseTime(9)));
        assert_eq!(EventList::new().tof_min(), None);
    }

    #[test]
    fn test_histogram_sorts_on_demand() {
        let mut list = tof_list(&[3.0, 1.5, 1.0]);
        let edges = BinEdges::new(vec![0.0, 2.0, 4.0]).unwrap();
        assert_eq!(
            list.histogram_sorted(&edges, BinAxis::Tof, false),
            Err(Error::NotSorted {
                required: SortOrder::Tof
            })
        );
        let counts = list.histogram(&edges, BinAxis::Tof, false).unwrap();
        assert_eq!(counts.y, vec![2.0, 1.0]);
        assert_relative_eq!(counts.e[0], 2.0_f64.sqrt());
        assert_eq!(list.sort_order(), SortOrder::Tof);
    }

    #[test]
    fn test_pulse_time_histogram_requires_pulse_times() {
        let mut list = EventList::with_type(EventType::WeightedNoTime);
        list.add_event(WeightedEventNoTime::new(1.0, 1.0, 1.0));
        let edges = BinEdges::new(vec![0.0, 1.0]).unwrap();
        assert!(matches!(
            list.histogram(&edges, BinAxis::PulseTime, false),
            Err(Error::NotSupported(_))
        ));
    }
}
