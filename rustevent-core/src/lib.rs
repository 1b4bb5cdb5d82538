//! rustevent-core: Event records and on-demand histogramming.
//!
//! This crate provides the per-spectrum event data model for
//! time-of-flight instruments: event record layouts, event lists with
//! tracked sort order, validated bin edges with shared copy-on-write
//! buffers, and the single-pass materializer that turns sorted events into
//! counts and errors.
//!

pub mod error;
pub mod event;
pub mod event_list;
pub mod histogram;
pub mod materialize;
pub mod sort;

pub use error::{Error, Result};
pub use event::{
    DetectorId, Event, EventType, PulseTime, TofEvent, WeightedEvent, WeightedEventNoTime,
    WeightedRecord,
};
pub use event_list::{required_order, EventList, Integral, Monotonicity};
pub use histogram::{BinAxis, BinEdges, Counts, CowVec, Histogram};
pub use materialize::bin_sorted_events;
pub use sort::{SortOrder, PARALLEL_SORT_THRESHOLD};
