//! Event record types.
//!
//! One record is one detected particle. Three layouts trade memory for
//! information:
//!
//! - [`TofEvent`]: time-of-flight and pulse time; weight is implicitly 1.
//! - [`WeightedEvent`]: adds an explicit weight and squared error.
//! - [`WeightedEventNoTime`]: weighted, but without pulse time.
//!
//! Unweighted events use the Poisson counting convention: weight 1 and
//! squared error 1.

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of one physical detector pixel.
pub type DetectorId = i32;

/// Absolute time of the source pulse an event belongs to, in nanoseconds
/// since the epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PulseTime(pub i64);

impl PulseTime {
    /// Creates a pulse time from nanoseconds since the epoch.
    #[inline]
    #[must_use]
    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Returns the raw nanosecond value.
    #[inline]
    #[must_use]
    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Returns the value as a float, the unit used on binning axes.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> f64 {
        self.0 as f64
    }
}

/// Storage layout of the events held by a list.
///
/// The variants are ordered: a list can only move rightwards
/// (`Tof` → `Weighted` → `WeightedNoTime`), since every step loses nothing
/// the next layout cannot express except pulse time in the last step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EventType {
    /// [`TofEvent`] records.
    Tof,
    /// [`WeightedEvent`] records.
    Weighted,
    /// [`WeightedEventNoTime`] records.
    WeightedNoTime,
}

impl EventType {
    /// Returns true if records of this layout carry a pulse time.
    #[inline]
    #[must_use]
    pub fn has_pulse_time(self) -> bool {
        !matches!(self, Self::WeightedNoTime)
    }

    /// Returns true if records of this layout carry explicit weights.
    #[inline]
    #[must_use]
    pub fn is_weighted(self) -> bool {
        !matches!(self, Self::Tof)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Tof => "tof",
            Self::Weighted => "weighted",
            Self::WeightedNoTime => "weighted-no-time",
        };
        f.write_str(name)
    }
}

/// Common interface of every event record layout.
pub trait Event: Copy + Send + Sync + 'static {
    /// Layout tag of this record type.
    const TYPE: EventType;

    /// Time-of-flight.
    fn tof(&self) -> f64;

    /// Pulse time. Layouts without pulse time report zero.
    fn pulse_time(&self) -> PulseTime;

    /// Weight (1 for unweighted events).
    fn weight(&self) -> f64;

    /// Squared weight error (1 for unweighted events).
    fn error_squared(&self) -> f64;

    /// Overwrites the time-of-flight.
    fn set_tof(&mut self, tof: f64);

    /// Weight error as a standard deviation.
    #[inline]
    fn error(&self) -> f64 {
        self.error_squared().sqrt()
    }

    /// Widens this record to the weighted layout.
    #[inline]
    fn to_weighted(&self) -> WeightedEvent {
        WeightedEvent {
            tof: self.tof(),
            pulse_time: self.pulse_time(),
            weight: self.weight(),
            error_squared: self.error_squared(),
        }
    }

    /// Widens this record to the weighted layout, dropping the pulse time.
    #[inline]
    fn to_weighted_no_time(&self) -> WeightedEventNoTime {
        WeightedEventNoTime {
            tof: self.tof(),
            weight: self.weight(),
            error_squared: self.error_squared(),
        }
    }
}

/// Event records whose weight can be rewritten.
pub trait WeightedRecord: Event {
    /// Overwrites weight and squared error.
    fn set_weight(&mut self, weight: f64, error_squared: f64);
}

/// Minimal record: time-of-flight plus pulse time, unit weight.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TofEvent {
    /// Time-of-flight.
    pub tof: f64,
    /// Pulse time.
    pub pulse_time: PulseTime,
}

impl TofEvent {
    /// Creates a new unweighted event.
    #[inline]
    #[must_use]
    pub fn new(tof: f64, pulse_time: PulseTime) -> Self {
        Self { tof, pulse_time }
    }
}

impl Event for TofEvent {
    const TYPE: EventType = EventType::Tof;

    #[inline]
    fn tof(&self) -> f64 {
        self.tof
    }

    #[inline]
    fn pulse_time(&self) -> PulseTime {
        self.pulse_time
    }

    #[inline]
    fn weight(&self) -> f64 {
        1.0
    }

    #[inline]
    fn error_squared(&self) -> f64 {
        1.0
    }

    #[inline]
    fn set_tof(&mut self, tof: f64) {
        self.tof = tof;
    }
}

/// Weighted record with pulse time.
///
/// Weight and squared error are only set through constructors and
/// [`WeightedRecord::set_weight`], which keep the squared error
/// non-negative.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WeightedEvent {
    /// Time-of-flight.
    pub tof: f64,
    /// Pulse time.
    pub pulse_time: PulseTime,
    weight: f64,
    #[cfg_attr(feature = "serde", serde(deserialize_with = "deserialize_error_squared"))]
    error_squared: f64,
}

impl WeightedEvent {
    /// Creates a weighted event; the weight may be negative.
    ///
    /// A negative or NaN `error_squared` is stored as zero. Use
    /// [`WeightedEvent::try_new`] to reject it instead.
    #[inline]
    #[must_use]
    pub fn new(tof: f64, pulse_time: PulseTime, weight: f64, error_squared: f64) -> Self {
        Self {
            tof,
            pulse_time,
            weight,
            error_squared: clamp_error_squared(error_squared),
        }
    }

    /// Fallible constructor for untrusted input.
    ///
    /// # Errors
    /// `InvalidArgument` if `error_squared` is negative or NaN.
    pub fn try_new(
        tof: f64,
        pulse_time: PulseTime,
        weight: f64,
        error_squared: f64,
    ) -> Result<Self> {
        check_error_squared(error_squared)?;
        Ok(Self::new(tof, pulse_time, weight, error_squared))
    }
}

impl Event for WeightedEvent {
    const TYPE: EventType = EventType::Weighted;

    #[inline]
    fn tof(&self) -> f64 {
        self.tof
    }

    #[inline]
    fn pulse_time(&self) -> PulseTime {
        self.pulse_time
    }

    #[inline]
    fn weight(&self) -> f64 {
        self.weight
    }

    #[inline]
    fn error_squared(&self) -> f64 {
        self.error_squared
    }

    #[inline]
    fn set_tof(&mut self, tof: f64) {
        self.tof = tof;
    }
}

impl WeightedRecord for WeightedEvent {
    #[inline]
    fn set_weight(&mut self, weight: f64, error_squared: f64) {
        self.weight = weight;
        self.error_squared = clamp_error_squared(error_squared);
    }
}

impl From<TofEvent> for WeightedEvent {
    fn from(event: TofEvent) -> Self {
        event.to_weighted()
    }
}

/// Weighted record without pulse time.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WeightedEventNoTime {
    /// Time-of-flight.
    pub tof: f64,
    weight: f64,
    #[cfg_attr(feature = "serde", serde(deserialize_with = "deserialize_error_squared"))]
    error_squared: f64,
}

impl WeightedEventNoTime {
    /// Creates a weighted event without pulse time.
    ///
    /// A negative or NaN `error_squared` is stored as zero.
    #[inline]
    #[must_use]
    pub fn new(tof: f64, weight: f64, error_squared: f64) -> Self {
        Self {
            tof,
            weight,
            error_squared: clamp_error_squared(error_squared),
        }
    }

    /// Fallible constructor for untrusted input.
    ///
    /// # Errors
    /// `InvalidArgument` if `error_squared` is negative or NaN.
    pub fn try_new(tof: f64, weight: f64, error_squared: f64) -> Result<Self> {
        check_error_squared(error_squared)?;
        Ok(Self::new(tof, weight, error_squared))
    }
}

impl Event for WeightedEventNoTime {
    const TYPE: EventType = EventType::WeightedNoTime;

    #[inline]
    fn tof(&self) -> f64 {
        self.tof
    }

    #[inline]
    fn pulse_time(&self) -> PulseTime {
        PulseTime(0)
    }

    #[inline]
    fn weight(&self) -> f64 {
        self.weight
    }

    #[inline]
    fn error_squared(&self) -> f64 {
        self.error_squared
    }

    #[inline]
    fn set_tof(&mut self, tof: f64) {
        self.tof = tof;
    }
}

impl WeightedRecord for WeightedEventNoTime {
    #[inline]
    fn set_weight(&mut self, weight: f64, error_squared: f64) {
        self.weight = weight;
        self.error_squared = clamp_error_squared(error_squared);
    }
}

impl From<TofEvent> for WeightedEventNoTime {
    fn from(event: TofEvent) -> Self {
        event.to_weighted_no_time()
    }
}

impl From<WeightedEvent> for WeightedEventNoTime {
    fn from(event: WeightedEvent) -> Self {
        event.to_weighted_no_time()
    }
}

#[inline]
fn clamp_error_squared(error_squared: f64) -> f64 {
    if error_squared >= 0.0 {
        error_squared
    } else {
        0.0
    }
}

#[cfg(feature = "serde")]
fn deserialize_error_squared<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    check_error_squared(value).map_err(serde::de::Error::custom)?;
    Ok(value)
}

fn check_error_squared(error_squared: f64) -> Result<()> {
    if error_squared >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "squared weight error must be non-negative, got {error_squared}"
        )))
    }
}
