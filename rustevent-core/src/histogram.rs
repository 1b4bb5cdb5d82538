//! Histogram value types: shared buffers, bin edges and materialized views.

use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Upper bound on the number of bins rebin parameters may generate.
pub const MAX_REBIN_BINS: usize = 100_000_000;

/// Reference-counted `f64` buffer with copy-on-write mutation.
///
/// Clones share one allocation. [`CowVec::make_mut`] copies the buffer only
/// if another clone is still alive.
#[derive(Debug, Clone, Default)]
pub struct CowVec(Arc<Vec<f64>>);

impl CowVec {
    /// Wraps a vector.
    #[must_use]
    pub fn new(values: Vec<f64>) -> Self {
        Self(Arc::new(values))
    }

    /// Buffer of `len` copies of `value`.
    #[must_use]
    pub fn filled(len: usize, value: f64) -> Self {
        Self::new(vec![value; len])
    }

    /// Returns the values.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Mutable access, detaching from other clones first if shared.
    pub fn make_mut(&mut self) -> &mut Vec<f64> {
        Arc::make_mut(&mut self.0)
    }

    /// Returns true if both handles point at the same allocation.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Returns true if other clones of this buffer are alive.
    #[inline]
    #[must_use]
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.0) > 1
    }

    /// Unwraps the vector, copying only if shared.
    #[must_use]
    pub fn into_vec(self) -> Vec<f64> {
        Arc::try_unwrap(self.0).unwrap_or_else(|shared| (*shared).clone())
    }
}

impl Deref for CowVec {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

impl From<Vec<f64>> for CowVec {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

impl PartialEq for CowVec {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.as_slice() == other.as_slice()
    }
}

/// Validated, shareable bin boundaries.
///
/// At least two values, none NaN, non-decreasing. Equality is exact
/// bit-for-bit value equality, so two edge sets that are merely numerically
/// close are different keys.
#[derive(Debug, Clone)]
pub struct BinEdges {
    values: CowVec,
    fingerprint: u64,
}

impl BinEdges {
    /// Validates and wraps bin boundaries.
    ///
    /// # Errors
    /// `InvalidBinEdges` for fewer than two values, NaN values, or a value
    /// below its predecessor.
    pub fn new(values: Vec<f64>) -> Result<Self> {
        Self::from_cow(CowVec::new(values))
    }

    /// Validates an existing shared buffer without copying it.
    ///
    /// # Errors
    /// Same as [`BinEdges::new`].
    pub fn from_cow(values: CowVec) -> Result<Self> {
        validate_edges(&values)?;
        let fingerprint = fingerprint(&values);
        Ok(Self {
            values,
            fingerprint,
        })
    }

    /// `n_bins` equal-width bins spanning `[start, stop]`.
    ///
    /// # Errors
    /// `InvalidBinEdges` if `n_bins` is 0 or `stop < start`.
    #[allow(clippy::cast_precision_loss)]
    pub fn linear(start: f64, stop: f64, n_bins: usize) -> Result<Self> {
        if n_bins == 0 {
            return Err(Error::bin_edges("at least one bin is required"));
        }
        if !(stop >= start) {
            return Err(Error::bin_edges(format!(
                "stop {stop} is below start {start}"
            )));
        }
        let width = (stop - start) / n_bins as f64;
        let mut values: Vec<f64> = (0..n_bins).map(|i| start + width * i as f64).collect();
        values.push(stop);
        Self::new(values)
    }

    /// Builds edges from rebin parameters `[x0, dx0, x1, dx1, x2, ...]`.
    ///
    /// A positive step adds `dx` per bin; a negative step multiplies by
    /// `1 + |dx|` (logarithmic binning, requires positive boundaries). A
    /// final partial bin narrower than a quarter of its step is merged into
    /// the bin before it.
    ///
    /// # Errors
    /// `InvalidArgument` for an even or short parameter list, zero steps,
    /// non-increasing boundaries, non-positive logarithmic starts, or more
    /// than [`MAX_REBIN_BINS`] bins.
    pub fn from_rebin_params(params: &[f64]) -> Result<Self> {
        if params.len() < 3 || params.len() % 2 == 0 {
            return Err(Error::InvalidArgument(format!(
                "rebin parameters need the form x0, dx, x1[, dx, x2...]; got {} values",
                params.len()
            )));
        }
        if params.iter().any(|p| !p.is_finite()) {
            log::warn!("rejecting non-finite rebin parameters {params:?}");
            return Err(Error::InvalidArgument(
                "rebin parameters must be finite".to_string(),
            ));
        }

        let mut x = params[0];
        let mut edges = vec![x];
        for segment in params[1..].chunks_exact(2) {
            let (step, bound) = (segment[0], segment[1]);
            if step == 0.0 {
                return Err(Error::InvalidArgument("rebin step must not be zero".into()));
            }
            if bound <= x {
                return Err(Error::InvalidArgument(format!(
                    "rebin boundary {bound} does not exceed {x}"
                )));
            }
            if step < 0.0 && x <= 0.0 {
                return Err(Error::InvalidArgument(format!(
                    "logarithmic binning cannot start at {x}"
                )));
            }
            loop {
                let next = if step > 0.0 { x + step } else { x * (1.0 - step) };
                if next <= x {
                    return Err(Error::InvalidArgument(format!(
                        "rebin step {step} makes no progress at {x}"
                    )));
                }
                if next >= bound {
                    let remainder = bound - x;
                    let full = next - x;
                    if remainder < 0.25 * full && edges.len() > 1 {
                        if let Some(last) = edges.last_mut() {
                            *last = bound;
                        }
                    } else {
                        edges.push(bound);
                    }
                    x = bound;
                    break;
                }
                edges.push(next);
                x = next;
                if edges.len() > MAX_REBIN_BINS {
                    return Err(Error::InvalidArgument(format!(
                        "rebin parameters generate more than {MAX_REBIN_BINS} bins"
                    )));
                }
            }
        }
        Self::new(edges)
    }

    /// Boundary values.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Shared buffer backing these edges.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &CowVec {
        &self.values
    }

    /// Number of boundaries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false; kept for API symmetry with slices.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of bins (`len() - 1`).
    #[inline]
    #[must_use]
    pub fn n_bins(&self) -> usize {
        self.values.len() - 1
    }

    /// Lowest boundary.
    #[inline]
    #[must_use]
    pub fn first(&self) -> f64 {
        self.values[0]
    }

    /// Highest boundary.
    #[inline]
    #[must_use]
    pub fn last(&self) -> f64 {
        self.values[self.values.len() - 1]
    }

    /// Hash of the boundary bit patterns, computed once.
    #[inline]
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Index of the half-open bin containing `x`, if any.
    #[must_use]
    pub fn bin_index(&self, x: f64) -> Option<usize> {
        if !(x >= self.first() && x < self.last()) {
            return None;
        }
        let upper = self.values.partition_point(|&edge| edge <= x);
        Some(upper - 1)
    }

    /// Bin widths.
    #[must_use]
    pub fn widths(&self) -> Vec<f64> {
        self.values.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Bin midpoints.
    #[must_use]
    pub fn centers(&self) -> Vec<f64> {
        self.values.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }
}

impl PartialEq for BinEdges {
    fn eq(&self, other: &Self) -> bool {
        if self.fingerprint != other.fingerprint {
            return false;
        }
        self.values.ptr_eq(&other.values)
            || (self.len() == other.len()
                && self
                    .values
                    .iter()
                    .zip(other.values.iter())
                    .all(|(a, b)| a.to_bits() == b.to_bits()))
    }
}

impl Eq for BinEdges {}

impl Hash for BinEdges {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.fingerprint);
    }
}

impl Deref for BinEdges {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.values
    }
}

impl TryFrom<Vec<f64>> for BinEdges {
    type Error = Error;

    fn try_from(values: Vec<f64>) -> Result<Self> {
        Self::new(values)
    }
}

fn validate_edges(values: &[f64]) -> Result<()> {
    if values.len() < 2 {
        return Err(Error::bin_edges(format!(
            "need at least 2 edges, got {}",
            values.len()
        )));
    }
    if let Some(index) = values.iter().position(|v| v.is_nan()) {
        return Err(Error::bin_edges(format!("edge {index} is NaN")));
    }
    if let Some(index) = values.windows(2).position(|w| w[1] < w[0]) {
        return Err(Error::bin_edges(format!(
            "edge {} ({}) is below edge {} ({})",
            index + 1,
            values[index + 1],
            index,
            values[index]
        )));
    }
    Ok(())
}

fn fingerprint(values: &[f64]) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    values.len().hash(&mut hasher);
    for value in values {
        value.to_bits().hash(&mut hasher);
    }
    hasher.finish()
}

/// Axis events are bucketed on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BinAxis {
    /// Time-of-flight (the usual case).
    #[default]
    Tof,
    /// Pulse time in nanoseconds.
    PulseTime,
}

/// Counts and errors produced by binning events.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Counts {
    /// Summed weights per bin.
    pub y: Vec<f64>,
    /// Standard deviation per bin (square root of summed squared errors),
    /// or zeros when errors were skipped.
    pub e: Vec<f64>,
}

impl Counts {
    /// Zero-filled counts for `n_bins` bins.
    #[must_use]
    pub fn zeros(n_bins: usize) -> Self {
        Self {
            y: vec![0.0; n_bins],
            e: vec![0.0; n_bins],
        }
    }

    /// Number of bins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.y.len()
    }

    /// Returns true if there are no bins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// One row of X/Y/E data.
///
/// Histogram data has one more X value than Y values (bin edges); point
/// data has equal lengths (bin centres).
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    x: CowVec,
    y: CowVec,
    e: CowVec,
}

impl Histogram {
    /// Assembles a row.
    ///
    /// # Errors
    /// `InvalidShape` unless `y` and `e` have equal length and `x` has the
    /// same length or one more.
    pub fn new(x: CowVec, y: CowVec, e: CowVec) -> Result<Self> {
        let (x_len, y_len) = (x.len(), y.len());
        if y_len != e.len() || !(x_len == y_len || x_len == y_len + 1) {
            return Err(Error::InvalidShape { x_len, y_len });
        }
        Ok(Self { x, y, e })
    }

    /// Row built from binned counts over `edges`.
    #[must_use]
    pub fn from_counts(edges: &BinEdges, counts: Counts) -> Self {
        Self {
            x: edges.values().clone(),
            y: CowVec::new(counts.y),
            e: CowVec::new(counts.e),
        }
    }

    /// X values.
    #[inline]
    #[must_use]
    pub fn x(&self) -> &CowVec {
        &self.x
    }

    /// Y values.
    #[inline]
    #[must_use]
    pub fn y(&self) -> &CowVec {
        &self.y
    }

    /// E values.
    #[inline]
    #[must_use]
    pub fn e(&self) -> &CowVec {
        &self.e
    }

    /// Number of Y values.
    #[inline]
    #[must_use]
    pub fn n_bins(&self) -> usize {
        self.y.len()
    }

    /// Returns true for bin-edge X values.
    #[inline]
    #[must_use]
    pub fn is_histogram_data(&self) -> bool {
        self.x.len() == self.y.len() + 1
    }

    /// X values as points: midpoints for histogram data, X itself otherwise.
    #[must_use]
    pub fn points(&self) -> Vec<f64> {
        if self.is_histogram_data() {
            self.x.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
        } else {
            self.x.to_vec()
        }
    }

    /// Sum of Y.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.y.iter().sum()
    }

    /// Splits into X, Y and E buffers.
    #[must_use]
    pub fn into_parts(self) -> (CowVec, CowVec, CowVec) {
        (self.x, self.y, self.e)
    }
}
