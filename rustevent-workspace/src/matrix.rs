//! Uniform row-oriented view over workspace backings.
//!
//! Consumers (rebinning, plotting, arithmetic) see every workspace as a set
//! of X/Y/E rows. A dense [`Workspace2D`](crate::Workspace2D) stores those
//! rows; an [`EventWorkspace`] synthesizes them from event lists on request.

use std::collections::BTreeSet;

use rustevent_core::{BinEdges, CowVec, DetectorId, Error, Histogram, Result};

use crate::event_workspace::EventWorkspace;
use crate::metadata::{ErrorModel, WorkspaceMetadata};

/// Row-oriented interface shared by dense and event-backed workspaces.
pub trait MatrixWorkspace: Send + Sync {
    /// Short name of the backing, e.g. `"Workspace2D"`.
    fn id(&self) -> &'static str;

    /// Number of rows (spectra).
    fn number_histograms(&self) -> usize;

    /// Number of Y values per row.
    ///
    /// # Errors
    /// `RaggedWorkspace` if rows differ in length.
    fn blocksize(&self) -> Result<usize>;

    /// Total number of Y values.
    ///
    /// # Errors
    /// Same as [`MatrixWorkspace::blocksize`].
    fn size(&self) -> Result<usize> {
        Ok(self.number_histograms() * self.blocksize()?)
    }

    /// Returns true when X holds bin edges rather than points.
    fn is_histogram_data(&self) -> bool;

    /// Complete row `index`.
    ///
    /// # Errors
    /// `IndexOutOfRange` for a bad index; event-backed rows may fail as
    /// binning does.
    fn histogram(&self, index: usize) -> Result<Histogram>;

    /// X values of row `index`.
    ///
    /// # Errors
    /// `IndexOutOfRange` for a bad index.
    fn read_x(&self, index: usize) -> Result<CowVec>;

    /// Y values of row `index`.
    ///
    /// # Errors
    /// Same as [`MatrixWorkspace::histogram`].
    fn read_y(&self, index: usize) -> Result<CowVec> {
        Ok(self.histogram(index)?.y().clone())
    }

    /// E values of row `index`.
    ///
    /// # Errors
    /// Same as [`MatrixWorkspace::histogram`].
    fn read_e(&self, index: usize) -> Result<CowVec> {
        Ok(self.histogram(index)?.e().clone())
    }

    /// Mutable X of row `index`, detached from any shared buffer. The row
    /// length is fixed.
    ///
    /// # Errors
    /// `IndexOutOfRange`, or `NotSupported` for backings whose X is derived.
    fn data_x_mut(&mut self, index: usize) -> Result<&mut [f64]>;

    /// Mutable Y of row `index`; the length is fixed.
    ///
    /// # Errors
    /// `IndexOutOfRange`, or `NotSupported` for event-backed rows.
    fn data_y_mut(&mut self, index: usize) -> Result<&mut [f64]>;

    /// Mutable E of row `index`; the length is fixed.
    ///
    /// # Errors
    /// `IndexOutOfRange`, or `NotSupported` for event-backed rows.
    fn data_e_mut(&mut self, index: usize) -> Result<&mut [f64]>;

    /// Replaces the X of row `index`.
    ///
    /// # Errors
    /// `IndexOutOfRange`, or `InvalidShape` if the length does not fit the
    /// row.
    fn set_x(&mut self, index: usize, x: BinEdges) -> Result<()>;

    /// Gives every row the same X, sharing one buffer.
    ///
    /// # Errors
    /// `InvalidShape` if the length does not fit some row; no row is changed
    /// in that case.
    fn set_all_x(&mut self, x: BinEdges) -> Result<()>;

    /// Detector IDs contributing to row `index`.
    ///
    /// # Errors
    /// `IndexOutOfRange` for a bad index.
    fn detector_ids(&self, index: usize) -> Result<BTreeSet<DetectorId>>;

    /// Error model of row `index`.
    ///
    /// # Errors
    /// `IndexOutOfRange` for a bad index.
    fn error_model(&self, index: usize) -> Result<ErrorModel>;

    /// Sets the error model of row `index`.
    ///
    /// # Errors
    /// `IndexOutOfRange` for a bad index.
    fn set_error_model(&mut self, index: usize, model: ErrorModel) -> Result<()>;

    /// Per-row sum of Y over X in `[min_x, max_x)`, or over every bin if
    /// `entire_range` is set.
    ///
    /// # Errors
    /// Propagates row access failures.
    fn integrate_spectra(&self, min_x: f64, max_x: f64, entire_range: bool) -> Result<Vec<f64>>;

    /// Shared metadata.
    fn metadata(&self) -> &WorkspaceMetadata;

    /// Mutable metadata.
    fn metadata_mut(&mut self) -> &mut WorkspaceMetadata;

    /// Returns true if Y has been divided by bin width.
    fn is_distribution(&self) -> bool {
        self.metadata().distribution
    }

    /// Marks Y as divided by bin width, or not.
    fn set_distribution(&mut self, distribution: bool) {
        self.metadata_mut().distribution = distribution;
    }

    /// The event backing, if this is one.
    fn as_event_workspace(&self) -> Option<&EventWorkspace> {
        None
    }
}

/// Number of bins per row, shared by all rows.
pub(crate) fn uniform_blocksize<I>(lengths: I) -> Result<usize>
where
    I: IntoIterator<Item = usize>,
{
    let mut lengths = lengths.into_iter();
    let Some(expected) = lengths.next() else {
        return Ok(0);
    };
    for (offset, found) in lengths.enumerate() {
        if found != expected {
            return Err(Error::RaggedWorkspace {
                row: offset + 1,
                expected,
                found,
            });
        }
    }
    Ok(expected)
}

/// Y values of every row as a 2-D array.
///
/// # Errors
/// `RaggedWorkspace` if rows differ in length, or any row access failure.
#[cfg(feature = "ndarray")]
pub fn y_array(workspace: &dyn MatrixWorkspace) -> Result<ndarray::Array2<f64>> {
    let n_rows = workspace.number_histograms();
    let n_cols = workspace.blocksize()?;
    let mut array = ndarray::Array2::<f64>::zeros((n_rows, n_cols));
    for (index, mut row) in array.outer_iter_mut().enumerate() {
        let y = workspace.read_y(index)?;
        for (dst, &src) in row.iter_mut().zip(y.iter()) {
            *dst = src;
        }
    }
    Ok(array)
}
