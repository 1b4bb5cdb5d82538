//! Dense histogram workspace.
//!
//! Every row stores X, Y and E explicitly. X buffers are shared between rows
//! until one is mutated, so a workspace of identically binned spectra holds
//! a single X allocation.

use std::collections::BTreeSet;

use rayon::prelude::*;
use rustevent_core::{BinEdges, CowVec, DetectorId, Error, Histogram, Result};

use crate::matrix::{uniform_blocksize, MatrixWorkspace};
use crate::metadata::{ErrorModel, WorkspaceMetadata};

#[derive(Debug, Clone)]
struct Row {
    x: CowVec,
    y: CowVec,
    e: CowVec,
    error_model: ErrorModel,
    detector_ids: BTreeSet<DetectorId>,
}

impl Row {
    fn from_histogram(histogram: Histogram) -> Self {
        let (x, y, e) = histogram.into_parts();
        Self {
            x,
            y,
            e,
            error_model: ErrorModel::default(),
            detector_ids: BTreeSet::new(),
        }
    }

    fn fits_x(&self, x_len: usize) -> bool {
        x_len == self.y.len() || x_len == self.y.len() + 1
    }
}

/// Workspace holding explicit X/Y/E rows.
#[derive(Debug, Clone, Default)]
pub struct Workspace2D {
    rows: Vec<Row>,
    metadata: WorkspaceMetadata,
}

impl Workspace2D {
    /// Zero-filled workspace of `n_hist` rows.
    ///
    /// `x_len` must equal `y_len` (point data) or `y_len + 1` (histogram
    /// data). All rows start out sharing one X buffer.
    ///
    /// # Errors
    /// `InvalidShape` for any other combination.
    pub fn initialize(n_hist: usize, x_len: usize, y_len: usize) -> Result<Self> {
        if !(x_len == y_len || x_len == y_len + 1) {
            return Err(Error::InvalidShape { x_len, y_len });
        }
        let x = CowVec::filled(x_len, 0.0);
        let zeros = CowVec::filled(y_len, 0.0);
        let rows = (0..n_hist)
            .map(|_| Row {
                x: x.clone(),
                y: zeros.clone(),
                e: zeros.clone(),
                error_model: ErrorModel::default(),
                detector_ids: BTreeSet::new(),
            })
            .collect();
        Ok(Self {
            rows,
            metadata: WorkspaceMetadata::default(),
        })
    }

    /// Workspace built from complete rows.
    #[must_use]
    pub fn from_histograms(histograms: Vec<Histogram>) -> Self {
        Self {
            rows: histograms.into_iter().map(Row::from_histogram).collect(),
            metadata: WorkspaceMetadata::default(),
        }
    }

    /// Replaces the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: WorkspaceMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Replaces row `index` wholesale; error model and detector IDs are kept.
    ///
    /// # Errors
    /// `IndexOutOfRange` for a bad index.
    pub fn set_histogram(&mut self, index: usize, histogram: Histogram) -> Result<()> {
        let row = self.row_mut(index)?;
        let (x, y, e) = histogram.into_parts();
        row.x = x;
        row.y = y;
        row.e = e;
        Ok(())
    }

    /// Replaces the detector IDs of row `index`.
    ///
    /// # Errors
    /// `IndexOutOfRange` for a bad index.
    pub fn set_detector_ids<I>(&mut self, index: usize, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = DetectorId>,
    {
        self.row_mut(index)?.detector_ids = ids.into_iter().collect();
        Ok(())
    }

    /// Recomputes E of row `index` from its Y under the row's error model.
    ///
    /// # Errors
    /// `IndexOutOfRange` for a bad index.
    pub fn apply_error_model(&mut self, index: usize) -> Result<()> {
        let row = self.row_mut(index)?;
        if row.error_model == ErrorModel::Gaussian {
            return Ok(());
        }
        let model = row.error_model;
        let y = row.y.clone();
        model.apply(&y, row.e.make_mut());
        Ok(())
    }

    /// Returns true if rows `a` and `b` share one X buffer.
    ///
    /// # Errors
    /// `IndexOutOfRange` for a bad index.
    pub fn shares_x(&self, a: usize, b: usize) -> Result<bool> {
        Ok(self.row(a)?.x.ptr_eq(&self.row(b)?.x))
    }

    fn row(&self, index: usize) -> Result<&Row> {
        self.rows
            .get(index)
            .ok_or(Error::IndexOutOfRange {
                index,
                len: self.rows.len(),
            })
    }

    fn row_mut(&mut self, index: usize) -> Result<&mut Row> {
        let len = self.rows.len();
        self.rows
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })
    }
}

impl MatrixWorkspace for Workspace2D {
    fn id(&self) -> &'static str {
        "Workspace2D"
    }

    fn number_histograms(&self) -> usize {
        self.rows.len()
    }

    fn blocksize(&self) -> Result<usize> {
        uniform_blocksize(self.rows.iter().map(|row| row.y.len()))
    }

    fn is_histogram_data(&self) -> bool {
        self.rows
            .first()
            .is_some_and(|row| row.x.len() == row.y.len() + 1)
    }

    fn histogram(&self, index: usize) -> Result<Histogram> {
        let row = self.row(index)?;
        Histogram::new(row.x.clone(), row.y.clone(), row.e.clone())
    }

    fn read_x(&self, index: usize) -> Result<CowVec> {
        Ok(self.row(index)?.x.clone())
    }

    fn read_y(&self, index: usize) -> Result<CowVec> {
        Ok(self.row(index)?.y.clone())
    }

    fn read_e(&self, index: usize) -> Result<CowVec> {
        Ok(self.row(index)?.e.clone())
    }

    fn data_x_mut(&mut self, index: usize) -> Result<&mut [f64]> {
        Ok(self.row_mut(index)?.x.make_mut().as_mut_slice())
    }

    fn data_y_mut(&mut self, index: usize) -> Result<&mut [f64]> {
        Ok(self.row_mut(index)?.y.make_mut().as_mut_slice())
    }

    fn data_e_mut(&mut self, index: usize) -> Result<&mut [f64]> {
        Ok(self.row_mut(index)?.e.make_mut().as_mut_slice())
    }

    fn set_x(&mut self, index: usize, x: BinEdges) -> Result<()> {
        let row = self.row_mut(index)?;
        if !row.fits_x(x.len()) {
            return Err(Error::InvalidShape {
                x_len: x.len(),
                y_len: row.y.len(),
            });
        }
        row.x = x.values().clone();
        Ok(())
    }

    fn set_all_x(&mut self, x: BinEdges) -> Result<()> {
        if let Some(row) = self.rows.iter().find(|row| !row.fits_x(x.len())) {
            return Err(Error::InvalidShape {
                x_len: x.len(),
                y_len: row.y.len(),
            });
        }
        for row in &mut self.rows {
            row.x = x.values().clone();
        }
        Ok(())
    }

    fn detector_ids(&self, index: usize) -> Result<BTreeSet<DetectorId>> {
        Ok(self.row(index)?.detector_ids.clone())
    }

    fn error_model(&self, index: usize) -> Result<ErrorModel> {
        Ok(self.row(index)?.error_model)
    }

    fn set_error_model(&mut self, index: usize, model: ErrorModel) -> Result<()> {
        self.row_mut(index)?.error_model = model;
        Ok(())
    }

    fn integrate_spectra(&self, min_x: f64, max_x: f64, entire_range: bool) -> Result<Vec<f64>> {
        Ok(self
            .rows
            .par_iter()
            .map(|row| {
                if entire_range {
                    row.y.iter().sum()
                } else {
                    row.x
                        .iter()
                        .zip(row.y.iter())
                        .filter(|&(&x, _)| x >= min_x && x < max_x)
                        .map(|(_, &y)| y)
                        .sum()
                }
            })
            .collect())
    }

    fn metadata(&self) -> &WorkspaceMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut WorkspaceMetadata {
        &mut self.metadata
    }
}
