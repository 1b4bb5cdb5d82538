//! Workspace-level metadata and per-row error models.
//!
//! None of this is computed by the workspace itself; normalization-aware
//! callers read and write it.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How the errors of a row relate to its counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ErrorModel {
    /// Errors are carried explicitly alongside Y.
    #[default]
    Gaussian,
    /// Counting statistics: `e = sqrt(|y|)`.
    Poisson,
}

impl ErrorModel {
    /// Error for a single value; Gaussian keeps the `carried` error.
    #[inline]
    #[must_use]
    pub fn compute_error(self, y: f64, carried: f64) -> f64 {
        match self {
            Self::Gaussian => carried,
            Self::Poisson => y.abs().sqrt(),
        }
    }

    /// Recomputes `e` from `y` in place.
    pub fn apply(self, y: &[f64], e: &mut [f64]) {
        if self == Self::Gaussian {
            return;
        }
        for (err, &value) in e.iter_mut().zip(y) {
            *err = self.compute_error(value, *err);
        }
    }
}

/// Descriptive metadata shared by every row of a workspace.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorkspaceMetadata {
    /// Free-form title.
    pub title: String,
    /// Unit of the X axis.
    pub x_unit: String,
    /// Label of the Y values.
    pub y_unit: String,
    /// Whether Y has been divided by bin width.
    pub distribution: bool,
    /// Name of the instrument this data was recorded on; geometry lives
    /// elsewhere.
    pub instrument: Option<String>,
}

impl Default for WorkspaceMetadata {
    fn default() -> Self {
        Self {
            title: String::new(),
            x_unit: "TOF".to_string(),
            y_unit: "Counts".to_string(),
            distribution: false,
            instrument: None,
        }
    }
}

impl WorkspaceMetadata {
    /// Set the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the X unit.
    #[must_use]
    pub fn with_x_unit(mut self, unit: impl Into<String>) -> Self {
        self.x_unit = unit.into();
        self
    }

    /// Set the Y unit label.
    #[must_use]
    pub fn with_y_unit(mut self, unit: impl Into<String>) -> Self {
        self.y_unit = unit.into();
        self
    }

    /// Set the instrument name.
    #[must_use]
    pub fn with_instrument(mut self, name: impl Into<String>) -> Self {
        self.instrument = Some(name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poisson_errors() {
        let y = [4.0, -9.0, 0.0];
        let mut e = [0.0; 3];
        ErrorModel::Poisson.apply(&y, &mut e);
        assert_eq!(e, [2.0, 3.0, 0.0]);
    }

    #[test]
    fn test_gaussian_keeps_carried_errors() {
        let y = [4.0];
        let mut e = [0.7];
        ErrorModel::Gaussian.apply(&y, &mut e);
        assert!((e[0] - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_metadata_defaults() {
        let meta = WorkspaceMetadata::default().with_y_unit("Intensity");
        assert_eq!(meta.x_unit, "TOF");
        assert_eq!(meta.y_unit, "Intensity");
        assert!(!meta.distribution);
        assert_eq!(meta.instrument, None);
    }

    #[test]
    fn test_metadata_builders() {
        let meta = WorkspaceMetadata::default()
            .with_title("run 7")
            .with_x_unit("Wavelength")
            .with_instrument("SNAP");
        assert_eq!(meta.title, "run 7");
        assert_eq!(meta.x_unit, "Wavelength");
        assert_eq!(meta.instrument.as_deref(), Some("SNAP"));
    }
}
