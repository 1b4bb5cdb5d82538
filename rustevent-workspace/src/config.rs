//! Workspace configuration.

use rustevent_core::{Error, Result, PARALLEL_SORT_THRESHOLD};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default number of materialized histograms kept per workspace.
pub const DEFAULT_MRU_CAPACITY: usize = 256;

/// Configuration shared by the rows of an event workspace.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorkspaceConfig {
    /// Maximum number of cached histograms before least-recently-used
    /// entries are evicted.
    pub mru_capacity: usize,
    /// Event lists at least this long are sorted on the rayon pool.
    pub parallel_sort_threshold: usize,
    /// Run whole-workspace operations (sort, integrate, materialize) in
    /// parallel across spectra.
    pub parallel: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            mru_capacity: DEFAULT_MRU_CAPACITY,
            parallel_sort_threshold: PARALLEL_SORT_THRESHOLD,
            parallel: true,
        }
    }
}

impl WorkspaceConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache capacity.
    ///
    /// Values less than 1 are clamped to 1. Use
    /// [`Self::try_with_mru_capacity`] to surface invalid values as an error
    /// instead.
    #[must_use]
    pub fn with_mru_capacity(mut self, capacity: usize) -> Self {
        self.mru_capacity = capacity.max(1);
        self
    }

    /// Fallible variant of [`Self::with_mru_capacity`].
    ///
    /// # Errors
    /// Returns an error if `capacity` is 0.
    pub fn try_with_mru_capacity(mut self, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidArgument(
                "mru_capacity must be at least 1".to_string(),
            ));
        }
        self.mru_capacity = capacity;
        Ok(self)
    }

    /// Set the length above which single lists are sorted in parallel.
    #[must_use]
    pub fn with_parallel_sort_threshold(mut self, threshold: usize) -> Self {
        self.parallel_sort_threshold = threshold;
        self
    }

    /// Enable or disable parallel whole-workspace operations.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = WorkspaceConfig::new()
            .with_mru_capacity(0)
            .with_parallel_sort_threshold(10)
            .with_parallel(false);
        assert_eq!(config.mru_capacity, 1);
        assert_eq!(config.parallel_sort_threshold, 10);
        assert!(!config.parallel);
    }

    #[test]
    fn test_try_with_mru_capacity() {
        assert!(WorkspaceConfig::new().try_with_mru_capacity(0).is_err());
        let config = WorkspaceConfig::new().try_with_mru_capacity(8).unwrap();
        assert_eq!(config.mru_capacity, 8);
    }
}
