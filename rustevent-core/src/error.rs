//! Error types for rustevent-core.

use thiserror::Error;

use crate::sort::SortOrder;

/// Result type alias for rustevent operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for event and histogram operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Bin edges are too short, unordered or not finite.
    #[error("invalid bin edges: {0}")]
    InvalidBinEdges(String),

    /// An event, spectrum or row index past the end of its container.
    #[error("index {index} out of range (length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Any other malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Workspace dimensions that do not describe a valid layout.
    #[error("invalid shape: x length {x_len} does not fit y length {y_len}")]
    InvalidShape { x_len: usize, y_len: usize },

    /// Rows of differing length where a uniform bin count is required.
    #[error("ragged workspace: row {row} has {found} bins, row 0 has {expected}")]
    RaggedWorkspace {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// A binning pass was asked to run over events not in the required order.
    #[error("event list is not sorted by {required}")]
    NotSorted { required: SortOrder },

    /// Operation is meaningless for this kind of storage.
    #[error("not supported: {0}")]
    NotSupported(String),
}

impl Error {
    pub(crate) fn bin_edges(msg: impl Into<String>) -> Self {
        Self::InvalidBinEdges(msg.into())
    }

    /// Returns an out-of-range error unless `index < len`.
    ///
    /// # Errors
    /// `IndexOutOfRange` when `index >= len`.
    pub fn check_index(index: usize, len: usize) -> Result<()> {
        if index < len {
            Ok(())
        } else {
            Err(Self::IndexOutOfRange { index, len })
        }
    }
}
