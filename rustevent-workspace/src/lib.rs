//! rustevent-workspace: Row-oriented workspaces over event and dense data.
//!
//! This crate provides the matrix view consumers work against:
//!
//! - [`MatrixWorkspace`]: X/Y/E rows, blocksize, shared X, error models
//! - [`Workspace2D`]: dense rows with copy-on-write buffers
//! - [`EventWorkspace`]: rows binned lazily from event lists, sorted on
//!   first read and cached in an [`MruCache`]
//!
//! Rows of an event workspace may be read from many threads at once; each
//! row has its own lock and the cache lock is never held while binning.
//!

mod grouping;

pub mod config;
pub mod event_workspace;
pub mod matrix;
pub mod metadata;
pub mod mru;
pub mod workspace2d;

pub use config::{WorkspaceConfig, DEFAULT_MRU_CAPACITY};
pub use event_workspace::{EventListMut, EventWorkspace};
#[cfg(feature = "ndarray")]
pub use matrix::y_array;
pub use matrix::MatrixWorkspace;
pub use metadata::{ErrorModel, WorkspaceMetadata};
pub use mru::{CacheKey, CacheStats, MruCache};
pub use workspace2d::Workspace2D;

pub use rustevent_core::{Error, Result};
