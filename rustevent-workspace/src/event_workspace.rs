//! Event-backed workspace.
//!
//! Each row owns an [`EventList`] behind its own reader-writer lock plus the
//! bin edges currently declared for it. Y and E are never stored: they are
//! binned on request and kept in a workspace-wide [`MruCache`].
//!
//! Lock discipline:
//! - Readers of different rows never share a lock.
//! - Sorting happens under the row's write lock, which is then downgraded so
//!   binning runs against a list no writer can touch.
//! - The cache mutex is only held for lookup and insert, never while binning,
//!   and is always taken after (never before) a row lock.

use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rayon::prelude::*;
use rustevent_core::{
    BinAxis, BinEdges, Counts, CowVec, DetectorId, Error, EventList, EventType, Histogram,
    PulseTime, Result, SortOrder,
};

use crate::config::WorkspaceConfig;
use crate::matrix::{uniform_blocksize, MatrixWorkspace};
use crate::metadata::{ErrorModel, WorkspaceMetadata};
use crate::mru::{CacheKey, CacheStats, MruCache};
use crate::workspace2d::Workspace2D;

/// Workspace whose rows are binned from event lists on demand.
#[derive(Debug)]
pub struct EventWorkspace {
    lists: Vec<RwLock<EventList>>,
    x: Vec<BinEdges>,
    error_models: Vec<ErrorModel>,
    default_x: BinEdges,
    metadata: WorkspaceMetadata,
    config: WorkspaceConfig,
    mru: Mutex<MruCache>,
}

impl EventWorkspace {
    /// Workspace of `n_hist` empty event lists.
    ///
    /// Event rows are always histogram data, so `x_len` must be
    /// `y_len + 1`. Every row starts with the edges `0, 1, ..., y_len`.
    ///
    /// # Errors
    /// `InvalidShape` for any other combination or `y_len == 0`.
    #[allow(clippy::cast_precision_loss)]
    pub fn initialize(n_hist: usize, x_len: usize, y_len: usize) -> Result<Self> {
        if y_len == 0 || x_len != y_len + 1 {
            return Err(Error::InvalidShape { x_len, y_len });
        }
        let edges = BinEdges::linear(0.0, y_len as f64, y_len)?;
        let lists = (0..n_hist).map(|_| EventList::new()).collect();
        Ok(Self::from_event_lists(lists, edges))
    }

    /// Workspace over existing lists, all binned into `x`.
    #[must_use]
    pub fn from_event_lists(lists: Vec<EventList>, x: BinEdges) -> Self {
        let config = WorkspaceConfig::default();
        let n_hist = lists.len();
        Self {
            lists: lists.into_iter().map(RwLock::new).collect(),
            x: vec![x.clone(); n_hist],
            error_models: vec![ErrorModel::default(); n_hist],
            default_x: x,
            metadata: WorkspaceMetadata::default(),
            mru: Mutex::new(MruCache::new(config.mru_capacity)),
            config,
        }
    }

    /// Applies `config`, resizing the cache.
    #[must_use]
    pub fn with_config(mut self, config: WorkspaceConfig) -> Self {
        self.mru.get_mut().resize(config.mru_capacity);
        self.config = config;
        self
    }

    /// Replaces the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: WorkspaceMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    // ---------------------------------------------------------------------
    // Row access

    /// Shared access to the event list of row `index`.
    ///
    /// Reading rows of this workspace while the guard is held on the same
    /// thread can deadlock if the row needs sorting.
    ///
    /// # Errors
    /// `IndexOutOfRange` for a bad index.
    pub fn event_list(&self, index: usize) -> Result<RwLockReadGuard<'_, EventList>> {
        Ok(self.lock(index)?.read())
    }

    /// Exclusive access to the event list of row `index`.
    ///
    /// Cached histograms of the row are dropped when the guard is released
    /// if the list content changed. No other access to the row is possible
    /// until it is released.
    ///
    /// # Errors
    /// `IndexOutOfRange` for a bad index.
    pub fn event_list_mut(&self, index: usize) -> Result<EventListMut<'_>> {
        let list = self.lock(index)?.write();
        let generation = list.generation();
        Ok(EventListMut {
            list,
            index,
            generation,
            cache: &self.mru,
        })
    }

    /// Appends a row binned into the workspace's default edges; returns its
    /// index.
    pub fn add_event_list(&mut self, list: EventList) -> usize {
        self.lists.push(RwLock::new(list));
        self.x.push(self.default_x.clone());
        self.error_models.push(ErrorModel::default());
        self.lists.len() - 1
    }

    /// Edges given to rows added later.
    #[must_use]
    pub fn default_x(&self) -> &BinEdges {
        &self.default_x
    }

    /// Edges currently declared for row `index`.
    ///
    /// # Errors
    /// `IndexOutOfRange` for a bad index.
    pub fn x(&self, index: usize) -> Result<&BinEdges> {
        self.x.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.x.len(),
        })
    }

    /// Grows or shrinks to `n_hist` rows; new rows are empty.
    pub fn resize_to(&mut self, n_hist: usize) {
        let before = self.lists.len();
        self.lists
            .resize_with(n_hist, || RwLock::new(EventList::new()));
        self.x.resize(n_hist, self.default_x.clone());
        self.error_models.resize(n_hist, ErrorModel::default());
        self.mru.get_mut().clear();
        log::debug!("resized event workspace from {before} to {n_hist} rows");
    }

    /// Removes rows without events; returns how many were removed.
    ///
    /// Remaining rows shift down, so the cache is cleared if anything was
    /// removed.
    pub fn delete_empty_lists(&mut self) -> usize {
        let lists = std::mem::take(&mut self.lists);
        let x = std::mem::take(&mut self.x);
        let models = std::mem::take(&mut self.error_models);
        let before = lists.len();

        for ((lock, edges), model) in lists.into_iter().zip(x).zip(models) {
            let list = lock.into_inner();
            if !list.is_empty() {
                self.lists.push(RwLock::new(list));
                self.x.push(edges);
                self.error_models.push(model);
            }
        }

        let removed = before - self.lists.len();
        if removed > 0 {
            self.mru.get_mut().clear();
            log::debug!("deleted {removed} empty event lists");
        }
        removed
    }

    // ---------------------------------------------------------------------
    // Totals

    /// Events across all rows.
    #[must_use]
    pub fn number_events(&self) -> usize {
        self.map_lists(EventList::number_events).into_iter().sum()
    }

    /// Smallest time-of-flight in the workspace.
    #[must_use]
    pub fn tof_min(&self) -> Option<f64> {
        self.map_lists(EventList::tof_min)
            .into_iter()
            .flatten()
            .reduce(f64::min)
    }

    /// Largest time-of-flight in the workspace.
    #[must_use]
    pub fn tof_max(&self) -> Option<f64> {
        self.map_lists(EventList::tof_max)
            .into_iter()
            .flatten()
            .reduce(f64::max)
    }

    /// Earliest pulse time in the workspace.
    #[must_use]
    pub fn pulse_time_min(&self) -> Option<PulseTime> {
        self.map_lists(EventList::pulse_time_min)
            .into_iter()
            .flatten()
            .min()
    }

    /// Latest pulse time in the workspace.
    #[must_use]
    pub fn pulse_time_max(&self) -> Option<PulseTime> {
        self.map_lists(EventList::pulse_time_max)
            .into_iter()
            .flatten()
            .max()
    }

    /// Time-of-flight range `(min, max)` covered by events, if any.
    #[must_use]
    pub fn event_x_min_max(&self) -> Option<(f64, f64)> {
        self.map_lists(|list| list.tof_min().zip(list.tof_max()))
            .into_iter()
            .flatten()
            .reduce(|(lo, hi), (min, max)| (lo.min(min), hi.max(max)))
    }

    /// Widest record layout of any row; `Tof` for an empty workspace.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        self.map_lists(EventList::event_type)
            .into_iter()
            .max()
            .unwrap_or(EventType::Tof)
    }

    /// Widens every row to `target`.
    ///
    /// # Errors
    /// `NotSupported` if any row already uses a wider layout; nothing is
    /// changed in that case.
    pub fn switch_event_type(&mut self, target: EventType) -> Result<()> {
        let current = self.event_type();
        if target < current {
            return Err(Error::NotSupported(format!(
                "cannot switch event workspace from {current} to {target}"
            )));
        }
        let parallel = self.config.parallel;
        let switch = |lock: &mut RwLock<EventList>| lock.get_mut().switch_to(target);
        if parallel {
            self.lists.par_iter_mut().try_for_each(switch)?;
        } else {
            self.lists.iter_mut().try_for_each(switch)?;
        }
        self.mru.get_mut().clear();
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Sorting

    /// Sorts every row into `order`, rows in parallel.
    pub fn sort_all(&mut self, order: SortOrder) {
        let threshold = self.config.parallel_sort_threshold;
        let sort = |lock: &mut RwLock<EventList>| {
            lock.get_mut().sort_with_threshold(order, threshold);
        };
        if self.config.parallel {
            self.lists.par_iter_mut().for_each(sort);
        } else {
            self.lists.iter_mut().for_each(sort);
        }
        log::debug!("sorted {} event lists by {order}", self.lists.len());
    }

    /// Order shared by every row, or `Unsorted` if they differ.
    #[must_use]
    pub fn sort_order(&self) -> SortOrder {
        let orders = self.map_lists(EventList::sort_order);
        match orders.split_first() {
            Some((first, rest)) if rest.iter().all(|order| order == first) => *first,
            _ => SortOrder::Unsorted,
        }
    }

    // ---------------------------------------------------------------------
    // Materialization

    /// Bins row `index` into arbitrary `edges` by time-of-flight, bypassing
    /// the cache.
    ///
    /// # Errors
    /// `IndexOutOfRange` for a bad index.
    pub fn generate_histogram(
        &self,
        index: usize,
        edges: &BinEdges,
        skip_error: bool,
    ) -> Result<Counts> {
        self.with_sorted(index, SortOrder::Tof, |list| {
            list.histogram_sorted(edges, BinAxis::Tof, skip_error)
        })?
    }

    /// Bins row `index` into `edges` by pulse time, bypassing the cache.
    ///
    /// # Errors
    /// `IndexOutOfRange` for a bad index; `NotSupported` if the row has no
    /// pulse times.
    pub fn generate_histogram_pulse_time(
        &self,
        index: usize,
        edges: &BinEdges,
        skip_error: bool,
    ) -> Result<Counts> {
        if !self.event_list(index)?.event_type().has_pulse_time() {
            return Err(Error::NotSupported(format!(
                "row {index} has no pulse times to bin on"
            )));
        }
        self.with_sorted(index, SortOrder::PulseTime, |list| {
            list.histogram_sorted(edges, BinAxis::PulseTime, skip_error)
        })?
    }

    /// Every row at its declared edges, rows in parallel, through the cache.
    ///
    /// # Errors
    /// The first row failure.
    pub fn materialize_all(&self) -> Result<Vec<Histogram>> {
        if self.config.parallel {
            (0..self.lists.len())
                .into_par_iter()
                .map(|index| self.cached_histogram(index))
                .collect()
        } else {
            (0..self.lists.len())
                .map(|index| self.cached_histogram(index))
                .collect()
        }
    }

    /// Dense copy of this workspace at the declared edges.
    ///
    /// Rows are binned in parallel without populating the cache; metadata,
    /// error models and detector IDs carry over.
    ///
    /// # Errors
    /// The first row failure.
    pub fn to_workspace2d(&self) -> Result<Workspace2D> {
        let bin_row = |index: usize| -> Result<Histogram> {
            let (_, counts) = self.materialize(index)?;
            Ok(Histogram::from_counts(&self.x[index], counts))
        };
        let histograms: Vec<Histogram> = if self.config.parallel {
            (0..self.lists.len())
                .into_par_iter()
                .map(bin_row)
                .collect::<Result<_>>()?
        } else {
            (0..self.lists.len())
                .map(bin_row)
                .collect::<Result<_>>()?
        };

        let mut dense =
            Workspace2D::from_histograms(histograms).with_metadata(self.metadata.clone());
        for (index, lock) in self.lists.iter().enumerate() {
            dense.set_detector_ids(index, lock.read().detector_ids().iter().copied())?;
            dense.set_error_model(index, self.error_models[index])?;
        }
        log::debug!(
            "converted {} event lists to a dense workspace",
            self.lists.len()
        );
        Ok(dense)
    }

    /// New workspace holding only events with pulse time in `[start, stop)`.
    ///
    /// Edges, error models, metadata and configuration carry over; the
    /// cache starts empty.
    ///
    /// # Errors
    /// `NotSupported` if any row has no pulse times.
    pub fn filter_by_pulse_time(&self, start: PulseTime, stop: PulseTime) -> Result<Self> {
        let lists = self
            .map_lists(|list| list.filter_by_pulse_time(start, stop))
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            lists: lists.into_iter().map(RwLock::new).collect(),
            x: self.x.clone(),
            error_models: self.error_models.clone(),
            default_x: self.default_x.clone(),
            metadata: self.metadata.clone(),
            mru: Mutex::new(MruCache::new(self.config.mru_capacity)),
            config: self.config.clone(),
        })
    }

    // ---------------------------------------------------------------------
    // Cache management

    /// Drops every cached histogram.
    pub fn clear_mru(&self) {
        self.mru.lock().clear();
    }

    /// Number of cached histograms.
    #[must_use]
    pub fn mru_len(&self) -> usize {
        self.mru.lock().len()
    }

    /// Cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.mru.lock().stats()
    }

    // ---------------------------------------------------------------------
    // Internals

    fn lock(&self, index: usize) -> Result<&RwLock<EventList>> {
        self.lists.get(index).ok_or(Error::IndexOutOfRange {
            index,
            len: self.lists.len(),
        })
    }

    fn map_lists<R, F>(&self, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(&EventList) -> R + Sync + Send,
    {
        if self.config.parallel {
            self.lists.par_iter().map(|lock| f(&*lock.read())).collect()
        } else {
            self.lists.iter().map(|lock| f(&*lock.read())).collect()
        }
    }

    /// Runs `f` against row `index` once it is in `order`.
    ///
    /// Sorting needs the write lock; it is downgraded before `f` runs so
    /// other readers of the row proceed as soon as the sort is done.
    fn with_sorted<R>(
        &self,
        index: usize,
        order: SortOrder,
        f: impl FnOnce(&EventList) -> R,
    ) -> Result<R> {
        let lock = self.lock(index)?;
        let list = lock.read();
        if list.is_sorted_by(order) {
            return Ok(f(&*list));
        }
        drop(list);

        let mut list = lock.write();
        list.sort_with_threshold(order, self.config.parallel_sort_threshold);
        let list = RwLockWriteGuard::downgrade(list);
        Ok(f(&*list))
    }

    /// Bins row `index` at its declared edges; returns the generation the
    /// counts were taken from.
    fn materialize(&self, index: usize) -> Result<(u64, Counts)> {
        let edges = self.x(index)?;
        let (generation, mut counts) = self.with_sorted(index, SortOrder::Tof, |list| {
            list.histogram_sorted(edges, BinAxis::Tof, false)
                .map(|counts| (list.generation(), counts))
        })??;
        self.error_models[index].apply(&counts.y, &mut counts.e);
        Ok((generation, counts))
    }

    fn cached_histogram(&self, index: usize) -> Result<Histogram> {
        let lock = self.lock(index)?;
        let edges = &self.x[index];
        let key = CacheKey::new(index, edges.clone());
        {
            let list = lock.read();
            if let Some(hit) = self.mru.lock().get(&key, list.generation()) {
                return Ok(hit);
            }
        }

        let (generation, counts) = self.materialize(index)?;
        let histogram = Histogram::from_counts(edges, counts);
        self.mru.lock().insert(key, generation, histogram.clone());
        Ok(histogram)
    }
}

impl Clone for EventWorkspace {
    fn clone(&self) -> Self {
        Self {
            lists: self
                .lists
                .iter()
                .map(|lock| RwLock::new(lock.read().clone()))
                .collect(),
            x: self.x.clone(),
            error_models: self.error_models.clone(),
            default_x: self.default_x.clone(),
            metadata: self.metadata.clone(),
            mru: Mutex::new(MruCache::new(self.config.mru_capacity)),
            config: self.config.clone(),
        }
    }
}

impl MatrixWorkspace for EventWorkspace {
    fn id(&self) -> &'static str {
        "EventWorkspace"
    }

    fn number_histograms(&self) -> usize {
        self.lists.len()
    }

    fn blocksize(&self) -> Result<usize> {
        uniform_blocksize(self.x.iter().map(BinEdges::n_bins))
    }

    fn is_histogram_data(&self) -> bool {
        true
    }

    fn histogram(&self, index: usize) -> Result<Histogram> {
        self.cached_histogram(index)
    }

    fn read_x(&self, index: usize) -> Result<CowVec> {
        Ok(self.x(index)?.values().clone())
    }

    fn data_x_mut(&mut self, _index: usize) -> Result<&mut [f64]> {
        Err(Error::NotSupported(
            "X of an event workspace is replaced through set_x".into(),
        ))
    }

    fn data_y_mut(&mut self, _index: usize) -> Result<&mut [f64]> {
        Err(Error::NotSupported(
            "Y of an event workspace is derived from events".into(),
        ))
    }

    fn data_e_mut(&mut self, _index: usize) -> Result<&mut [f64]> {
        Err(Error::NotSupported(
            "E of an event workspace is derived from events".into(),
        ))
    }

    fn set_x(&mut self, index: usize, x: BinEdges) -> Result<()> {
        Error::check_index(index, self.x.len())?;
        self.x[index] = x;
        self.mru.get_mut().invalidate(index);
        Ok(())
    }

    fn set_all_x(&mut self, x: BinEdges) -> Result<()> {
        for edges in &mut self.x {
            *edges = x.clone();
        }
        self.default_x = x;
        self.mru.get_mut().clear();
        Ok(())
    }

    fn detector_ids(&self, index: usize) -> Result<BTreeSet<DetectorId>> {
        Ok(self.event_list(index)?.detector_ids().clone())
    }

    fn error_model(&self, index: usize) -> Result<ErrorModel> {
        Error::check_index(index, self.error_models.len())?;
        Ok(self.error_models[index])
    }

    fn set_error_model(&mut self, index: usize, model: ErrorModel) -> Result<()> {
        Error::check_index(index, self.error_models.len())?;
        self.error_models[index] = model;
        self.mru.get_mut().invalidate(index);
        Ok(())
    }

    fn integrate_spectra(&self, min_x: f64, max_x: f64, entire_range: bool) -> Result<Vec<f64>> {
        Ok(self.map_lists(|list| list.integrate(min_x, max_x, entire_range).weight))
    }

    fn metadata(&self) -> &WorkspaceMetadata {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut WorkspaceMetadata {
        &mut self.metadata
    }

    fn as_event_workspace(&self) -> Option<&EventWorkspace> {
        Some(self)
    }
}

/// Write guard over one row's event list.
///
/// Dropping the guard drops the row's cached histograms if the list was
/// mutated.
pub struct EventListMut<'a> {
    list: RwLockWriteGuard<'a, EventList>,
    index: usize,
    generation: u64,
    cache: &'a Mutex<MruCache>,
}

impl EventListMut<'_> {
    /// Row this guard belongs to.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Deref for EventListMut<'_> {
    type Target = EventList;

    fn deref(&self) -> &EventList {
        &self.list
    }
}

impl DerefMut for EventListMut<'_> {
    fn deref_mut(&mut self) -> &mut EventList {
        &mut self.list
    }
}

impl Drop for EventListMut<'_> {
    fn drop(&mut self) {
        if self.list.generation() != self.generation {
            let dropped = self.cache.lock().invalidate(self.index);
            if dropped > 0 {
                log::trace!(
                    "invalidated {dropped} cached histograms of row {}",
                    self.index
                );
            }
        }
    }
}
