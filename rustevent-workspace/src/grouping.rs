//! Detector grouping.
//!
//! Builds a new event workspace whose rows are unions of input rows,
//! selected by detector ID.

use std::collections::{BTreeSet, HashMap};

use rayon::prelude::*;
use rustevent_core::{DetectorId, EventList, Result};

use crate::event_workspace::EventWorkspace;
use crate::matrix::MatrixWorkspace;

impl EventWorkspace {
    /// Merges rows by detector.
    ///
    /// Output row `k` holds the events of every input row fed by at least
    /// one detector in `groups[k]`. An input row contributes at most once to
    /// a given output row, but may contribute to several. Output detector
    /// IDs are the union of the contributing rows' IDs; output rows are
    /// unsorted and binned into this workspace's default edges.
    ///
    /// # Errors
    /// Propagates row access failures.
    pub fn group_detectors(&self, groups: &[BTreeSet<DetectorId>]) -> Result<EventWorkspace> {
        let mut rows_by_detector: HashMap<DetectorId, Vec<usize>> = HashMap::new();
        for index in 0..self.number_histograms() {
            for &id in self.event_list(index)?.detector_ids() {
                rows_by_detector.entry(id).or_default().push(index);
            }
        }

        let merge_group = |group: &BTreeSet<DetectorId>| -> Result<EventList> {
            let rows: BTreeSet<usize> = group
                .iter()
                .filter_map(|id| rows_by_detector.get(id))
                .flatten()
                .copied()
                .collect();
            if rows.is_empty() {
                log::debug!("no rows match detector group {group:?}");
            }
            let mut merged = EventList::new();
            for row in rows {
                merged.merge(&*self.event_list(row)?);
            }
            Ok(merged)
        };

        let lists: Vec<EventList> = if self.config().parallel {
            groups.par_iter().map(merge_group).collect::<Result<_>>()?
        } else {
            groups.iter().map(merge_group).collect::<Result<_>>()?
        };

        log::debug!(
            "grouped {} rows into {} detector groups",
            self.number_histograms(),
            lists.len()
        );
        Ok(
            EventWorkspace::from_event_lists(lists, self.default_x().clone())
                .with_config(self.config().clone())
                .with_metadata(self.metadata().clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustevent_core::{BinEdges, PulseTime, SortOrder, TofEvent};

    fn list(ids: &[DetectorId], tofs: &[f64]) -> EventList {
        let mut list = EventList::with_detector_ids(ids.iter().copied());
        for &tof in tofs {
            list.add_event(TofEvent::new(tof, PulseTime(0)));
        }
        list
    }

    fn source() -> EventWorkspace {
        EventWorkspace::from_event_lists(
            vec![
                list(&[1], &[1.0, 2.0]),
                list(&[2], &[3.0]),
                list(&[3, 4], &[0.5, 1.5, 2.5]),
            ],
            BinEdges::new(vec![0.0, 2.0, 4.0]).unwrap(),
        )
    }

    #[test]
    fn test_group_detectors() {
        let ws = source();
        let groups = vec![
            BTreeSet::from([1, 3]),
            BTreeSet::from([2]),
            BTreeSet::from([99]),
        ];
        let grouped = ws.group_detectors(&groups).unwrap();

        assert_eq!(grouped.number_histograms(), 3);
        let first = grouped.event_list(0).unwrap();
        assert_eq!(first.number_events(), 5);
        assert_eq!(first.sort_order(), SortOrder::Unsorted);
        assert_eq!(first.detector_ids(), &BTreeSet::from([1, 3, 4]));
        drop(first);

        assert_eq!(grouped.read_y(0).unwrap().as_slice(), &[3.0, 2.0]);
        assert_eq!(grouped.read_y(1).unwrap().as_slice(), &[0.0, 1.0]);
        assert!(grouped.event_list(2).unwrap().is_empty());
        assert_eq!(grouped.number_events(), ws.number_events());
    }

    #[test]
    fn test_row_counted_once_per_group() {
        let ws = source();
        let grouped = ws.group_detectors(&[BTreeSet::from([3, 4])]).unwrap();
        assert_eq!(grouped.number_events(), 3);
    }

    #[test]
    fn test_serial_grouping_matches_parallel() {
        let groups = vec![BTreeSet::from([1, 2]), BTreeSet::from([4])];
        let parallel = source().group_detectors(&groups).unwrap();
        let serial = source()
            .with_config(crate::WorkspaceConfig::new().with_parallel(false))
            .group_detectors(&groups)
            .unwrap();
        for index in 0..2 {
            assert_eq!(
                parallel.read_y(index).unwrap(),
                serial.read_y(index).unwrap()
            );
        }
        assert!(!serial.config().parallel);
    }
}
