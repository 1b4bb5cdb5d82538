//! Deterministic synthetic event data.

use rayon::prelude::*;
use rustevent_core::{BinEdges, EventList, PulseTime, Result, TofEvent};
use rustevent_workspace::{EventWorkspace, WorkspaceConfig, WorkspaceMetadata};

/// Pulse period of a 60 Hz source, in nanoseconds.
const PULSE_PERIOD_NS: i64 = 16_666_667;

/// Events recorded per source pulse.
const EVENTS_PER_PULSE: usize = 100;

/// Linear congruential generator; same constants as the classic C `rand`.
struct Lcg(u64);

impl Lcg {
    fn next_u32(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_103_515_245).wrapping_add(12_345) & 0x7fff_ffff;
        // Masked to 31 bits above.
        #[allow(clippy::cast_possible_truncation)]
        let value = self.0 as u32;
        value
    }

    /// Uniform in `[0, 1)`.
    fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32()) / f64::from(0x8000_0000_u32)
    }
}

/// Shape of a synthetic run.
#[derive(Debug, Clone)]
pub struct SyntheticRun {
    pub rows: usize,
    pub events_per_row: usize,
    pub tof_max: f64,
    pub seed: u64,
}

impl Default for SyntheticRun {
    fn default() -> Self {
        Self {
            rows: 64,
            events_per_row: 100_000,
            tof_max: 20_000.0,
            seed: 12_345,
        }
    }
}

impl SyntheticRun {
    /// Builds an event workspace with unsorted, triangularly distributed
    /// time-of-flight values peaking at `tof_max / 2`.
    ///
    /// # Errors
    /// Fails only if `tof_max` is not a valid upper edge.
    pub fn build(&self, config: WorkspaceConfig) -> Result<EventWorkspace> {
        let lists: Vec<EventList> = (0..self.rows)
            .into_par_iter()
            .map(|row| self.build_row(row))
            .collect();
        let edges = BinEdges::new(vec![0.0, self.tof_max])?;
        let metadata = WorkspaceMetadata::default()
            .with_title(format!("synthetic run, seed {}", self.seed))
            .with_instrument("synthetic");
        Ok(EventWorkspace::from_event_lists(lists, edges)
            .with_config(config)
            .with_metadata(metadata))
    }

    fn build_row(&self, row: usize) -> EventList {
        let detector = i32::try_from(row).unwrap_or(i32::MAX);
        let mut list = EventList::with_detector_ids([detector]);
        let mut rng = Lcg(self.seed ^ (row as u64).wrapping_mul(0x9e37_79b9));
        let mut pulse = 0_i64;
        for i in 0..self.events_per_row {
            if i > 0 && i % EVENTS_PER_PULSE == 0 {
                pulse += PULSE_PERIOD_NS;
            }
            let tof = 0.5 * self.tof_max * (rng.next_f64() + rng.next_f64());
            list.add_event(TofEvent::new(tof, PulseTime(pulse)));
        }
        list
    }
}
