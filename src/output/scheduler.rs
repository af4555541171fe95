//! Output cadence: when a snapshot is due.
//!
//! The scheduler detects boundaries *crossed* since the last emission rather
//! than testing `t` against exact multiples, since `dt` need not divide
//! `dtout`. Over a run from 0 to `t1` it fires `floor(t1/dtout) + 1` times,
//! the initial `t = 0` snapshot included.

/// Tracks which cadence boundaries have been emitted.
#[derive(Debug, Clone)]
pub struct OutputScheduler {
    dtout: f64,
    emitted: u64,
}

/// Absolute slack on the boundary index, absorbing accumulated float drift
/// in `t` without ever skipping or double-counting a boundary.
const BOUNDARY_SLACK: f64 = 1e-9;

impl OutputScheduler {
    pub fn new(dtout: f64) -> Self {
        Self { dtout, emitted: 0 }
    }

    /// Number of snapshots due at time `t`: one per cadence boundary crossed
    /// since the last emission. The first poll at `t = 0` reports 1.
    pub fn due(&self, t: f64) -> u64 {
        let crossed = (t / self.dtout + BOUNDARY_SLACK).floor() as u64 + 1;
        crossed.saturating_sub(self.emitted)
    }

    /// Record one emitted snapshot.
    pub fn mark_emitted(&mut self) {
        self.emitted += 1;
    }

    /// Total snapshots emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}
