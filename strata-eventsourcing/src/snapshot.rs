//! Snapshot cadence

/// Snapshot threshold used when an aggregate does not override it
pub const DEFAULT_SNAPSHOT_THRESHOLD: u32 = 30;

/// Countdown deciding when the next snapshot is due.
///
/// Starts at the threshold and drops by one for every newly raised event. A
/// snapshot is due once it reaches zero. Loading an aggregate seeds it with
/// `threshold - events replayed since the last snapshot`; replayed events are
/// accounted for there and never tick it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotCountdown {
    threshold: i64,
    remaining: i64,
    snapshot_taken: bool,
}

impl SnapshotCountdown {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: i64::from(threshold),
            remaining: i64::from(threshold),
            snapshot_taken: false,
        }
    }

    pub fn threshold(&self) -> u32 {
        // threshold is built from a u32
        u32::try_from(self.threshold).unwrap_or(u32::MAX)
    }

    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    /// Record one newly raised event.
    pub fn tick(&mut self) {
        self.remaining -= 1;
    }

    pub fn is_due(&self) -> bool {
        self.remaining <= 0
    }

    /// Reseed after loading, given how many events were replayed on top of
    /// the latest snapshot (or from the start when there is none).
    pub fn reseed(&mut self, events_since_snapshot: usize) {
        let replayed = i64::try_from(events_since_snapshot).unwrap_or(i64::MAX);
        self.remaining = self.threshold.saturating_sub(replayed);
        self.snapshot_taken = false;
    }

    /// Remember whether the changes being prepared carry a snapshot.
    pub fn set_snapshot_taken(&mut self, taken: bool) {
        self.snapshot_taken = taken;
    }

    pub fn snapshot_taken(&self) -> bool {
        self.snapshot_taken
    }

    /// Called once the prepared changes are persisted.
    pub fn on_commit(&mut self) {
        if self.snapshot_taken {
            self.remaining = self.threshold;
            self.snapshot_taken = false;
        }
    }
}

impl Default for SnapshotCountdown {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_THRESHOLD)
    }
}
