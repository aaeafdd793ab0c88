//! Shared map of per-pile last-heartbeat timestamps (C10). `ev-api`'s
//! inbound `heartbeat` handler records into this map; [`crate::monitor`]
//! polls it. Kept as its own small type, distinct from `Station`, because
//! it is genuinely transient bookkeeping (§3: "not persisted beyond
//! process lifetime") rather than dispatch state.

use chrono::{DateTime, Utc};
use ev_shared::{PileId, PileStatus};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct HeartbeatSample {
    pub received_at: DateTime<Utc>,
    pub reported_status: PileStatus,
}

#[derive(Debug, Default)]
pub struct HeartbeatTracker {
    samples: Mutex<HashMap<PileId, HeartbeatSample>>,
}

impl HeartbeatTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, pile_id: PileId, received_at: DateTime<Utc>, reported_status: PileStatus) {
        self.samples.lock().insert(
            pile_id,
            HeartbeatSample {
                received_at,
                reported_status,
            },
        );
    }

    /// One lock acquisition for the whole table, per §4.10's note that the
    /// monitor scans under a single lock per tick rather than per pile.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<PileId, HeartbeatSample> {
        self.samples.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn records_and_snapshots_independently_per_pile() {
        let tracker = HeartbeatTracker::new();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        tracker.record(PileId::from("A"), t, PileStatus::Available);
        tracker.record(PileId::from("B"), t, PileStatus::Charging);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[&PileId::from("A")].reported_status, PileStatus::Available);
    }

    #[test]
    fn later_record_overwrites_the_same_pile() {
        let tracker = HeartbeatTracker::new();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 30).unwrap();
        tracker.record(PileId::from("A"), t1, PileStatus::Available);
        tracker.record(PileId::from("A"), t2, PileStatus::Charging);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot[&PileId::from("A")].received_at, t2);
    }
}
