use std::sync::Arc;

use chrono::{TimeZone, Utc};
use ev_core::clock::TestClock;
use ev_core::config::StationConfig;
use ev_core::station::Station;
use ev_core::store::SessionBillStore;
use ev_shared::{PileId, PileStatus};
use ev_store::db::SqliteStore;
use ev_store::heartbeat::HeartbeatTracker;

fn sqlite_path(dir: &tempfile::TempDir) -> String {
    dir.path().join("station.db").to_str().unwrap().to_owned()
}

#[test]
fn sqlite_store_persists_across_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = sqlite_path(&dir);

    {
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.next_bill_sequence("20240101").unwrap(), 1);
    }
    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.next_bill_sequence("20240101").unwrap(), 2);
}

#[tokio::test]
async fn heartbeat_monitor_marks_stale_pile_offline() {
    let clock = Arc::new(TestClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()));
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(&sqlite_path(&dir)).unwrap());
    let station = Arc::new(Station::new(&StationConfig::default(), clock.clone(), store));
    let tracker = Arc::new(HeartbeatTracker::new());

    // Pile A heartbeats once, then the clock moves on and it never
    // heartbeats again; the monitor scans against real wall-clock time
    // (`Utc::now`), so seed a stale sample directly in the past.
    let stale = Utc::now() - chrono::Duration::seconds(120);
    tracker.record(PileId::from("A"), stale, PileStatus::Available);

    let handle = ev_store::monitor::spawn_heartbeat_monitor(station.clone(), tracker.clone(), 5, None);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    // The interval ticks on real tokio time, not the station's injected
    // clock; give it a couple of poll periods to run at least once.
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;

    let snapshot = station.pile_snapshot(&PileId::from("A")).unwrap();
    assert_eq!(snapshot.status, PileStatus::Offline);

    handle.abort();
}

#[tokio::test]
async fn heartbeat_monitor_restores_pile_once_heartbeats_resume() {
    let clock = Arc::new(TestClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()));
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(&sqlite_path(&dir)).unwrap());
    let station = Arc::new(Station::new(&StationConfig::default(), clock.clone(), store));
    let tracker = Arc::new(HeartbeatTracker::new());

    station.mark_pile_offline(&PileId::from("A"));
    tracker.record(PileId::from("A"), Utc::now(), PileStatus::Available);

    let handle = ev_store::monitor::spawn_heartbeat_monitor(station.clone(), tracker.clone(), 5, None);
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;

    let snapshot = station.pile_snapshot(&PileId::from("A")).unwrap();
    assert_eq!(snapshot.status, PileStatus::Available);

    handle.abort();
}
