//! Deterministic end-to-end scenarios driving a `Station` through an
//! injected `TestClock`, per the station's design notes on reproducible
//! literal-value tests.

use chrono::{TimeZone, Utc};
use ev_core::clock::TestClock;
use ev_core::config::StationConfig;
use ev_core::station::Station;
use ev_core::store::MemoryStore;
use ev_shared::{ChargeMode, PileId, PileStatus, RequestStatus, UserId};
use std::sync::Arc;

fn station() -> (Arc<Station>, Arc<TestClock>) {
    let clock = Arc::new(TestClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()));
    let config = StationConfig::default();
    let store = Arc::new(MemoryStore::new());
    let station = Arc::new(Station::new(&config, clock.clone(), store));
    (station, clock)
}

#[test]
fn single_car_happy_path() {
    let (station, clock) = station();
    let request = station
        .submit_request(UserId::from("u1"), ChargeMode::Fast, 30.0)
        .unwrap();
    assert_eq!(request.queue_number, "F1");

    station.run_dispatch_pass();
    let status = station.get_status(&UserId::from("u1")).unwrap();
    assert_eq!(status.status, RequestStatus::Charging);
    assert_eq!(status.assigned_pile_id, Some(PileId::from("A")));

    clock.advance(chrono::Duration::hours(1));
    station.tick_progress_all(3600.0);

    let status_after = station.get_status(&UserId::from("u1"));
    assert!(status_after.is_none(), "request should be terminal after completion");

    let records = station.list_records(&UserId::from("u1")).unwrap();
    assert_eq!(records.len(), 1);
    let bill = records[0].bill.as_ref().unwrap();
    assert_eq!(bill.total_cost.to_string(), "54.00");
}

#[test]
fn tie_break_prefers_lower_pile_id() {
    let (station, _clock) = station();
    // Both fast piles (A, B) are idle and identical; the first fast
    // request must land on A.
    station.submit_request(UserId::from("u1"), ChargeMode::Fast, 30.0).unwrap();
    station.run_dispatch_pass();
    let status = station.get_status(&UserId::from("u1")).unwrap();
    assert_eq!(status.assigned_pile_id, Some(PileId::from("A")));
}

#[test]
fn shortest_completion_time_selection() {
    let (station, clock) = station();
    // Fill pile A with a long session, leaving B free; the next fast
    // request must prefer B over A's queued slot.
    station.submit_request(UserId::from("u1"), ChargeMode::Fast, 30.0).unwrap();
    station.run_dispatch_pass();
    clock.advance(chrono::Duration::minutes(10));
    station.tick_progress_all(600.0);

    station.submit_request(UserId::from("u2"), ChargeMode::Fast, 10.0).unwrap();
    station.run_dispatch_pass();
    let status = station.get_status(&UserId::from("u2")).unwrap();
    assert_eq!(status.assigned_pile_id, Some(PileId::from("B")));
    assert_eq!(status.status, RequestStatus::Charging);
}

#[test]
fn waiting_area_rejects_once_full() {
    let (station, _clock) = station();
    for i in 0..6 {
        station
            .submit_request(UserId::from(format!("u{i}")), ChargeMode::Trickle, 5.0)
            .unwrap();
    }
    let err = station
        .submit_request(UserId::from("overflow"), ChargeMode::Trickle, 5.0)
        .unwrap_err();
    assert_eq!(err, ev_core::error::DispatchError::WaitingAreaFull);
}

#[test]
fn fault_under_priority_policy_returns_request_to_head() {
    let (station, clock) = station();
    station.submit_request(UserId::from("u1"), ChargeMode::Fast, 30.0).unwrap();
    station.run_dispatch_pass();
    clock.advance(chrono::Duration::minutes(20));
    station.tick_progress_all(1200.0);

    let outcome = station.set_fault(&PileId::from("A"), "simulated").unwrap();
    assert_eq!(outcome.affected_requests.len(), 1);
    assert_eq!(outcome.bills_settled.len(), 1);

    // Pile B is free and matches mode, so the evicted request should be
    // immediately re-dispatched there rather than sitting in the waiting area.
    let status = station.get_status(&UserId::from("u1")).unwrap();
    assert_eq!(status.assigned_pile_id, Some(PileId::from("B")));
    assert_eq!(status.status, RequestStatus::Charging);
    // The remaining target should be reduced by what was already delivered.
    assert!(status.target_kwh < 30.0);
}

#[test]
fn recovery_rebalances_waiting_cars() {
    let (station, clock) = station();
    // Saturate both fast piles' charging slots, then queue a third fast
    // request (goes to waiting_car of whichever pile it lands on).
    station.submit_request(UserId::from("u1"), ChargeMode::Fast, 30.0).unwrap();
    station.run_dispatch_pass();
    station.submit_request(UserId::from("u2"), ChargeMode::Fast, 30.0).unwrap();
    station.run_dispatch_pass();
    station.submit_request(UserId::from("u3"), ChargeMode::Fast, 10.0).unwrap();
    station.run_dispatch_pass();

    clock.advance(chrono::Duration::minutes(5));
    station.tick_progress_all(300.0);

    station.set_fault(&PileId::from("A"), "simulated").unwrap();
    station.recover(&PileId::from("A")).unwrap();

    // Recovery clears FAULT; the pile may immediately pick up a
    // rebalanced car, so it should now be AVAILABLE or CHARGING, never
    // stuck at FAULT or OFFLINE.
    let snapshot = station.pile_snapshot(&PileId::from("A")).unwrap();
    assert!(matches!(
        snapshot.status,
        PileStatus::Available | PileStatus::Charging
    ));
}
