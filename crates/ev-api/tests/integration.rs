use std::sync::Arc;

use chrono::{TimeZone, Utc};
use ev_core::clock::TestClock;
use ev_core::config::StationConfig;
use ev_core::station::Station;
use ev_core::store::MemoryStore;
use ev_shared::PileId;
use ev_store::heartbeat::HeartbeatTracker;

async fn spawn_test_server() -> (String, Arc<Station>) {
    let clock = Arc::new(TestClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()));
    let store = Arc::new(MemoryStore::new());
    let station = Arc::new(Station::new(&StationConfig::default(), clock, store));
    let heartbeats = Arc::new(HeartbeatTracker::new());
    let state = ev_api::ApiState::new(station.clone(), heartbeats);
    let router = ev_api::build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{addr}"), station)
}

#[tokio::test]
async fn submit_request_then_get_status_round_trips() {
    let (base, _station) = spawn_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/api/users/u1/requests"))
        .json(&serde_json::json!({ "mode": "fast", "target_kwh": 30.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["request_id"].as_str().is_some());

    let status = client
        .get(format!("{base}/api/users/u1/status"))
        .send()
        .await
        .unwrap();
    assert_eq!(status.status(), 200);
    let status_body: serde_json::Value = status.json().await.unwrap();
    assert_eq!(status_body["target_kwh"], 30.0);
}

#[tokio::test]
async fn duplicate_active_request_returns_conflict() {
    let (base, _station) = spawn_test_server().await;
    let client = reqwest::Client::new();

    let first = client
        .post(format!("{base}/api/users/u1/requests"))
        .json(&serde_json::json!({ "mode": "fast", "target_kwh": 30.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);

    let second = client
        .post(format!("{base}/api/users/u1/requests"))
        .json(&serde_json::json!({ "mode": "fast", "target_kwh": 10.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 409);
}

#[tokio::test]
async fn pile_heartbeat_then_register_round_trips() {
    let (base, _station) = spawn_test_server().await;
    let client = reqwest::Client::new();

    let ack = client
        .post(format!("{base}/api/piles/heartbeat"))
        .json(&serde_json::json!({ "pile_id": "A", "ts": Utc::now(), "status": "AVAILABLE" }))
        .send()
        .await
        .unwrap();
    assert_eq!(ack.status(), 200);
    let ack_body: serde_json::Value = ack.json().await.unwrap();
    assert_eq!(ack_body["ok"], true);

    let register = client
        .post(format!("{base}/api/piles/register"))
        .json(&serde_json::json!({ "pile_id": "A", "type": "fast", "power_kw": 30.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(register.status(), 200);
}

#[tokio::test]
async fn unknown_pile_register_is_not_found() {
    let (base, _station) = spawn_test_server().await;
    let client = reqwest::Client::new();

    let register = client
        .post(format!("{base}/api/piles/register"))
        .json(&serde_json::json!({ "pile_id": "ZZZ", "type": "fast", "power_kw": 30.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(register.status(), 404);
}

#[tokio::test]
async fn dispatch_assigns_a_pile_the_relay_would_observe() {
    let (_base, station) = spawn_test_server().await;

    // Exercises the same station state transition the command relay
    // (`ApiState::spawn_command_relay`) diffs on its poll tick to emit
    // `START_CHARGING`; the relay itself runs on a timer this test would
    // otherwise have to race.
    station
        .submit_request(ev_shared::UserId::from("u1"), ev_shared::ChargeMode::Fast, 30.0)
        .unwrap();
    station.run_dispatch_pass();
    assert_eq!(
        station.pile_snapshot(&PileId::from("A")).unwrap().status,
        ev_shared::PileStatus::Charging
    );
}
