//! Pile <-> core wire protocol (§6), bound to HTTP under `/api/piles/*`.
//! Inbound messages (`register`, `heartbeat`, `status_report`, `progress`,
//! `complete`) are handled here; outbound commands are delivered through
//! the long-poll `GET /api/piles/:id/commands` endpoint backed by
//! [`ApiState::poll_commands`].
//!
//! `progress`/`complete` are accepted and logged but do not themselves
//! mutate station state: this station's dispatch core is the source of
//! truth for simulated energy delivery (`Station::tick_progress_all`
//! driven by the background dispatch loop), so a pile's own report is an
//! echo of what the core already computed rather than an update to apply.
//! A protocol violation (unknown pile/session) is logged and dropped per
//! §7's recovery policy, never turned into a state mutation.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use ev_core::error::ProtocolViolation;
use ev_shared::{
    PileHeartbeat, PileHeartbeatAck, PileId, PileRegisterRequest, PileStatusReport, ProgressReport,
    SessionCompleteReport,
};
use serde_json::json;
use tracing::{info, warn};

use crate::state::ApiState;

const COMMAND_LONG_POLL_TIMEOUT: Duration = Duration::from_secs(25);

pub async fn register(
    State(state): State<ApiState>,
    Json(body): Json<PileRegisterRequest>,
) -> impl IntoResponse {
    match state.station().pile_snapshot(&body.pile_id) {
        Some(_) => {
            info!(pile_id = %body.pile_id, power_kw = body.power_kw, "pile registered");
            Json(json!({ "ok": true })).into_response()
        }
        None => (
            axum::http::StatusCode::NOT_FOUND,
            Json(json!({ "error": "pile_not_found" })),
        )
            .into_response(),
    }
}

pub async fn heartbeat(
    State(state): State<ApiState>,
    Json(body): Json<PileHeartbeat>,
) -> Json<PileHeartbeatAck> {
    state.heartbeats().record(body.pile_id, body.ts, body.status);
    Json(PileHeartbeatAck {
        ok: true,
        server_time: Utc::now(),
    })
}

pub async fn status_report(
    State(_state): State<ApiState>,
    Json(body): Json<PileStatusReport>,
) -> impl IntoResponse {
    info!(pile_id = %body.pile_id, status = ?body.status, "status report received");
    axum::http::StatusCode::NO_CONTENT
}

pub async fn progress(
    State(state): State<ApiState>,
    Json(body): Json<ProgressReport>,
) -> impl IntoResponse {
    let Some(pile) = state.station().pile_snapshot(&body.pile_id) else {
        let violation = ProtocolViolation::UnknownPile(body.pile_id.clone());
        warn!(error = %violation, "dropping progress report");
        return axum::http::StatusCode::OK;
    };

    let known_session = pile
        .current
        .as_ref()
        .map(|s| s.user_id == body.user_id)
        .unwrap_or(false);
    if !known_session {
        let violation = ProtocolViolation::UnknownSession(body.pile_id.clone());
        warn!(error = %violation, "dropping progress report");
        return axum::http::StatusCode::OK;
    }

    if !state_is_plausible(&body) {
        warn!(pile_id = %body.pile_id, "progress report rejected: implausible values");
    }
    axum::http::StatusCode::OK
}

fn state_is_plausible(report: &ProgressReport) -> bool {
    report.delivered_kwh >= 0.0 && report.target_kwh >= 0.0
}

pub async fn complete(Json(body): Json<SessionCompleteReport>) -> impl IntoResponse {
    info!(
        pile_id = %body.pile_id,
        user_id = %body.user_id,
        status = ?body.status,
        "session complete report received"
    );
    axum::http::StatusCode::OK
}

pub async fn poll_commands(
    State(state): State<ApiState>,
    Path(pile_id): Path<String>,
) -> impl IntoResponse {
    let commands = state
        .poll_commands(&PileId::from(pile_id), COMMAND_LONG_POLL_TIMEOUT)
        .await;
    Json(json!({ "commands": commands }))
}
