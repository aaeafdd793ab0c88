//! Admin contract (§6): fault injection/recovery, dispatch policy
//! control, and read-only pile/queue queries. No auth middleware per the
//! Transport binding note — access control is the deployer's concern.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use ev_shared::{DispatchPolicy, PileId};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct SetFaultBody {
    pub reason: String,
}

pub async fn set_fault(
    State(state): State<ApiState>,
    Path(pile_id): Path<String>,
    Json(body): Json<SetFaultBody>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .station()
        .set_fault(&PileId::from(pile_id), &body.reason)?;
    Ok(Json(json!({
        "affected_requests": outcome.affected_requests,
        "bills_settled": outcome.bills_settled,
    })))
}

pub async fn recover(
    State(state): State<ApiState>,
    Path(pile_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.station().recover(&PileId::from(pile_id))?;
    Ok(Json(json!({ "rescheduled_requests": outcome.rescheduled_requests })))
}

#[derive(Debug, Deserialize)]
pub struct SetDispatchPolicyBody {
    pub policy: DispatchPolicy,
}

pub async fn set_dispatch_policy(
    State(state): State<ApiState>,
    Json(body): Json<SetDispatchPolicyBody>,
) -> impl IntoResponse {
    state.station().set_dispatch_policy(body.policy);
    Json(json!({ "ok": true }))
}

pub async fn list_piles(State(state): State<ApiState>) -> impl IntoResponse {
    Json(json!({ "piles": state.station().all_pile_snapshots() }))
}

pub async fn pile_detail(
    State(state): State<ApiState>,
    Path(pile_id): Path<String>,
) -> impl IntoResponse {
    match state.station().pile_snapshot(&PileId::from(pile_id)) {
        Some(pile) => Json(json!(pile)).into_response(),
        None => (
            axum::http::StatusCode::NOT_FOUND,
            Json(json!({ "error": "pile_not_found" })),
        )
            .into_response(),
    }
}
