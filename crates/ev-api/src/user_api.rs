//! User-facing command contract (§6), bound to HTTP with JSON bodies and
//! no auth middleware, per the Transport binding note. Handler shape
//! follows the teacher's `mobile_api` handlers: `State<ApiState>` plus a
//! `Json<_>` body in, `impl IntoResponse` out, domain errors converted by
//! [`crate::error::ApiError`].

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use ev_shared::{ChargeMode, RequestId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiError;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequestBody {
    pub mode: ChargeMode,
    pub target_kwh: f64,
}

#[derive(Debug, Serialize)]
pub struct SubmitRequestResponse {
    pub request_id: String,
    pub queue_number: String,
}

pub async fn submit_request(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Json(body): Json<SubmitRequestBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = state
        .station()
        .submit_request(UserId::from(user_id), body.mode, body.target_kwh)?;

    Ok(Json(SubmitRequestResponse {
        request_id: request.request_id.0,
        queue_number: request.queue_number,
    }))
}

pub async fn get_status(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    match state.station().get_status(&UserId::from(user_id)) {
        Some(view) => Json(StatusView::from(view)).into_response(),
        None => (
            axum::http::StatusCode::NOT_FOUND,
            Json(json!({ "error": "not_found" })),
        )
            .into_response(),
    }
}

#[derive(Debug, Serialize)]
struct StatusView {
    request_id: String,
    queue_number: String,
    mode: ChargeMode,
    status: ev_shared::RequestStatus,
    target_kwh: f64,
    delivered_kwh: Option<f64>,
    assigned_pile_id: Option<String>,
}

impl From<ev_core::station::RequestStatusView> for StatusView {
    fn from(v: ev_core::station::RequestStatusView) -> Self {
        Self {
            request_id: v.request_id.0,
            queue_number: v.queue_number,
            mode: v.mode,
            status: v.status,
            target_kwh: v.target_kwh,
            delivered_kwh: v.delivered_kwh,
            assigned_pile_id: v.assigned_pile_id.map(|p| p.0),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ModifyTargetBody {
    pub target_kwh: f64,
}

pub async fn modify_target(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Json(body): Json<ModifyTargetBody>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .station()
        .modify_target(&UserId::from(user_id), body.target_kwh)?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct ModifyModeBody {
    pub mode: ChargeMode,
}

pub async fn modify_mode(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Json(body): Json<ModifyModeBody>,
) -> Result<impl IntoResponse, ApiError> {
    let new_queue_number = state
        .station()
        .modify_mode(&UserId::from(user_id), body.mode)?;
    Ok(Json(json!({ "ok": true, "queue_number": new_queue_number })))
}

pub async fn cancel(
    State(state): State<ApiState>,
    Path((user_id, request_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .station()
        .cancel(&UserId::from(user_id), &RequestId::from(request_id))?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn stop_charging(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let bill = state.station().stop_charging(&UserId::from(user_id))?;
    Ok(Json(json!({ "ok": true, "bill": bill })))
}

#[derive(Debug, Deserialize)]
pub struct ListRecordsQuery {
    pub sort: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn list_records(
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
    Query(query): Query<ListRecordsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mut records = state.station().list_records(&UserId::from(user_id))?;

    match query.sort.as_deref() {
        Some("time_desc") => records.sort_by(|a, b| b.session.start_at.cmp(&a.session.start_at)),
        Some("cost_asc") => records.sort_by_key(|r| r.bill.as_ref().map(|b| b.total_cost.0).unwrap_or(0)),
        Some("cost_desc") => {
            records.sort_by_key(|r| std::cmp::Reverse(r.bill.as_ref().map(|b| b.total_cost.0).unwrap_or(0)));
        }
        _ => records.sort_by(|a, b| a.session.start_at.cmp(&b.session.start_at)), // time_asc default
    }

    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(records.len());
    let page: Vec<_> = records.into_iter().skip(offset).take(limit).collect();

    Ok(Json(json!({ "records": page })))
}
