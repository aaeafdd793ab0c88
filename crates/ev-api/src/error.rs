//! Maps [`DispatchError`] onto HTTP, the way the teacher's
//! `user_control_api` handlers collapse a domain `Result` into
//! `Result<Json<_>, StatusCode>` at the boundary rather than leaking
//! internal error types into the wire format (§7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ev_core::error::DispatchError;
use serde_json::json;

#[derive(Debug)]
pub struct ApiError(pub DispatchError);

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let DispatchError::Persistence(ref msg) = self.0 {
            return internal_error("store operation failed", msg);
        }

        let (status, kind) = match &self.0 {
            DispatchError::InvalidTarget => (StatusCode::BAD_REQUEST, "invalid_input"),
            DispatchError::DuplicateActiveRequest(_) => {
                (StatusCode::CONFLICT, "duplicate_active_request")
            }
            DispatchError::WaitingAreaFull => (StatusCode::CONFLICT, "waiting_area_full"),
            DispatchError::NotInWaiting => (StatusCode::CONFLICT, "not_in_waiting"),
            DispatchError::NoActiveSession(_) => (StatusCode::NOT_FOUND, "no_active_session"),
            DispatchError::RequestNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            DispatchError::PileNotFound(_) => (StatusCode::NOT_FOUND, "pile_not_found"),
            DispatchError::SameMode => (StatusCode::CONFLICT, "same_mode"),
            DispatchError::InvalidDispatchPolicy(_) => {
                (StatusCode::BAD_REQUEST, "invalid_dispatch_policy")
            }
            DispatchError::Persistence(_) => unreachable!("handled above"),
        };

        (
            status,
            Json(json!({ "error": kind, "message": self.0.to_string() })),
        )
            .into_response()
    }
}

/// Internal failures (persistence, protocol violations) never cross the
/// boundary as anything but a generic 500 plus a logged error, per §7.
pub fn internal_error(context: &str, err: impl std::fmt::Display) -> Response {
    tracing::error!(context, error = %err, "internal error handling request");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal_error" })),
    )
        .into_response()
}
