//! Wires the three contracts (§6) onto one `axum::Router`, the same
//! shape as the teacher's `start_web_server` route table: plain JSON
//! routes, a permissive CORS layer, no auth middleware — both left to
//! the deployer per the Transport binding note.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::ApiState;
use crate::{admin_api, pile_api, user_api};

#[must_use]
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/users/{user_id}/requests", post(user_api::submit_request))
        .route("/api/users/{user_id}/status", get(user_api::get_status))
        .route("/api/users/{user_id}/target", post(user_api::modify_target))
        .route("/api/users/{user_id}/mode", post(user_api::modify_mode))
        .route(
            "/api/users/{user_id}/requests/{request_id}",
            axum::routing::delete(user_api::cancel),
        )
        .route("/api/users/{user_id}/stop", post(user_api::stop_charging))
        .route("/api/users/{user_id}/records", get(user_api::list_records))
        .route("/api/admin/piles", get(admin_api::list_piles))
        .route("/api/admin/piles/{pile_id}", get(admin_api::pile_detail))
        .route("/api/admin/piles/{pile_id}/fault", post(admin_api::set_fault))
        .route("/api/admin/piles/{pile_id}/recover", post(admin_api::recover))
        .route("/api/admin/dispatch-policy", post(admin_api::set_dispatch_policy))
        .route("/api/piles/register", post(pile_api::register))
        .route("/api/piles/heartbeat", post(pile_api::heartbeat))
        .route("/api/piles/status_report", post(pile_api::status_report))
        .route("/api/piles/progress", post(pile_api::progress))
        .route("/api/piles/complete", post(pile_api::complete))
        .route("/api/piles/{pile_id}/commands", get(pile_api::poll_commands))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
