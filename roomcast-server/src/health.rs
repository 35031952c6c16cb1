//! `GET /healthz` (liveness) and `GET /readyz` (readiness) — the ambient
//! health endpoints every route list in this stack carries alongside its
//! domain routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}

#[utoipa::path(get, path = "/healthz", tag = "health",
    responses((status = 200, description = "Process is alive")))]
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[utoipa::path(get, path = "/readyz", tag = "health",
    responses(
        (status = 200, description = "Snapcast is connected and at least one reconciliation has completed"),
        (status = 503, description = "Not ready yet")))]
pub async fn readyz(State(state): State<AppState>) -> StatusCode {
    if state.readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
