//! Maps the shared `ControlPlaneError` taxonomy onto HTTP responses —
//! this crate's concretization of the "protocol adapters translate each
//! taxonomy entry into their natural failure mode" propagation policy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use roomcast_core::ControlPlaneError;

use crate::dto::ErrorResponse;

pub fn map_error(err: ControlPlaneError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let error = match &err {
        ControlPlaneError::Validation(_) => "validation",
        ControlPlaneError::InvariantViolation(_) => "invariant_violation",
        ControlPlaneError::Transient(_) => "transient",
        ControlPlaneError::CatalogMiss(_) => "catalog_miss",
        ControlPlaneError::Fatal(_) => "fatal",
    };
    (status, Json(ErrorResponse { error: error.to_string(), message: err.to_string() })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_entity_maps_to_404() {
        let response = map_error(ControlPlaneError::catalog_miss("unknown zone 99"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_maps_to_400() {
        let response = map_error(ControlPlaneError::validation("bad input"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
