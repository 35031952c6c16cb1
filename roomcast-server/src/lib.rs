//! HTTP ambient surface: a concrete HTTP `Ingress`/`Egress` pair, built on
//! the same framework (`axum` + `utoipa`) this stack already uses for its
//! other REST APIs. Not a separate product — every route here either
//! answers a `GET`, or dispatches synchronously through the
//! [`roomcast_coordinator::Coordinator`].

mod clients;
mod dto;
mod egress;
mod error;
mod events;
mod health;
mod openapi;
mod state;
mod zones;

pub use dto::{ClientResponse, ZoneResponse};
pub use egress::HttpEgress;
pub use openapi::ApiDoc;
pub use state::{AppState, Readiness};

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Builds the full HTTP surface: health routes at the root, `/zones` and
/// `/clients` resources, `/events` SSE, and an OpenAPI document with an
/// embedded Swagger UI mounted under `/api/docs`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest("/zones", zones::router())
        .nest("/clients", clients::router())
        .nest("/events", events::router())
        .merge(SwaggerUi::new("/api/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
}
