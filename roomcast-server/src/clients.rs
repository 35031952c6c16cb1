//! `GET/PUT /clients/{id}` plus the client-scoped zone-assignment endpoint
//!.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use roomcast_coordinator::{Command, SourceProtocol};

use crate::dto::{AssignZoneRequest, ClientResponse, ClientUpdateRequest};
use crate::error::map_error;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_clients))
        .route("/{id}", get(get_client).put(update_client))
        .route("/{id}/zone", post(assign_zone))
}

fn client_response(state: &AppState, id: u32) -> Response {
    match state.store.snapshot().client(id) {
        Some(client) => Json(ClientResponse::from(client)).into_response(),
        None => map_error(roomcast_core::ControlPlaneError::catalog_miss(format!("unknown client {id}"))),
    }
}

#[utoipa::path(get, path = "/clients", tag = "clients",
    responses((status = 200, description = "List every configured client", body = [ClientResponse])))]
pub async fn list_clients(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.store.snapshot();
    let clients: Vec<ClientResponse> = snapshot.clients.values().map(ClientResponse::from).collect();
    Json(clients)
}

#[utoipa::path(get, path = "/clients/{id}", tag = "clients",
    params(("id" = u32, Path, description = "Client id")),
    responses(
        (status = 200, description = "Client state", body = ClientResponse),
        (status = 404, description = "No such client", body = ErrorResponse)))]
pub async fn get_client(State(state): State<AppState>, Path(id): Path<u32>) -> Response {
    client_response(&state, id)
}

#[utoipa::path(put, path = "/clients/{id}", tag = "clients",
    params(("id" = u32, Path, description = "Client id")),
    request_body = ClientUpdateRequest,
    responses(
        (status = 200, description = "Updated client state", body = ClientResponse),
        (status = 400, body = ErrorResponse),
        (status = 409, description = "Invariant violation (e.g. unknown target zone)", body = ErrorResponse)))]
pub async fn update_client(State(state): State<AppState>, Path(id): Path<u32>, Json(req): Json<ClientUpdateRequest>) -> Response {
    if let Some(volume) = req.volume {
        if let Err(e) = state.coordinator.dispatch_sync(SourceProtocol::Api, Command::SetClientVolume { client_id: id, volume }).await {
            return map_error(e);
        }
    }
    if let Some(mute) = req.mute {
        if let Err(e) = state.coordinator.dispatch_sync(SourceProtocol::Api, Command::SetClientMute { client_id: id, mute }).await {
            return map_error(e);
        }
    }
    if let Some(zone_id) = req.zone_id {
        if let Err(e) = state.coordinator.dispatch_sync(SourceProtocol::Api, Command::AssignClientToZone { client_id: id, zone_id }).await {
            return map_error(e);
        }
    }
    client_response(&state, id)
}

#[utoipa::path(post, path = "/clients/{id}/zone", tag = "clients",
    params(("id" = u32, Path, description = "Client id")),
    request_body = AssignZoneRequest,
    responses(
        (status = 200, body = ClientResponse),
        (status = 409, description = "Target zone does not exist", body = ErrorResponse)))]
pub async fn assign_zone(State(state): State<AppState>, Path(id): Path<u32>, Json(req): Json<AssignZoneRequest>) -> Response {
    match state
        .coordinator
        .dispatch_sync(SourceProtocol::Api, Command::AssignClientToZone { client_id: id, zone_id: req.zone_id })
        .await
    {
        Ok(_) => client_response(&state, id),
        Err(e) => map_error(e),
    }
}
