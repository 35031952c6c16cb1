//! `GET/PUT /zones/{id}` plus the zone-scoped command endpoints.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};

use roomcast_coordinator::{Command, SeekPosition, SourceProtocol};

use crate::dto::{PlaylistRequest, SeekRequest, TrackIndexRequest, ZoneResponse, ZoneUpdateRequest};
use crate::error::map_error;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_zones))
        .route("/{id}", get(get_zone).put(update_zone))
        .route("/{id}/play", post(play))
        .route("/{id}/pause", post(pause))
        .route("/{id}/stop", post(stop))
        .route("/{id}/next", post(next))
        .route("/{id}/previous", post(previous))
        .route("/{id}/playlist", put(set_playlist))
        .route("/{id}/track", put(set_track_by_index))
        .route("/{id}/seek", post(seek))
}

fn zone_response(state: &AppState, id: u32) -> Response {
    match state.store.snapshot().zone(id) {
        Some(zone) => Json(ZoneResponse::from(zone)).into_response(),
        None => map_error(roomcast_core::ControlPlaneError::catalog_miss(format!("unknown zone {id}"))),
    }
}

#[utoipa::path(get, path = "/zones", tag = "zones",
    responses((status = 200, description = "List every configured zone", body = [ZoneResponse])))]
pub async fn list_zones(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.store.snapshot();
    let zones: Vec<ZoneResponse> = snapshot.zones.values().map(ZoneResponse::from).collect();
    Json(zones)
}

#[utoipa::path(get, path = "/zones/{id}", tag = "zones",
    params(("id" = u32, Path, description = "Zone id")),
    responses(
        (status = 200, description = "Zone state", body = ZoneResponse),
        (status = 404, description = "No such zone", body = ErrorResponse)))]
pub async fn get_zone(State(state): State<AppState>, Path(id): Path<u32>) -> Response {
    zone_response(&state, id)
}

#[utoipa::path(put, path = "/zones/{id}", tag = "zones",
    params(("id" = u32, Path, description = "Zone id")),
    request_body = ZoneUpdateRequest,
    responses(
        (status = 200, description = "Updated zone state", body = ZoneResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 409, description = "Invariant violation", body = ErrorResponse)))]
pub async fn update_zone(State(state): State<AppState>, Path(id): Path<u32>, Json(req): Json<ZoneUpdateRequest>) -> Response {
    if let Some(volume) = req.volume {
        if let Err(e) = state.coordinator.dispatch_sync(SourceProtocol::Api, Command::SetZoneVolume { zone_id: id, volume }).await {
            return map_error(e);
        }
    }
    if let Some(mute) = req.mute {
        if let Err(e) = state.coordinator.dispatch_sync(SourceProtocol::Api, Command::SetZoneMute { zone_id: id, mute }).await {
            return map_error(e);
        }
    }
    zone_response(&state, id)
}

#[utoipa::path(post, path = "/zones/{id}/play", tag = "zones",
    params(("id" = u32, Path, description = "Zone id")),
    responses((status = 200, description = "Playback started", body = ZoneResponse), (status = 409, body = ErrorResponse)))]
pub async fn play(State(state): State<AppState>, Path(id): Path<u32>) -> Response {
    dispatch_transport(&state, id, Command::Play { zone_id: id }).await
}

#[utoipa::path(post, path = "/zones/{id}/pause", tag = "zones",
    params(("id" = u32, Path, description = "Zone id")),
    responses((status = 200, body = ZoneResponse), (status = 409, body = ErrorResponse)))]
pub async fn pause(State(state): State<AppState>, Path(id): Path<u32>) -> Response {
    dispatch_transport(&state, id, Command::Pause { zone_id: id }).await
}

#[utoipa::path(post, path = "/zones/{id}/stop", tag = "zones",
    params(("id" = u32, Path, description = "Zone id")),
    responses((status = 200, body = ZoneResponse), (status = 409, body = ErrorResponse)))]
pub async fn stop(State(state): State<AppState>, Path(id): Path<u32>) -> Response {
    dispatch_transport(&state, id, Command::Stop { zone_id: id }).await
}

#[utoipa::path(post, path = "/zones/{id}/next", tag = "zones",
    params(("id" = u32, Path, description = "Zone id")),
    responses((status = 200, body = ZoneResponse), (status = 404, body = ErrorResponse)))]
pub async fn next(State(state): State<AppState>, Path(id): Path<u32>) -> Response {
    dispatch_transport(&state, id, Command::Next { zone_id: id }).await
}

#[utoipa::path(post, path = "/zones/{id}/previous", tag = "zones",
    params(("id" = u32, Path, description = "Zone id")),
    responses((status = 200, body = ZoneResponse), (status = 404, body = ErrorResponse)))]
pub async fn previous(State(state): State<AppState>, Path(id): Path<u32>) -> Response {
    dispatch_transport(&state, id, Command::Previous { zone_id: id }).await
}

#[utoipa::path(put, path = "/zones/{id}/playlist", tag = "zones",
    params(("id" = u32, Path, description = "Zone id")),
    request_body = PlaylistRequest,
    responses((status = 200, body = ZoneResponse), (status = 404, description = "Unknown playlist", body = ErrorResponse)))]
pub async fn set_playlist(State(state): State<AppState>, Path(id): Path<u32>, Json(req): Json<PlaylistRequest>) -> Response {
    dispatch_transport(&state, id, Command::SetPlaylist { zone_id: id, playlist_id: req.playlist_id }).await
}

#[utoipa::path(put, path = "/zones/{id}/track", tag = "zones",
    params(("id" = u32, Path, description = "Zone id")),
    request_body = TrackIndexRequest,
    responses((status = 200, body = ZoneResponse), (status = 404, body = ErrorResponse)))]
pub async fn set_track_by_index(State(state): State<AppState>, Path(id): Path<u32>, Json(req): Json<TrackIndexRequest>) -> Response {
    dispatch_transport(&state, id, Command::SetTrackByIndex { zone_id: id, index: req.index }).await
}

#[utoipa::path(post, path = "/zones/{id}/seek", tag = "zones",
    params(("id" = u32, Path, description = "Zone id")),
    request_body = SeekRequest,
    responses(
        (status = 200, body = ZoneResponse),
        (status = 400, description = "Neither position_ms nor fraction given, or the source is not seekable", body = ErrorResponse)))]
pub async fn seek(State(state): State<AppState>, Path(id): Path<u32>, Json(req): Json<SeekRequest>) -> Response {
    let position = match (req.position_ms, req.fraction) {
        (Some(ms), None) => SeekPosition::Millis(ms),
        (None, Some(f)) => SeekPosition::Fraction(f),
        _ => {
            return map_error(roomcast_core::ControlPlaneError::validation(
                "seek requires exactly one of position_ms or fraction",
            ))
        }
    };
    dispatch_transport(&state, id, Command::Seek { zone_id: id, position }).await
}

async fn dispatch_transport(state: &AppState, zone_id: u32, command: Command) -> Response {
    match state.coordinator.dispatch_sync(SourceProtocol::Api, command).await {
        Ok(_) => zone_response(state, zone_id),
        Err(e) => map_error(e),
    }
}
