//! OpenAPI document aggregating every route in this crate, mounted with an
//! embedded Swagger UI the same way this stack's other `utoipa`-documented
//! APIs do.

use utoipa::OpenApi;

use crate::dto::{
    AssignZoneRequest, ClientResponse, ClientUpdateRequest, ErrorResponse, PlaylistRequest, PlaybackStateDto,
    SeekRequest, StatusEventDto, TrackIndexRequest, ZoneResponse, ZoneUpdateRequest,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::zones::list_zones,
        crate::zones::get_zone,
        crate::zones::update_zone,
        crate::zones::play,
        crate::zones::pause,
        crate::zones::stop,
        crate::zones::next,
        crate::zones::previous,
        crate::zones::set_playlist,
        crate::zones::set_track_by_index,
        crate::zones::seek,
        crate::clients::list_clients,
        crate::clients::get_client,
        crate::clients::update_client,
        crate::clients::assign_zone,
        crate::events::events_stream,
        crate::health::healthz,
        crate::health::readyz,
    ),
    components(schemas(
        ZoneResponse,
        ClientResponse,
        PlaybackStateDto,
        ZoneUpdateRequest,
        ClientUpdateRequest,
        PlaylistRequest,
        TrackIndexRequest,
        SeekRequest,
        AssignZoneRequest,
        ErrorResponse,
        StatusEventDto,
    )),
    tags(
        (name = "zones", description = "Zone state and transport commands"),
        (name = "clients", description = "Receiver state and zone assignment"),
        (name = "events", description = "Server-sent status stream"),
        (name = "health", description = "Liveness and readiness"),
    )
)]
pub struct ApiDoc;
