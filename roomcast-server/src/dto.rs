//! Response/request DTOs for the HTTP surface. Kept separate from
//! the domain model in `roomcast_core::model` the way this stack's other API
//! modules (e.g. the playlist REST API) keep their wire shapes distinct from
//! the types they are built from.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use roomcast_core::model::{Client, PlaybackState, Zone};
use roomcast_coordinator::{StatusEvent, StatusPayload};

#[derive(Debug, Serialize, ToSchema)]
pub struct ZoneResponse {
    pub id: u32,
    pub name: String,
    pub playback_state: PlaybackStateDto,
    pub volume: u8,
    pub mute: bool,
    pub track_repeat: bool,
    pub playlist_repeat: bool,
    pub shuffle: bool,
    pub playlist_id: Option<u32>,
    pub current_track_id: Option<u32>,
    pub snapcast_group_id: Option<String>,
    pub snapcast_stream_id: Option<String>,
    pub client_ids: Vec<u32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStateDto {
    Stopped,
    Playing,
    Paused,
    Buffering,
    Error,
}

impl From<PlaybackState> for PlaybackStateDto {
    fn from(state: PlaybackState) -> Self {
        match state {
            PlaybackState::Stopped => PlaybackStateDto::Stopped,
            PlaybackState::Playing => PlaybackStateDto::Playing,
            PlaybackState::Paused => PlaybackStateDto::Paused,
            PlaybackState::Buffering => PlaybackStateDto::Buffering,
            PlaybackState::Error => PlaybackStateDto::Error,
        }
    }
}

impl From<&Zone> for ZoneResponse {
    fn from(zone: &Zone) -> Self {
        Self {
            id: zone.id,
            name: zone.name.clone(),
            playback_state: zone.playback_state.into(),
            volume: zone.volume,
            mute: zone.mute,
            track_repeat: zone.track_repeat,
            playlist_repeat: zone.playlist_repeat,
            shuffle: zone.shuffle,
            playlist_id: zone.playlist_id,
            current_track_id: zone.current_track_id,
            snapcast_group_id: zone.snapcast_group_id.clone(),
            snapcast_stream_id: zone.snapcast_stream_id.clone(),
            client_ids: zone.client_ids.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClientResponse {
    pub id: u32,
    pub name: String,
    pub mac: String,
    pub snapcast_uuid: Option<String>,
    pub connected: bool,
    pub volume: u8,
    pub mute: bool,
    pub latency_ms: u32,
    pub zone_id: Option<u32>,
}

impl From<&Client> for ClientResponse {
    fn from(client: &Client) -> Self {
        Self {
            id: client.id,
            name: client.name.clone(),
            mac: client.mac.clone(),
            snapcast_uuid: client.snapcast_uuid.clone(),
            connected: client.connected,
            volume: client.volume,
            mute: client.mute,
            latency_ms: client.latency_ms,
            zone_id: client.zone_id,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ZoneUpdateRequest {
    #[serde(default)]
    #[schema(minimum = 0, maximum = 100)]
    pub volume: Option<u8>,
    #[serde(default)]
    pub mute: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ClientUpdateRequest {
    #[serde(default)]
    #[schema(minimum = 0, maximum = 100)]
    pub volume: Option<u8>,
    #[serde(default)]
    pub mute: Option<bool>,
    /// Tri-state: absent leaves the binding untouched, `null` unassigns the
    /// client, a value moves it to that zone.
    #[serde(default)]
    pub zone_id: Option<Option<u32>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PlaylistRequest {
    pub playlist_id: u32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TrackIndexRequest {
    pub index: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SeekRequest {
    #[serde(default)]
    pub position_ms: Option<u64>,
    #[serde(default)]
    #[schema(minimum = 0.0, maximum = 1.0)]
    pub fraction: Option<f64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignZoneRequest {
    pub zone_id: Option<u32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// The payload shape published on the `/events` SSE stream: one JSON object
/// per `StatusEvent`.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusEventDto {
    pub entity_kind: String,
    pub entity_id: u32,
    pub field: String,
    pub value: serde_json::Value,
}

impl From<&StatusEvent> for StatusEventDto {
    fn from(event: &StatusEvent) -> Self {
        let value = match &event.payload {
            StatusPayload::Bool(b) => serde_json::json!(b),
            StatusPayload::U8(n) => serde_json::json!(n),
            StatusPayload::U32(n) => serde_json::json!(n),
            StatusPayload::OptionU32(n) => serde_json::json!(n),
            StatusPayload::PlaybackState(state) => serde_json::json!(PlaybackStateDto::from(*state)),
        };
        Self {
            entity_kind: format!("{:?}", event.entity_kind).to_lowercase(),
            entity_id: event.entity_id,
            field: event.field.to_string(),
            value,
        }
    }
}
