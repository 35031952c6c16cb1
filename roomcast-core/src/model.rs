//! Zone / Client / Track / Playlist / SnapcastView — the entities owned
//! exclusively by the state store.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ZoneId = u32;
pub type ClientId = u32;
pub type TrackId = u32;
pub type PlaylistId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
    Buffering,
    Error,
}

impl Default for PlaybackState {
    fn default() -> Self {
        PlaybackState::Stopped
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub playback_state: PlaybackState,
    pub volume: u8,
    pub mute: bool,
    pub track_repeat: bool,
    pub playlist_repeat: bool,
    pub shuffle: bool,
    pub playlist_id: Option<PlaylistId>,
    pub current_track_id: Option<TrackId>,
    /// Snapcast group id that realizes this zone. `None` until the reconciler
    /// has created or adopted one.
    pub snapcast_group_id: Option<String>,
    pub snapcast_stream_id: Option<String>,
    pub client_ids: BTreeSet<ClientId>,
}

impl Zone {
    pub fn new(id: ZoneId, name: impl Into<String>, stream_id: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            playback_state: PlaybackState::Stopped,
            volume: 50,
            mute: false,
            track_repeat: false,
            playlist_repeat: false,
            shuffle: false,
            playlist_id: None,
            current_track_id: None,
            snapcast_group_id: None,
            snapcast_stream_id: Some(stream_id.into()),
            client_ids: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostInfo {
    pub ip: Option<String>,
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub arch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub mac: String,
    /// Bound dynamically on first discovery by the Snapcast client.
    pub snapcast_uuid: Option<String>,
    pub connected: bool,
    pub volume: u8,
    pub mute: bool,
    pub latency_ms: u32,
    pub zone_id: Option<ZoneId>,
    pub last_seen: Option<DateTime<Utc>>,
    pub host: HostInfo,
}

impl Client {
    pub fn new(id: ClientId, name: impl Into<String>, mac: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            mac: mac.into(),
            snapcast_uuid: None,
            connected: false,
            volume: 50,
            mute: false,
            latency_ms: 0,
            zone_id: None,
            last_seen: None,
            host: HostInfo::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// `None` for live streams.
    pub duration_secs: Option<u32>,
    pub source_url: String,
    pub cover_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: PlaylistId,
    pub name: String,
    pub track_ids: Vec<TrackId>,
}

/// One Snapcast group as last observed through `Server.GetStatus` or events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapcastGroup {
    pub id: String,
    pub stream_id: String,
    pub muted: bool,
    pub client_uuids: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapcastClientStatus {
    pub uuid: String,
    pub connected: bool,
    pub volume: u8,
    pub muted: bool,
    pub latency_ms: u32,
}

/// Mirror, never authoritative, of the downstream Snapcast server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapcastView {
    pub groups: BTreeMap<String, SnapcastGroup>,
    pub clients: BTreeMap<String, SnapcastClientStatus>,
}

/// The authoritative "world snapshot". Immutable once published;
/// `StateStore::mutate` builds the next one from the previous.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u64,
    pub zones: BTreeMap<ZoneId, Zone>,
    pub clients: BTreeMap<ClientId, Client>,
    pub playlists: BTreeMap<PlaylistId, Playlist>,
    pub tracks: BTreeMap<TrackId, Track>,
    pub snapcast: SnapcastView,
}

impl Snapshot {
    pub fn zone(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.get(&id)
    }

    pub fn client(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    /// Resolves `Zone.current_track_id` through the current playlist (invariant 3).
    pub fn current_track_resolves(&self, zone: &Zone) -> bool {
        match zone.current_track_id {
            None => true,
            Some(track_id) => match zone.playlist_id.and_then(|pid| self.playlists.get(&pid)) {
                Some(playlist) => playlist.track_ids.contains(&track_id),
                None => false,
            },
        }
    }
}
