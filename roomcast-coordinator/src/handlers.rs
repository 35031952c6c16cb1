//! Domain handlers: one function per `Command` variant,
//! each mutating the state store and, where the command requires it,
//! invoking the reconciler or the pipeline manager. Every handler
//! returns the `StatusEvent`s the mutation produced so the coordinator can
//! publish them.

use std::sync::Arc;

use rand::Rng;

use roomcast_catalog::CatalogProvider;
use roomcast_core::model::{Playlist, PlaybackState, Zone};
use roomcast_core::{ControlPlaneError, StateStore};
use roomcast_pipeline::{PipelineError, PipelineManager, TrackMetadata};
use roomcast_reconciler::Reconciler;

use crate::command::{Command, EntityKind, SourceProtocol};
use crate::status::{StatusEvent, StatusPayload};

/// Everything a domain handler needs besides the command itself.
#[derive(Clone)]
pub struct Deps {
    pub store: Arc<StateStore>,
    pub reconciler: Arc<Reconciler>,
    pub pipeline: Arc<PipelineManager>,
    pub catalog: Arc<CatalogProvider>,
}

pub async fn handle(
    source: SourceProtocol,
    command: &Command,
    deps: &Deps,
) -> Result<Vec<StatusEvent>, ControlPlaneError> {
    match command {
        Command::SetClientVolume { client_id, volume } => {
            set_client_volume(deps, *client_id, *volume, source).await
        }
        Command::SetClientMute { client_id, mute } => set_client_mute(deps, *client_id, *mute, source).await,
        Command::SetZoneVolume { zone_id, volume } => set_zone_volume(deps, *zone_id, *volume, source).await,
        Command::SetZoneMute { zone_id, mute } => set_zone_mute(deps, *zone_id, *mute, source).await,
        Command::Play { zone_id } => play(deps, *zone_id, source).await,
        Command::Pause { zone_id } => pause(deps, *zone_id, source).await,
        Command::Stop { zone_id } => stop(deps, *zone_id, source).await,
        Command::Next { zone_id } => step(deps, *zone_id, 1, source).await,
        Command::Previous { zone_id } => step(deps, *zone_id, -1, source).await,
        Command::SetPlaylist { zone_id, playlist_id } => {
            set_playlist(deps, *zone_id, *playlist_id, source).await
        }
        Command::SetTrackByIndex { zone_id, index } => {
            set_track_by_index(deps, *zone_id, *index, source).await
        }
        Command::Seek { zone_id, position } => seek(deps, *zone_id, *position, source).await,
        Command::AssignClientToZone { client_id, zone_id } => {
            assign_client_to_zone(deps, *client_id, *zone_id, source).await
        }
    }
}

async fn set_client_volume(
    deps: &Deps,
    client_id: u32,
    volume: u8,
    source: SourceProtocol,
) -> Result<Vec<StatusEvent>, ControlPlaneError> {
    if volume > 100 {
        return Err(ControlPlaneError::validation(format!("volume {volume} out of range 0..=100")));
    }
    deps.store
        .mutate(|snap| {
            let mut next = snap.clone();
            let client = next
                .clients
                .get_mut(&client_id)
                .ok_or_else(|| ControlPlaneError::validation(format!("unknown client {client_id}")))?;
            client.volume = volume;
            Ok(next)
        })
        .await?;

    Ok(vec![StatusEvent {
        entity_kind: EntityKind::Client,
        entity_id: client_id,
        field: "volume",
        payload: StatusPayload::U8(volume),
        source,
    }])
}

async fn set_client_mute(
    deps: &Deps,
    client_id: u32,
    mute: bool,
    source: SourceProtocol,
) -> Result<Vec<StatusEvent>, ControlPlaneError> {
    deps.store
        .mutate(|snap| {
            let mut next = snap.clone();
            let client = next
                .clients
                .get_mut(&client_id)
                .ok_or_else(|| ControlPlaneError::validation(format!("unknown client {client_id}")))?;
            client.mute = mute;
            Ok(next)
        })
        .await?;

    Ok(vec![StatusEvent {
        entity_kind: EntityKind::Client,
        entity_id: client_id,
        field: "mute",
        payload: StatusPayload::Bool(mute),
        source,
    }])
}

async fn set_zone_volume(
    deps: &Deps,
    zone_id: u32,
    volume: u8,
    source: SourceProtocol,
) -> Result<Vec<StatusEvent>, ControlPlaneError> {
    if volume > 100 {
        return Err(ControlPlaneError::validation(format!("volume {volume} out of range 0..=100")));
    }
    deps.store
        .mutate(|snap| {
            let mut next = snap.clone();
            let zone = next
                .zones
                .get_mut(&zone_id)
                .ok_or_else(|| ControlPlaneError::validation(format!("unknown zone {zone_id}")))?;
            zone.volume = volume;
            Ok(next)
        })
        .await?;

    Ok(vec![StatusEvent {
        entity_kind: EntityKind::Zone,
        entity_id: zone_id,
        field: "volume",
        payload: StatusPayload::U8(volume),
        source,
    }])
}

async fn set_zone_mute(
    deps: &Deps,
    zone_id: u32,
    mute: bool,
    source: SourceProtocol,
) -> Result<Vec<StatusEvent>, ControlPlaneError> {
    deps.store
        .mutate(|snap| {
            let mut next = snap.clone();
            let zone = next
                .zones
                .get_mut(&zone_id)
                .ok_or_else(|| ControlPlaneError::validation(format!("unknown zone {zone_id}")))?;
            zone.mute = mute;
            Ok(next)
        })
        .await?;

    Ok(vec![StatusEvent {
        entity_kind: EntityKind::Zone,
        entity_id: zone_id,
        field: "mute",
        payload: StatusPayload::Bool(mute),
        source,
    }])
}

/// Resolves the zone's current track through the catalog and (re)starts its
/// pipeline. `CatalogMiss` when the zone has no current track or the track
/// itself no longer resolves.
async fn play(deps: &Deps, zone_id: u32, source: SourceProtocol) -> Result<Vec<StatusEvent>, ControlPlaneError> {
    let snapshot = deps.store.snapshot();
    let zone = snapshot
        .zone(zone_id)
        .ok_or_else(|| ControlPlaneError::validation(format!("unknown zone {zone_id}")))?;
    let track_id = zone
        .current_track_id
        .ok_or_else(|| ControlPlaneError::catalog_miss(format!("zone {zone_id} has no current track")))?;

    let track = deps
        .catalog
        .resolve_track(track_id)
        .await
        .ok_or_else(|| ControlPlaneError::catalog_miss(format!("track {track_id} not resolvable")))?;
    let url = deps
        .catalog
        .stream_url(track_id)
        .await
        .ok_or_else(|| ControlPlaneError::catalog_miss(format!("track {track_id} has no stream url")))?;

    deps.pipeline
        .start(
            zone_id,
            url.to_string(),
            TrackMetadata { title: Some(track.title.clone()), duration_secs: track.duration_secs },
        )
        .await
        .map_err(|e| ControlPlaneError::transient(e.to_string()))?;

    set_playback_state(deps, zone_id, PlaybackState::Playing, source).await
}

/// The pipeline manager has no native pause; pausing stops the decoder and
/// leaves `current_track_id` in place so a later `Play` resumes the same
/// track from its start.
async fn pause(deps: &Deps, zone_id: u32, source: SourceProtocol) -> Result<Vec<StatusEvent>, ControlPlaneError> {
    let _ = deps.pipeline.stop(zone_id).await;
    set_playback_state(deps, zone_id, PlaybackState::Paused, source).await
}

async fn stop(deps: &Deps, zone_id: u32, source: SourceProtocol) -> Result<Vec<StatusEvent>, ControlPlaneError> {
    let _ = deps.pipeline.stop(zone_id).await;
    set_playback_state(deps, zone_id, PlaybackState::Stopped, source).await
}

async fn set_playback_state(
    deps: &Deps,
    zone_id: u32,
    state: PlaybackState,
    source: SourceProtocol,
) -> Result<Vec<StatusEvent>, ControlPlaneError> {
    deps.store
        .mutate(|snap| {
            let mut next = snap.clone();
            let zone = next
                .zones
                .get_mut(&zone_id)
                .ok_or_else(|| ControlPlaneError::validation(format!("unknown zone {zone_id}")))?;
            zone.playback_state = state;
            Ok(next)
        })
        .await?;

    Ok(vec![StatusEvent {
        entity_kind: EntityKind::Zone,
        entity_id: zone_id,
        field: "playback_state",
        payload: StatusPayload::PlaybackState(state),
        source,
    }])
}

/// `Next`/`Previous` (direction +1/-1): advances within the current
/// playlist, honoring `shuffle` (random next pick) and `playlist_repeat`
/// (wrap instead of stopping at either end).
async fn step(
    deps: &Deps,
    zone_id: u32,
    direction: i32,
    source: SourceProtocol,
) -> Result<Vec<StatusEvent>, ControlPlaneError> {
    let snapshot = deps.store.snapshot();
    let zone = snapshot
        .zone(zone_id)
        .ok_or_else(|| ControlPlaneError::validation(format!("unknown zone {zone_id}")))?;
    let playlist_id = zone
        .playlist_id
        .ok_or_else(|| ControlPlaneError::catalog_miss(format!("zone {zone_id} has no current playlist")))?;
    let playlist = deps
        .catalog
        .resolve_playlist(playlist_id)
        .await
        .ok_or_else(|| ControlPlaneError::catalog_miss(format!("playlist {playlist_id} not resolvable")))?;

    let Some(next_track_id) = next_track_id(zone, &playlist, direction) else {
        return stop(deps, zone_id, source).await;
    };

    set_current_track(deps, zone_id, next_track_id, source).await
}

fn next_track_id(zone: &Zone, playlist: &Playlist, direction: i32) -> Option<u32> {
    if playlist.track_ids.is_empty() {
        return None;
    }
    if zone.shuffle {
        let mut rng = rand::rng();
        return Some(playlist.track_ids[rng.random_range(0..playlist.track_ids.len())]);
    }

    let current_index = zone
        .current_track_id
        .and_then(|id| playlist.track_ids.iter().position(|t| *t == id));
    let len = playlist.track_ids.len() as i32;
    let raw_index = current_index.map(|i| i as i32 + direction).unwrap_or(0);

    if (0..len).contains(&raw_index) {
        Some(playlist.track_ids[raw_index as usize])
    } else if zone.playlist_repeat {
        Some(playlist.track_ids[raw_index.rem_euclid(len) as usize])
    } else {
        None
    }
}

async fn set_current_track(
    deps: &Deps,
    zone_id: u32,
    track_id: u32,
    source: SourceProtocol,
) -> Result<Vec<StatusEvent>, ControlPlaneError> {
    deps.store
        .mutate(|snap| {
            let mut next = snap.clone();
            let zone = next
                .zones
                .get_mut(&zone_id)
                .ok_or_else(|| ControlPlaneError::validation(format!("unknown zone {zone_id}")))?;
            zone.current_track_id = Some(track_id);
            Ok(next)
        })
        .await?;

    let mut events = vec![StatusEvent {
        entity_kind: EntityKind::Zone,
        entity_id: zone_id,
        field: "current_track_id",
        payload: StatusPayload::OptionU32(Some(track_id)),
        source,
    }];

    let was_playing = matches!(
        deps.store.snapshot().zone(zone_id).map(|z| z.playback_state),
        Some(PlaybackState::Playing)
    );
    if was_playing {
        events.extend(play(deps, zone_id, source).await?);
    }
    Ok(events)
}

async fn set_playlist(
    deps: &Deps,
    zone_id: u32,
    playlist_id: u32,
    source: SourceProtocol,
) -> Result<Vec<StatusEvent>, ControlPlaneError> {
    let playlist = deps
        .catalog
        .resolve_playlist(playlist_id)
        .await
        .ok_or_else(|| ControlPlaneError::catalog_miss(format!("playlist {playlist_id} not resolvable")))?;

    deps.store
        .mutate(|snap| {
            let mut next = snap.clone();
            let zone = next
                .zones
                .get_mut(&zone_id)
                .ok_or_else(|| ControlPlaneError::validation(format!("unknown zone {zone_id}")))?;
            zone.playlist_id = Some(playlist_id);
            zone.current_track_id = playlist.track_ids.first().copied();
            Ok(next)
        })
        .await?;

    Ok(vec![StatusEvent {
        entity_kind: EntityKind::Zone,
        entity_id: zone_id,
        field: "playlist_id",
        payload: StatusPayload::OptionU32(Some(playlist_id)),
        source,
    }])
}

async fn set_track_by_index(
    deps: &Deps,
    zone_id: u32,
    index: usize,
    source: SourceProtocol,
) -> Result<Vec<StatusEvent>, ControlPlaneError> {
    let snapshot = deps.store.snapshot();
    let zone = snapshot
        .zone(zone_id)
        .ok_or_else(|| ControlPlaneError::validation(format!("unknown zone {zone_id}")))?;
    let playlist_id = zone
        .playlist_id
        .ok_or_else(|| ControlPlaneError::catalog_miss(format!("zone {zone_id} has no current playlist")))?;
    let playlist = deps
        .catalog
        .resolve_playlist(playlist_id)
        .await
        .ok_or_else(|| ControlPlaneError::catalog_miss(format!("playlist {playlist_id} not resolvable")))?;
    let track_id = *playlist
        .track_ids
        .get(index)
        .ok_or_else(|| ControlPlaneError::validation(format!("playlist index {index} out of range")))?;

    set_current_track(deps, zone_id, track_id, source).await
}

async fn seek(
    deps: &Deps,
    zone_id: u32,
    position: crate::command::SeekPosition,
    _source: SourceProtocol,
) -> Result<Vec<StatusEvent>, ControlPlaneError> {
    let position_secs = match position {
        crate::command::SeekPosition::Millis(ms) => ms as f64 / 1000.0,
        crate::command::SeekPosition::Fraction(fraction) => {
            let snapshot = deps.store.snapshot();
            let zone = snapshot
                .zone(zone_id)
                .ok_or_else(|| ControlPlaneError::validation(format!("unknown zone {zone_id}")))?;
            // A fraction can't be resolved to a position without a known
            // duration; a missing duration means the current track is a
            // live source, so report the same `NotSeekable` a millisecond
            // seek against it would hit in the pipeline.
            let duration = zone
                .current_track_id
                .and_then(|id| snapshot.tracks.get(&id))
                .and_then(|t| t.duration_secs)
                .ok_or_else(|| ControlPlaneError::validation(PipelineError::NotSeekable.to_string()))?;
            fraction.clamp(0.0, 1.0) * duration as f64
        }
    };

    deps.pipeline
        .seek(zone_id, position_secs)
        .await
        .map_err(|e| ControlPlaneError::validation(e.to_string()))?;

    Ok(Vec::new())
}

/// Rebinds a client to a different zone (or unassigns with `None`). The
/// store's own invariant check rejects an unknown target zone as
/// `InvariantViolation` without this handler needing to
/// duplicate that validation. A successful rebind changes `DesiredTopology`,
/// so the reconciler is run inline before the status event is published.
async fn assign_client_to_zone(
    deps: &Deps,
    client_id: u32,
    zone_id: Option<u32>,
    source: SourceProtocol,
) -> Result<Vec<StatusEvent>, ControlPlaneError> {
    deps.store
        .mutate(|snap| {
            let mut next = snap.clone();
            let previous_zone = next
                .clients
                .get(&client_id)
                .ok_or_else(|| ControlPlaneError::validation(format!("unknown client {client_id}")))?
                .zone_id;

            if let Some(prev) = previous_zone {
                if let Some(zone) = next.zones.get_mut(&prev) {
                    zone.client_ids.remove(&client_id);
                }
            }
            if let Some(zone_id) = zone_id {
                let zone = next
                    .zones
                    .get_mut(&zone_id)
                    .ok_or_else(|| ControlPlaneError::invariant(format!("zone {zone_id} does not exist")))?;
                zone.client_ids.insert(client_id);
            }

            let client = next.clients.get_mut(&client_id).expect("checked above");
            client.zone_id = zone_id;
            Ok(next)
        })
        .await?;

    let report = deps.reconciler.reconcile().await;
    if !report.errors.is_empty() {
        tracing::warn!(errors = ?report.errors, "reconciliation after zone reassignment reported errors");
    }

    Ok(vec![StatusEvent {
        entity_kind: EntityKind::Client,
        entity_id: client_id,
        field: "zone_id",
        payload: StatusPayload::OptionU32(zone_id),
        source,
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomcast_core::model::{Client, Track, Zone};
    use std::path::PathBuf;
    use std::time::Duration;

    fn test_deps() -> (Arc<StateStore>, Deps) {
        let mut snapshot = roomcast_core::model::Snapshot::default();
        snapshot.zones.insert(1, Zone::new(1, "living-room", "stream-1"));
        snapshot.clients.insert(1, Client::new(1, "speaker", "aa:bb:cc:dd:ee:ff"));
        snapshot.tracks.insert(
            1,
            Track {
                id: 1,
                title: "Song".into(),
                artist: None,
                album: None,
                duration_secs: Some(120),
                source_url: "https://example.invalid/song.flac".into(),
                cover_url: None,
            },
        );
        snapshot.playlists.insert(1, Playlist { id: 1, name: "all".into(), track_ids: vec![1] });

        let store = Arc::new(StateStore::new(snapshot));
        let snapcast = Arc::new(roomcast_snapcast::SnapcastClient::new(
            "127.0.0.1",
            1705,
            Duration::from_millis(50),
            Duration::from_secs(1),
        ));
        let reconciler = Arc::new(Reconciler::new(snapcast, store.clone(), 4));
        let pipeline = PipelineManager::new("/bin/cat", PathBuf::from("/tmp/roomcast-handler-tests"), Duration::from_millis(20), Duration::from_millis(200));
        let catalog = Arc::new(CatalogProvider::new(
            Arc::new(roomcast_catalog::StaticCatalogBackend::empty()),
            Duration::from_secs(300),
        ));
        let deps = Deps { store: store.clone(), reconciler, pipeline, catalog };
        (store, deps)
    }

    #[tokio::test]
    async fn set_client_volume_rejects_out_of_range() {
        let (_, deps) = test_deps();
        let err = set_client_volume(&deps, 1, 200, SourceProtocol::Api).await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::Validation(_)));
    }

    #[tokio::test]
    async fn set_client_volume_applies_and_reports() {
        let (store, deps) = test_deps();
        let events = set_client_volume(&deps, 1, 37, SourceProtocol::Mqtt).await.unwrap();
        assert_eq!(events[0].payload, StatusPayload::U8(37));
        assert_eq!(store.snapshot().client(1).unwrap().volume, 37);
    }

    #[tokio::test]
    async fn assign_client_to_unknown_zone_is_an_invariant_violation() {
        let (_, deps) = test_deps();
        let err = assign_client_to_zone(&deps, 1, Some(99), SourceProtocol::Api).await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::InvariantViolation(_)));
    }

    #[test]
    fn next_track_wraps_when_playlist_repeat_is_set() {
        let mut zone = Zone::new(1, "z", "s");
        zone.playlist_repeat = true;
        zone.current_track_id = Some(1);
        let playlist = Playlist { id: 1, name: "p".into(), track_ids: vec![1] };
        assert_eq!(next_track_id(&zone, &playlist, 1), Some(1));
    }

    #[test]
    fn next_track_stops_at_the_end_without_repeat() {
        let mut zone = Zone::new(1, "z", "s");
        zone.current_track_id = Some(1);
        let playlist = Playlist { id: 1, name: "p".into(), track_ids: vec![1] };
        assert_eq!(next_track_id(&zone, &playlist, 1), None);
    }

    #[tokio::test]
    async fn fraction_seek_on_a_live_track_is_not_seekable() {
        let (store, deps) = test_deps();
        store
            .mutate(|snap| {
                let mut next = snap.clone();
                next.tracks.insert(
                    2,
                    Track {
                        id: 2,
                        title: "Live Radio".into(),
                        artist: None,
                        album: None,
                        duration_secs: None,
                        source_url: "https://example.invalid/live".into(),
                        cover_url: None,
                    },
                );
                next.zones.get_mut(&1).unwrap().current_track_id = Some(2);
                Ok(next)
            })
            .await
            .unwrap();

        let err = seek(&deps, 1, crate::command::SeekPosition::Fraction(0.5), SourceProtocol::Api)
            .await
            .unwrap_err();
        let ControlPlaneError::Validation(message) = err else {
            panic!("expected Validation, got {err:?}");
        };
        assert_eq!(message, PipelineError::NotSeekable.to_string());
    }
}
