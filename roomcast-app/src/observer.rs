//! Reflects externally-observed facts into the state store: Snapcast
//! daemon notifications and pipeline lifecycle events are not user commands,
//! so they bypass `roomcast_coordinator::handlers` entirely and mutate the
//! store directly, then publish through `Coordinator::publish_external`
//! tagged `SourceProtocol::Internal` (never echo-suppressed, per
//! `EchoGuard::arm`).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use roomcast_core::model::PlaybackState;
use roomcast_core::StateStore;
use roomcast_coordinator::{Coordinator, EntityKind, SourceProtocol, StatusEvent, StatusPayload};
use roomcast_pipeline::{PipelineEvent, PipelineManager};
use roomcast_reconciler::Reconciler;
use roomcast_server::Readiness;
use roomcast_snapcast::{ConnectionState, SnapcastClient, SnapcastEvent};

/// Binds a newly-connected Snapcast UUID to the first configured client that
/// has not yet been bound to one. The daemon's `Client.OnConnect` notification carries only
/// the UUID, not the MAC a config-declared client is keyed on, so exact
/// identity matching isn't possible from this event alone; first-unbound
/// assignment in ascending client id order is the simplest policy that keeps
/// every configured client eventually reachable (see DESIGN.md).
async fn bind_or_touch_client(store: &StateStore, uuid: &str) -> Option<StatusEvent> {
    let snapshot = store.snapshot();
    let already_bound = snapshot.clients.values().any(|c| c.snapcast_uuid.as_deref() == Some(uuid));
    let target = if already_bound {
        snapshot.clients.values().find(|c| c.snapcast_uuid.as_deref() == Some(uuid)).map(|c| c.id)
    } else {
        snapshot.clients.values().find(|c| c.snapcast_uuid.is_none()).map(|c| c.id)
    };
    let Some(client_id) = target else {
        debug!(uuid, "snapcast client connected with no configured client left to bind");
        return None;
    };

    let uuid_owned = uuid.to_string();
    let result = store
        .mutate(|snap| {
            let mut next = snap.clone();
            let client = next.clients.get_mut(&client_id).expect("id came from this snapshot");
            client.snapcast_uuid = Some(uuid_owned.clone());
            client.connected = true;
            client.last_seen = Some(Utc::now());
            Ok(next)
        })
        .await;

    match result {
        Ok(_) => {
            info!(client_id, uuid, "bound snapcast client");
            Some(StatusEvent {
                entity_kind: EntityKind::Client,
                entity_id: client_id,
                field: "connected",
                payload: StatusPayload::Bool(true),
                source: SourceProtocol::Internal,
            })
        }
        Err(e) => {
            warn!(client_id, uuid, error = %e, "failed to bind snapcast client");
            None
        }
    }
}

async fn mark_disconnected(store: &StateStore, uuid: &str) -> Option<StatusEvent> {
    let snapshot = store.snapshot();
    let client_id = snapshot.clients.values().find(|c| c.snapcast_uuid.as_deref() == Some(uuid))?.id;

    let result = store
        .mutate(|snap| {
            let mut next = snap.clone();
            let client = next.clients.get_mut(&client_id).expect("id came from this snapshot");
            client.connected = false;
            Ok(next)
        })
        .await;

    match result {
        Ok(_) => Some(StatusEvent {
            entity_kind: EntityKind::Client,
            entity_id: client_id,
            field: "connected",
            payload: StatusPayload::Bool(false),
            source: SourceProtocol::Internal,
        }),
        Err(e) => {
            warn!(client_id, uuid, error = %e, "failed to mark snapcast client disconnected");
            None
        }
    }
}

async fn reflect_volume(store: &StateStore, uuid: &str, volume: u8, muted: bool) -> Vec<StatusEvent> {
    let snapshot = store.snapshot();
    let Some(client_id) = snapshot.clients.values().find(|c| c.snapcast_uuid.as_deref() == Some(uuid)).map(|c| c.id) else {
        return Vec::new();
    };

    let result = store
        .mutate(|snap| {
            let mut next = snap.clone();
            let client = next.clients.get_mut(&client_id).expect("id came from this snapshot");
            client.volume = volume;
            client.mute = muted;
            Ok(next)
        })
        .await;

    match result {
        Ok(_) => vec![
            StatusEvent { entity_kind: EntityKind::Client, entity_id: client_id, field: "volume", payload: StatusPayload::U8(volume), source: SourceProtocol::Internal },
            StatusEvent { entity_kind: EntityKind::Client, entity_id: client_id, field: "mute", payload: StatusPayload::Bool(muted), source: SourceProtocol::Internal },
        ],
        Err(e) => {
            warn!(client_id, uuid, error = %e, "failed to reflect snapcast volume change");
            Vec::new()
        }
    }
}

/// Consumes `SnapcastClient::events()` for the lifetime of the process,
/// reflecting every notification into the state store and re-running
/// reconciliation whenever the daemon's topology may have moved out from
/// under us (`Resynced`, new client discovery).
pub fn spawn_snapcast_observer(
    snapcast: Arc<SnapcastClient>,
    store: Arc<StateStore>,
    coordinator: Arc<Coordinator>,
    reconciler: Arc<Reconciler>,
    readiness: Arc<Readiness>,
) {
    tokio::spawn(async move {
        let mut events = snapcast.events();
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "snapcast observer lagged; some notifications were dropped");
                    continue;
                }
                Err(RecvError::Closed) => {
                    warn!("snapcast event channel closed; observer exiting");
                    return;
                }
            };

            let status_events = match event {
                SnapcastEvent::ClientConnected { uuid } => {
                    bind_or_touch_client(&store, &uuid).await.into_iter().collect()
                }
                SnapcastEvent::ClientDisconnected { uuid } => {
                    mark_disconnected(&store, &uuid).await.into_iter().collect()
                }
                SnapcastEvent::ClientVolumeChanged { uuid, volume, muted } => {
                    reflect_volume(&store, &uuid, volume, muted).await
                }
                SnapcastEvent::GroupStreamChanged { group_id, stream_id } => {
                    debug!(group_id, stream_id, "snapcast group stream changed out of band");
                    Vec::new()
                }
                SnapcastEvent::ServerUpdate => {
                    debug!("snapcast server update notification received");
                    Vec::new()
                }
                SnapcastEvent::Resynced => {
                    info!("snapcast connection resynced; rerunning reconciliation");
                    let report = reconciler.reconcile().await;
                    if !report.errors.is_empty() {
                        warn!(errors = ?report.errors, "reconciliation after resync reported errors");
                    }
                    readiness.mark_reconciled();
                    Vec::new()
                }
            };

            if !status_events.is_empty() {
                coordinator.publish_external(&status_events).await;
            }
        }
    });
}

/// Polls `SnapcastClient::state()` so `/readyz` reflects the connection's
/// current state. The client exposes state transitions only through this
/// getter, not as events, so polling is the simplest way to track it from
/// outside the client itself.
pub fn spawn_connection_state_watcher(snapcast: Arc<SnapcastClient>, readiness: Arc<Readiness>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(500));
        loop {
            interval.tick().await;
            let connected = matches!(snapcast.state().await, ConnectionState::Connected);
            readiness.mark_snapcast_connected(connected);
        }
    });
}

/// Consumes `PipelineManager::events()`: reflects terminal playback-state
/// changes the pipeline reaches on its own (e.g. an in-stream decoder
/// failure) back into the zone's `playback_state`, and publishes that
/// reflection the same way the Snapcast observer does. Position and track
/// metadata events have no corresponding outbound `StatusEvent` field so they are logged at debug and otherwise
/// dropped here.
pub fn spawn_pipeline_observer(pipeline: Arc<PipelineManager>, store: Arc<StateStore>, coordinator: Arc<Coordinator>) {
    tokio::spawn(async move {
        let mut events = pipeline.events();
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "pipeline observer lagged; some events were dropped");
                    continue;
                }
                Err(RecvError::Closed) => {
                    warn!("pipeline event channel closed; observer exiting");
                    return;
                }
            };

            match event {
                PipelineEvent::PlaybackStateChanged { zone_id, state } => {
                    let already = store.snapshot().zone(zone_id).map(|z| z.playback_state);
                    if already == Some(state) {
                        continue;
                    }
                    let result = store
                        .mutate(|snap| {
                            let mut next = snap.clone();
                            if let Some(zone) = next.zones.get_mut(&zone_id) {
                                zone.playback_state = state;
                            }
                            Ok(next)
                        })
                        .await;
                    match result {
                        Ok(_) => {
                            if matches!(state, PlaybackState::Error) {
                                warn!(zone_id, "pipeline reported an error state");
                            }
                            coordinator
                                .publish_external(&[StatusEvent {
                                    entity_kind: EntityKind::Zone,
                                    entity_id: zone_id,
                                    field: "playback_state",
                                    payload: StatusPayload::PlaybackState(state),
                                    source: SourceProtocol::Internal,
                                }])
                                .await;
                        }
                        Err(e) => warn!(zone_id, error = %e, "failed to reflect pipeline playback state"),
                    }
                }
                PipelineEvent::PositionChanged { zone_id, position_ms } => {
                    debug!(zone_id, position_ms, "pipeline position advanced");
                }
                PipelineEvent::TrackInfoChanged { zone_id, format, metadata } => {
                    debug!(zone_id, ?format, title = ?metadata.title, "pipeline negotiated track info");
                }
            }
        }
    });
}
