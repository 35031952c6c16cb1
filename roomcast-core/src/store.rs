//! Copy-on-write state store.
//!
//! Readers take a cheap `Arc<Snapshot>` handle and never block the writer.
//! Writes are serialized through a single `tokio::sync::Mutex` slot; the
//! published pointer itself lives behind a `std::sync::RwLock` that is only
//! ever held for the duration of the pointer swap, never across `.await`.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::error::ControlPlaneError;
use crate::model::Snapshot;

/// `(old_version, new_version, changed_entity_ids)` emitted on every successful mutation.
#[derive(Debug, Clone)]
pub struct SnapshotDelta {
    pub old_version: u64,
    pub new_version: u64,
    pub changed_zone_ids: BTreeSet<u32>,
    pub changed_client_ids: BTreeSet<u32>,
}

const DELTA_CHANNEL_CAPACITY: usize = 256;

pub struct StateStore {
    writer_slot: AsyncMutex<()>,
    current: RwLock<Arc<Snapshot>>,
    deltas: broadcast::Sender<SnapshotDelta>,
}

impl StateStore {
    pub fn new(initial: Snapshot) -> Self {
        let (deltas, _) = broadcast::channel(DELTA_CHANNEL_CAPACITY);
        Self {
            writer_slot: AsyncMutex::new(()),
            current: RwLock::new(Arc::new(initial)),
            deltas,
        }
    }

    /// Cheap handle copy; never blocks on a concurrent writer.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().expect("state store lock poisoned").clone()
    }

    /// Serialized write: `f` is applied to the latest snapshot, the result is
    /// validated against the model's invariants, and published atomically on
    /// success.
    /// On `InvariantViolation` (from `f` or from validation) the previous
    /// snapshot is retained untouched.
    pub async fn mutate<F>(&self, f: F) -> Result<Arc<Snapshot>, ControlPlaneError>
    where
        F: FnOnce(&Snapshot) -> Result<Snapshot, ControlPlaneError>,
    {
        let _permit = self.writer_slot.lock().await;

        let old = self.snapshot();
        let mut next = f(&old)?;
        next.version = old.version + 1;
        validate_invariants(&next)?;

        let delta = SnapshotDelta {
            old_version: old.version,
            new_version: next.version,
            changed_zone_ids: changed_ids(&old.zones, &next.zones),
            changed_client_ids: changed_ids(&old.clients, &next.clients),
        };

        let published = Arc::new(next);
        {
            let mut guard = self.current.write().expect("state store lock poisoned");
            *guard = published.clone();
        }

        debug!(old_version = delta.old_version, new_version = delta.new_version, "published snapshot");
        // No subscribers is the common case during tests/startup; not an error.
        let _ = self.deltas.send(delta);

        Ok(published)
    }

    /// Lazy, restartable change feed. A lagging subscriber observes a
    /// `Lagged` error from the underlying stream rather than panicking or
    /// silently missing updates — callers should treat that as "re-read
    /// `snapshot()` and resume from there".
    pub fn subscribe(&self) -> BroadcastStream<SnapshotDelta> {
        BroadcastStream::new(self.deltas.subscribe())
    }
}

fn changed_ids<K: Ord + Copy, V: PartialEqByValue>(
    old: &std::collections::BTreeMap<K, V>,
    new: &std::collections::BTreeMap<K, V>,
) -> BTreeSet<K> {
    let mut changed = BTreeSet::new();
    for (id, new_val) in new.iter() {
        match old.get(id) {
            Some(old_val) if old_val.eq_by_value(new_val) => {}
            _ => {
                changed.insert(*id);
            }
        }
    }
    for id in old.keys() {
        if !new.contains_key(id) {
            changed.insert(*id);
        }
    }
    changed
}

/// Local substitute for `PartialEq` so we don't need to derive it on every
/// model type just for delta computation.
trait PartialEqByValue {
    fn eq_by_value(&self, other: &Self) -> bool;
}

impl PartialEqByValue for crate::model::Zone {
    fn eq_by_value(&self, other: &Self) -> bool {
        self.playback_state == other.playback_state
            && self.volume == other.volume
            && self.mute == other.mute
            && self.track_repeat == other.track_repeat
            && self.playlist_repeat == other.playlist_repeat
            && self.shuffle == other.shuffle
            && self.playlist_id == other.playlist_id
            && self.current_track_id == other.current_track_id
            && self.snapcast_group_id == other.snapcast_group_id
            && self.snapcast_stream_id == other.snapcast_stream_id
            && self.client_ids == other.client_ids
    }
}

impl PartialEqByValue for crate::model::Client {
    fn eq_by_value(&self, other: &Self) -> bool {
        self.connected == other.connected
            && self.volume == other.volume
            && self.mute == other.mute
            && self.latency_ms == other.latency_ms
            && self.zone_id == other.zone_id
            && self.snapcast_uuid == other.snapcast_uuid
    }
}

fn validate_invariants(snapshot: &Snapshot) -> Result<(), ControlPlaneError> {
    // 1. Every client is bound to at most one zone (structurally true here
    //    since `zone_id` is a single `Option`; we still check the zone's own
    //    `client_ids` set agrees with each client's `zone_id`).
    for client in snapshot.clients.values() {
        if let Some(zone_id) = client.zone_id {
            let zone = snapshot.zones.get(&zone_id).ok_or_else(|| {
                ControlPlaneError::invariant(format!(
                    "client {} references non-existent zone {}",
                    client.id, zone_id
                ))
            })?;
            if !zone.client_ids.contains(&client.id) {
                return Err(ControlPlaneError::invariant(format!(
                    "client {} claims zone {} but zone does not list it",
                    client.id, zone_id
                )));
            }
        }
    }

    // 2. Every zone owns at most one Snapcast group id; group ids unique across zones.
    let mut seen_group_ids = std::collections::HashSet::new();
    for zone in snapshot.zones.values() {
        if let Some(group_id) = &zone.snapcast_group_id {
            if !seen_group_ids.insert(group_id.clone()) {
                return Err(ControlPlaneError::invariant(format!(
                    "snapcast group id {} claimed by more than one zone",
                    group_id
                )));
            }
        }
        // 3. current_track, if set, resolves through the current playlist.
        if !snapshot.current_track_resolves(zone) {
            return Err(ControlPlaneError::invariant(format!(
                "zone {} current_track_id does not resolve through its playlist",
                zone.id
            )));
        }
        // 4. Volume in [0,100]; latency non-negative is structural (u32).
        if zone.volume > 100 {
            return Err(ControlPlaneError::invariant(format!(
                "zone {} volume {} out of range",
                zone.id, zone.volume
            )));
        }
    }
    for client in snapshot.clients.values() {
        if client.volume > 100 {
            return Err(ControlPlaneError::invariant(format!(
                "client {} volume {} out of range",
                client.id, client.volume
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Client, Zone};
    use futures_util::StreamExt;

    fn empty_snapshot() -> Snapshot {
        Snapshot::default()
    }

    #[tokio::test]
    async fn mutate_publishes_monotone_versions() {
        let store = StateStore::new(empty_snapshot());
        assert_eq!(store.snapshot().version, 0);

        let published = store
            .mutate(|snap| {
                let mut next = snap.clone();
                next.zones.insert(1, Zone::new(1, "living-room", "stream-1"));
                Ok(next)
            })
            .await
            .unwrap();

        assert_eq!(published.version, 1);
        assert_eq!(store.snapshot().version, 1);
    }

    #[tokio::test]
    async fn mutate_rejects_volume_out_of_range() {
        let store = StateStore::new(empty_snapshot());
        let result = store
            .mutate(|snap| {
                let mut next = snap.clone();
                let mut zone = Zone::new(1, "loud", "stream-1");
                zone.volume = 255;
                next.zones.insert(1, zone);
                Ok(next)
            })
            .await;

        assert!(matches!(result, Err(ControlPlaneError::InvariantViolation(_))));
        assert_eq!(store.snapshot().version, 0, "rejected mutation must not publish");
    }

    #[tokio::test]
    async fn mutate_rejects_client_bound_to_missing_zone() {
        let store = StateStore::new(empty_snapshot());
        let result = store
            .mutate(|snap| {
                let mut next = snap.clone();
                let mut client = Client::new(1, "bedroom", "aa:bb:cc:dd:ee:ff");
                client.zone_id = Some(99);
                next.clients.insert(1, client);
                Ok(next)
            })
            .await;

        assert!(matches!(result, Err(ControlPlaneError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn subscribers_observe_monotone_deltas() {
        let store = StateStore::new(empty_snapshot());
        let mut sub = store.subscribe();

        store
            .mutate(|snap| {
                let mut next = snap.clone();
                next.zones.insert(1, Zone::new(1, "kitchen", "stream-1"));
                Ok(next)
            })
            .await
            .unwrap();

        let delta = sub.next().await.unwrap().unwrap();
        assert_eq!(delta.old_version, 0);
        assert_eq!(delta.new_version, 1);
        assert!(delta.changed_zone_ids.contains(&1));
    }
}
