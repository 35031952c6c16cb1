//! Snapcast egress: the `Egress` implementation that turns published
//! `StatusEvent`s back into the Snapcast RPCs the daemon actually exposes.
//! Snapcast has no native "zone volume" concept — a zone's volume fans out
//! to `Client.SetVolume` on every bound member, a zone's mute maps onto
//! `Group.SetMute` on its realizing group. Client volume/mute map directly
//! onto `Client.SetVolume`, which always carries both fields together.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use roomcast_core::StateStore;
use roomcast_coordinator::{EntityKind, Egress, SourceProtocol, StatusEvent, StatusPayload};
use roomcast_snapcast::SnapcastClient;

pub struct SnapcastEgress {
    snapcast: Arc<SnapcastClient>,
    store: Arc<StateStore>,
}

impl SnapcastEgress {
    pub fn new(snapcast: Arc<SnapcastClient>, store: Arc<StateStore>) -> Self {
        Self { snapcast, store }
    }

    async fn push_client_volume(&self, client_id: u32) {
        let snapshot = self.store.snapshot();
        let Some(client) = snapshot.client(client_id) else { return };
        let Some(uuid) = client.snapcast_uuid.clone() else { return };
        let result = self
            .snapcast
            .call("Client.SetVolume", json!({ "id": uuid, "volume": { "percent": client.volume, "muted": client.mute } }))
            .await;
        if let Err(e) = result {
            warn!(client_id, error = %e, "failed to push client volume to snapcast");
        }
    }

    async fn push_zone_volume(&self, zone_id: u32) {
        let snapshot = self.store.snapshot();
        let Some(zone) = snapshot.zone(zone_id) else { return };
        for client_id in zone.client_ids.iter().copied().collect::<Vec<_>>() {
            let Some(client) = snapshot.client(client_id) else { continue };
            let Some(uuid) = client.snapcast_uuid.clone() else { continue };
            let result = self
                .snapcast
                .call("Client.SetVolume", json!({ "id": uuid, "volume": { "percent": zone.volume, "muted": client.mute } }))
                .await;
            if let Err(e) = result {
                warn!(zone_id, client_id, error = %e, "failed to push zone volume to snapcast");
            }
        }
    }

    async fn push_zone_mute(&self, zone_id: u32, mute: bool) {
        let Some(group_id) = self.store.snapshot().zone(zone_id).and_then(|z| z.snapcast_group_id.clone()) else {
            return;
        };
        let result = self.snapcast.call("Group.SetMute", json!({ "id": group_id, "mute": mute })).await;
        if let Err(e) = result {
            warn!(zone_id, error = %e, "failed to push zone mute to snapcast");
        }
    }
}

#[async_trait::async_trait]
impl Egress for SnapcastEgress {
    fn protocol(&self) -> SourceProtocol {
        SourceProtocol::Snapcast
    }

    async fn publish(&self, event: &StatusEvent) {
        match (event.entity_kind, event.field, &event.payload) {
            (EntityKind::Client, "volume", StatusPayload::U8(_)) => self.push_client_volume(event.entity_id).await,
            (EntityKind::Client, "mute", StatusPayload::Bool(_)) => self.push_client_volume(event.entity_id).await,
            (EntityKind::Zone, "volume", StatusPayload::U8(_)) => self.push_zone_volume(event.entity_id).await,
            (EntityKind::Zone, "mute", StatusPayload::Bool(mute)) => self.push_zone_mute(event.entity_id, *mute).await,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomcast_core::model::{Client, Snapshot, Zone};
    use std::time::Duration;

    fn store_with_bound_client() -> Arc<StateStore> {
        let mut snapshot = Snapshot::default();
        let mut zone = Zone::new(1, "living-room", "stream-1");
        zone.client_ids.insert(1);
        zone.volume = 60;
        snapshot.zones.insert(1, zone);

        let mut client = Client::new(1, "speaker", "aa:bb:cc:dd:ee:ff");
        client.snapcast_uuid = Some("uuid-1".into());
        client.zone_id = Some(1);
        snapshot.clients.insert(1, client);

        Arc::new(StateStore::new(snapshot))
    }

    #[tokio::test]
    async fn publish_on_an_unbound_client_is_a_silent_noop() {
        let store = Arc::new(StateStore::new(Snapshot::default()));
        let snapcast = Arc::new(SnapcastClient::new("127.0.0.1", 1705, Duration::from_millis(10), Duration::from_secs(1)));
        let egress = SnapcastEgress::new(snapcast, store);

        egress
            .publish(&StatusEvent {
                entity_kind: EntityKind::Client,
                entity_id: 99,
                field: "volume",
                payload: StatusPayload::U8(10),
                source: SourceProtocol::Api,
            })
            .await;
    }

    #[tokio::test]
    async fn zone_mute_without_a_group_id_yet_is_a_silent_noop() {
        let store = store_with_bound_client();
        let snapcast = Arc::new(SnapcastClient::new("127.0.0.1", 1705, Duration::from_millis(10), Duration::from_secs(1)));
        let egress = SnapcastEgress::new(snapcast, store);

        egress
            .publish(&StatusEvent {
                entity_kind: EntityKind::Zone,
                entity_id: 1,
                field: "mute",
                payload: StatusPayload::Bool(true),
                source: SourceProtocol::Api,
            })
            .await;
    }
}
