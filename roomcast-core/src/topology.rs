//! `DesiredTopology`: a pure function of the snapshot's configured zones
//! and client→zone bindings. The reconciler never looks at anything else
//! to decide what the daemon *should* look like.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Snapshot, ZoneId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredZone {
    pub client_uuids: BTreeSet<String>,
    pub stream_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredTopology {
    pub zones: BTreeMap<ZoneId, DesiredZone>,
}

impl DesiredTopology {
    /// Derives the desired zone → clients map from a snapshot. Clients that
    /// have not yet been bound to a Snapcast UUID (first discovery still
    /// pending) are omitted from their zone's desired set — there is nothing
    /// the reconciler can move yet.
    pub fn derive(snapshot: &Snapshot) -> Self {
        let mut zones: BTreeMap<ZoneId, DesiredZone> = BTreeMap::new();

        for zone in snapshot.zones.values() {
            let client_uuids = zone
                .client_ids
                .iter()
                .filter_map(|client_id| snapshot.clients.get(client_id))
                .filter_map(|client| client.snapcast_uuid.clone())
                .collect();

            zones.insert(
                zone.id,
                DesiredZone {
                    client_uuids,
                    stream_id: zone
                        .snapcast_stream_id
                        .clone()
                        .unwrap_or_else(|| format!("zone-{}", zone.id)),
                },
            );
        }

        DesiredTopology { zones }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Client, Zone};

    #[test]
    fn derive_omits_clients_without_a_bound_snapcast_uuid() {
        let mut snapshot = Snapshot::default();
        let mut zone = Zone::new(1, "living-room", "stream-1");
        zone.client_ids.insert(1);
        zone.client_ids.insert(2);
        snapshot.zones.insert(1, zone);

        let mut bound = Client::new(1, "bound", "aa:aa:aa:aa:aa:aa");
        bound.snapcast_uuid = Some("uuid-1".to_string());
        bound.zone_id = Some(1);
        snapshot.clients.insert(1, bound);

        let mut unbound = Client::new(2, "unbound", "bb:bb:bb:bb:bb:bb");
        unbound.zone_id = Some(1);
        snapshot.clients.insert(2, unbound);

        let desired = DesiredTopology::derive(&snapshot);
        let zone1 = desired.zones.get(&1).unwrap();
        assert_eq!(zone1.client_uuids.len(), 1);
        assert!(zone1.client_uuids.contains("uuid-1"));
    }

    #[test]
    fn derive_is_pure_and_deterministic() {
        let mut snapshot = Snapshot::default();
        snapshot.zones.insert(1, Zone::new(1, "a", "stream-1"));
        snapshot.zones.insert(2, Zone::new(2, "b", "stream-2"));

        let first = DesiredTopology::derive(&snapshot);
        let second = DesiredTopology::derive(&snapshot);
        assert_eq!(first, second);
    }
}
